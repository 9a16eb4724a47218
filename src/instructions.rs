//! Turn-by-turn instruction text.
//!
//! Provider routes carry a maneuver type and an optional modifier per
//! step; this turns them into the text shown and spoken to the traveler.

/// Instruction text for a maneuver, e.g. "turn left onto Main St".
pub fn instruction_text(kind: &str, modifier: Option<&str>, road_name: Option<&str>) -> String {
    let base = match (kind, modifier) {
        ("arrive", _) => "arrive at destination".to_string(),
        (_, Some("uturn")) => "make a U-turn".to_string(),
        ("roundabout" | "rotary", _) => "enter the roundabout".to_string(),
        ("continue" | "new name", Some("straight") | None) => "continue straight".to_string(),
        ("", Some(m)) => m.to_string(),
        ("", None) => "continue".to_string(),
        (k, Some(m)) => format!("{k} {m}"),
        (k, None) => k.to_string(),
    };

    match road_name {
        Some(name) if kind != "depart" && kind != "arrive" => format!("{base} onto {name}"),
        _ => base,
    }
}
