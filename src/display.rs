//! Display texts for the navigation banner.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::eta::Eta;
use crate::geometry::{haversine, remaining_distance_along_polyline};
use crate::location::PositionFix;
use crate::progress::Progress;
use crate::route::Route;
use crate::state::NavigationState;

/// Everything the banner shows after a fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayUpdate {
    pub distance_to_next_maneuver: String,
    pub maneuver_instruction: String,
    pub next_maneuver_preview: String,
    pub remaining_distance: String,
    pub eta_clock: String,
    pub eta_seconds: f64,
}

impl DisplayUpdate {
    pub fn build(
        route: &Route,
        state: &NavigationState,
        progress: &Progress,
        eta: &Eta,
        fix: &PositionFix,
        offset: &FixedOffset,
    ) -> Self {
        let index = state.current_step_index();
        let eta_clock = eta_clock_text(fix.timestamp_ms, eta.seconds, offset);

        let Some(step) = route.step(index) else {
            return Self {
                distance_to_next_maneuver: format_distance(0.0),
                maneuver_instruction: "Arrived!".to_string(),
                next_maneuver_preview: String::new(),
                remaining_distance: format_km(0.0),
                eta_clock,
                eta_seconds: 0.0,
            };
        };

        // After an advance the tracker's distance refers to the completed
        // step, so measure the new one directly.
        let to_step = if progress.step_advanced {
            haversine(&fix.point(), &step.anchor)
        } else {
            progress.distance_to_step_m
        };

        let preview = match route.step(index + 1) {
            Some(next) => format!("Then: {}", next.instruction),
            None => "Then: Arrive".to_string(),
        };

        let remaining = if route.geometry().len() >= 2 {
            remaining_distance_along_polyline(route.geometry(), &fix.point())
        } else {
            eta.remaining_planned_m
        };

        Self {
            distance_to_next_maneuver: format_distance(to_step),
            maneuver_instruction: step.instruction.clone(),
            next_maneuver_preview: preview,
            remaining_distance: format_km(remaining),
            eta_clock,
            eta_seconds: eta.seconds,
        }
    }
}

/// Banner distance: whole meters below a kilometer ("153m"), one decimal
/// above ("2.5km").
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m", meters.round() as i64)
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

/// Kilometers with one decimal, e.g. "0.8 km".
pub fn format_km(meters: f64) -> String {
    format!("{:.1} km", meters / 1000.0)
}

/// Wall-clock arrival time as `H:MM`, or `--:--` if it cannot be computed.
pub fn eta_clock_text(now_ms: u64, eta_s: f64, offset: &FixedOffset) -> String {
    if !eta_s.is_finite() || eta_s < 0.0 {
        return "--:--".to_string();
    }

    let arrival_ms = (now_ms as f64 + eta_s * 1000.0).round() as i64;
    match DateTime::from_timestamp_millis(arrival_ms) {
        Some(at) => at.with_timezone(offset).format("%-H:%M").to_string(),
        None => "--:--".to_string(),
    }
}
