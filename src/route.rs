//! Route model and routing-provider ingestion.
//!
//! A `Route` is an immutable snapshot of the active route. It is built
//! once per routing response and replaced wholesale on reroute. The only
//! mutable bit is the per-step `announced` flag, which the session flips.
//!
//! Provider responses are loosely typed JSON. They are validated here so
//! nothing downstream has to guess at missing fields: a response that
//! does not carry usable steps becomes a zero-step route, which the
//! session treats as already arrived.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::geometry::Point;
use crate::instructions::instruction_text;
use crate::polyline;

/// Travel mode the route was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Driving,
    Walking,
    Cycling,
}

impl Profile {
    /// Parse a provider profile name. Accepts the common aliases.
    pub fn parse(name: &str) -> Option<Profile> {
        match name.trim().to_ascii_lowercase().as_str() {
            "driving" | "car" => Some(Profile::Driving),
            "walking" | "foot" => Some(Profile::Walking),
            "cycling" | "bike" | "bicycle" => Some(Profile::Cycling),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Driving => "driving",
            Profile::Walking => "walking",
            Profile::Cycling => "cycling",
        }
    }
}

/// One maneuver of a route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteStep {
    /// Location of the maneuver.
    pub anchor: Point,
    /// Human-readable instruction, e.g. "turn left onto Main St".
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub road_name: Option<String>,
    pub maneuver_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
    /// Length of this step's traversal, in meters.
    pub distance_m: f64,
    announced: bool,
}

impl RouteStep {
    pub fn new(
        anchor: Point,
        maneuver_type: impl Into<String>,
        modifier: Option<String>,
        road_name: Option<String>,
        distance_m: f64,
    ) -> Self {
        let maneuver_type = maneuver_type.into();
        let instruction = instruction_text(&maneuver_type, modifier.as_deref(), road_name.as_deref());
        Self {
            anchor,
            instruction,
            road_name,
            maneuver_type,
            modifier,
            distance_m,
            announced: false,
        }
    }

    /// Whether the pre-arrival announcement has fired for this step.
    pub fn is_announced(&self) -> bool {
        self.announced
    }
}

/// Immutable snapshot of the active route.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    steps: Vec<RouteStep>,
    geometry: Vec<Point>,
    total_distance_m: f64,
    total_duration_s: f64,
    profile: Profile,
    generation: u64,
}

impl Route {
    pub fn new(
        steps: Vec<RouteStep>,
        geometry: Vec<Point>,
        total_distance_m: f64,
        total_duration_s: f64,
        profile: Profile,
    ) -> Self {
        Self {
            steps,
            geometry,
            total_distance_m: sanitize(total_distance_m),
            total_duration_s: sanitize(total_duration_s),
            profile,
            generation: 0,
        }
    }

    /// Build a route from a provider response.
    ///
    /// Never fails: steps whose location is not a `[lon, lat]` pair are
    /// dropped, and an undecodable geometry becomes empty.
    pub fn from_response(response: &RouteResponse, profile: Profile) -> Self {
        let steps: Vec<RouteStep> = response
            .legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .filter_map(|step| {
                let anchor = match step.maneuver.location.as_slice() {
                    [lon, lat] if lat.is_finite() && lon.is_finite() => Point::new(*lat, *lon),
                    other => {
                        warn!("Dropping step with malformed location {other:?}");
                        return None;
                    }
                };
                let name = step.name.clone().filter(|n| !n.trim().is_empty());
                Some(RouteStep::new(
                    anchor,
                    step.maneuver.kind.clone(),
                    step.maneuver.modifier.clone(),
                    name,
                    sanitize(step.distance),
                ))
            })
            .collect();

        let geometry = match response.geometry.as_deref() {
            Some(encoded) => polyline::decode(encoded).unwrap_or_else(|e| {
                warn!("Discarding route geometry: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        if steps.is_empty() {
            warn!("Route response carries no usable steps");
        }

        Route::new(steps, geometry, response.distance, response.duration, profile)
    }

    pub fn steps(&self) -> &[RouteStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&RouteStep> {
        self.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn geometry(&self) -> &[Point] {
        &self.geometry
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn total_duration_s(&self) -> f64 {
        self.total_duration_s
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Final point of the route: the geometry's end, or the last anchor.
    pub fn destination(&self) -> Option<Point> {
        self.geometry
            .last()
            .or_else(|| self.steps.last().map(|s| &s.anchor))
            .copied()
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Flip a step's announced flag. Returns false if it was already set
    /// or the index is out of range.
    pub(crate) fn mark_announced(&mut self, index: usize) -> bool {
        match self.steps.get_mut(index) {
            Some(step) if !step.announced => {
                step.announced = true;
                true
            }
            _ => false,
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// A single route as returned by the routing provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub geometry: Option<String>,
    #[serde(default)]
    pub legs: Vec<LegResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegResponse {
    #[serde(default)]
    pub steps: Vec<StepResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepResponse {
    #[serde(default)]
    pub maneuver: ManeuverResponse,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub distance: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManeuverResponse {
    /// `[longitude, latitude]`
    #[serde(default)]
    pub location: Vec<f64>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub modifier: Option<String>,
}

/// Extract the first route from a provider response envelope
/// (`{"routes": [...]}`).
///
/// An unparseable body or an empty route list is a fetch failure. A
/// route entry with the wrong shape is malformed, not a failure, and
/// comes back as an empty response.
pub fn parse_directions(json: &str) -> Result<RouteResponse> {
    let body: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| NavError::RouteFetch(format!("invalid response body: {e}")))?;

    let first = body
        .get("routes")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .ok_or_else(|| NavError::RouteFetch("No route found.".to_string()))?;

    Ok(serde_json::from_value(first.clone()).unwrap_or_else(|e| {
        warn!("Malformed route in response: {e}");
        RouteResponse::default()
    }))
}
