//! Time-of-arrival estimation.
//!
//! The baseline scales the provider's planned duration by the share of
//! distance left. Once enough of the trip has been observed, the
//! traveler's actual average speed is blended in, which corrects for
//! traffic or a slower pace than the provider assumed.

use serde::Serialize;

use crate::config::NavConfig;
use crate::geometry::haversine;
use crate::location::PositionFix;
use crate::route::{Profile, Route};
use crate::state::NavigationState;

/// Reported speeds are floored to this to keep estimates bounded.
const MIN_SPEED_MPS: f64 = 1.0;

/// Assumed speed per profile when the fix carries none.
fn default_speed_mps(profile: Profile) -> f64 {
    match profile {
        Profile::Walking => 1.4,
        Profile::Cycling => 4.5,
        Profile::Driving => 10.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Eta {
    pub seconds: f64,
    /// Planned distance still ahead, in meters.
    pub remaining_planned_m: f64,
    /// Whether observed speed contributed to `seconds`.
    pub blended: bool,
}

#[derive(Debug, Clone)]
pub struct EtaEstimator {
    min_elapsed_s: f64,
    min_traveled_m: f64,
    planned_weight: f64,
}

impl EtaEstimator {
    pub fn new(config: &NavConfig) -> Self {
        Self {
            min_elapsed_s: config.eta_min_elapsed_s,
            min_traveled_m: config.eta_min_traveled_m,
            planned_weight: config.eta_planned_weight,
        }
    }

    pub fn estimate(&self, route: &Route, state: &NavigationState, fix: &PositionFix) -> Eta {
        let remaining = remaining_planned_m(route, state, fix);

        if route.total_duration_s() <= 0.0 {
            // The provider sent no duration to scale
            return Eta {
                seconds: time_to_cover(remaining, fix, route.profile()),
                remaining_planned_m: remaining,
                blended: false,
            };
        }

        let ratio = if route.total_distance_m() > 0.0 {
            remaining / route.total_distance_m()
        } else {
            0.0
        };
        let baseline = route.total_duration_s() * ratio;

        let elapsed_s = fix.timestamp_ms.saturating_sub(state.generation_start_ms) as f64 / 1000.0;
        let traveled = state.traveled_distance_m;

        if elapsed_s > self.min_elapsed_s && traveled > self.min_traveled_m {
            let observed_speed = traveled / elapsed_s;
            let alternative = remaining / observed_speed;
            Eta {
                seconds: self.planned_weight * baseline + (1.0 - self.planned_weight) * alternative,
                remaining_planned_m: remaining,
                blended: true,
            }
        } else {
            Eta {
                seconds: baseline,
                remaining_planned_m: remaining,
                blended: false,
            }
        }
    }
}

/// Planned distance ahead: the lengths of all steps not yet completed
/// plus the live distance to the current anchor.
pub fn remaining_planned_m(route: &Route, state: &NavigationState, fix: &PositionFix) -> f64 {
    let steps = route.steps();
    let index = state.current_step_index.min(steps.len());

    let planned: f64 = steps[index..].iter().map(|s| s.distance_m).sum();
    let live = steps
        .get(index)
        .map(|s| haversine(&fix.point(), &s.anchor))
        .unwrap_or(0.0);

    planned + live
}

/// Seconds needed to cover `distance_m` at the fix's speed.
///
/// Reported speeds are floored at 1 m/s; without a usable speed the
/// profile's typical speed is assumed.
pub fn time_to_cover(distance_m: f64, fix: &PositionFix, profile: Profile) -> f64 {
    let speed = match fix.speed {
        Some(s) if s > 0.0 => s.max(MIN_SPEED_MPS),
        _ => default_speed_mps(profile),
    };
    distance_m / speed
}
