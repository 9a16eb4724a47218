//! Off-route detection.
//!
//! Deviation is measured against the full route geometry rather than the
//! next anchor, which misfires near sharp turns. Routes without a usable
//! geometry fall back to the current anchor.

use log::info;

use crate::geometry::{haversine, nearest_distance_to_polyline};
use crate::location::PositionFix;
use crate::route::Route;
use crate::state::NavigationState;

#[derive(Debug, Clone)]
pub struct OffRouteMonitor {
    threshold_m: f64,
}

impl OffRouteMonitor {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    /// Distance from the fix to the planned path, in meters. None when the
    /// route has neither geometry nor a step left to measure against.
    pub fn deviation_m(&self, fix: &PositionFix, route: &Route, state: &NavigationState) -> Option<f64> {
        let position = fix.point();
        if route.geometry().len() >= 2 {
            return nearest_distance_to_polyline(&position, route.geometry());
        }
        route
            .step(state.current_step_index)
            .map(|step| haversine(&position, &step.anchor))
    }

    /// Decide whether this fix warrants a reroute.
    ///
    /// Returns true at most once per outstanding request: the pending flag
    /// is set here and only cleared when a route is installed or the
    /// request fails.
    pub fn evaluate(&self, fix: &PositionFix, route: &Route, state: &mut NavigationState) -> bool {
        if state.pending_reroute || state.current_step_index >= route.step_count() {
            return false;
        }

        match self.deviation_m(fix, route, state) {
            Some(deviation) if deviation > self.threshold_m => {
                info!(
                    "Off route by {:.0} m (threshold {:.0} m), requesting reroute",
                    deviation, self.threshold_m
                );
                state.pending_reroute = true;
                true
            }
            _ => false,
        }
    }
}
