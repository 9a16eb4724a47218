//! Step progress tracking.
//!
//! A step is completed when a fix comes within the advance threshold of
//! its anchor. At most one step completes per fix, so a cluster of
//! closely spaced maneuvers is walked through one fix at a time.

use log::debug;
use serde::Serialize;

use crate::geometry::haversine;
use crate::location::PositionFix;
use crate::route::Route;
use crate::state::NavigationState;

/// Outcome of feeding one fix to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    /// Distance from the fix to the anchor of the step that was current
    /// when the fix arrived, in meters. 0 once arrived.
    pub distance_to_step_m: f64,
    pub step_advanced: bool,
    pub arrived: bool,
    /// Index of the step this fix completed, if any.
    pub completed_step: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    advance_threshold_m: f64,
}

impl ProgressTracker {
    pub fn new(advance_threshold_m: f64) -> Self {
        Self { advance_threshold_m }
    }

    pub fn advance(&self, fix: &PositionFix, route: &Route, state: &mut NavigationState) -> Progress {
        let Some(step) = route.step(state.current_step_index) else {
            // Zero-step routes land here on the first fix
            return Progress {
                distance_to_step_m: 0.0,
                step_advanced: false,
                arrived: true,
                completed_step: None,
            };
        };

        let distance = haversine(&fix.point(), &step.anchor);
        if distance >= self.advance_threshold_m {
            return Progress {
                distance_to_step_m: distance,
                step_advanced: false,
                arrived: false,
                completed_step: None,
            };
        }

        let completed = state.current_step_index;
        state.current_step_index += 1;
        state.traveled_distance_m += step.distance_m;
        debug!(
            "Completed step {} ({}) at {:.1} m, traveled {:.0} m",
            completed, step.instruction, distance, state.traveled_distance_m
        );

        Progress {
            distance_to_step_m: distance,
            step_advanced: true,
            arrived: state.current_step_index >= route.step_count(),
            completed_step: Some(completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::route::{Profile, RouteStep};

    /// Meters of latitude per degree for the offsets below.
    const M_PER_DEG: f64 = 111_195.0;

    fn route(anchors: &[(f64, f64)], distances: &[f64]) -> Route {
        let steps = anchors
            .iter()
            .zip(distances)
            .map(|(&(lat, lon), &d)| RouteStep::new(Point::new(lat, lon), "turn", Some("left".into()), None, d))
            .collect();
        Route::new(steps, Vec::new(), distances.iter().sum(), 100.0, Profile::Driving)
    }

    fn fix_south_of(anchor_lat: f64, meters: f64, t: u64) -> PositionFix {
        PositionFix::new(anchor_lat - meters / M_PER_DEG, 0.0, t)
    }

    #[test]
    fn approach_fires_exactly_once() {
        let route = route(&[(0.0, 0.0), (0.0045, 0.0)], &[500.0, 300.0]);
        let mut state = NavigationState::new(0, 0);
        let tracker = ProgressTracker::new(20.0);

        let mut fired_at = Vec::new();
        // 505 m down to 5 m in 10 m steps
        for (i, meters) in (0..=50).rev().map(|m| m as f64 * 10.0 + 5.0).enumerate() {
            let progress = tracker.advance(&fix_south_of(0.0, meters, i as u64), &route, &mut state);
            if progress.step_advanced {
                fired_at.push(meters);
            }
        }

        assert_eq!(fired_at, vec![15.0], "advance must fire once, at the first fix below 20 m");
        assert_eq!(state.current_step_index(), 1);
        assert_eq!(state.traveled_distance_m(), 500.0);
    }

    #[test]
    fn one_step_per_fix_even_when_anchors_coincide() {
        let route = route(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)], &[10.0, 10.0, 10.0]);
        let mut state = NavigationState::new(0, 0);
        let tracker = ProgressTracker::new(20.0);
        let at_anchor = PositionFix::new(0.0, 0.0, 0);

        for expected in 1..=3 {
            let before = state.current_step_index();
            let progress = tracker.advance(&at_anchor, &route, &mut state);
            assert!(progress.step_advanced);
            assert_eq!(state.current_step_index(), before + 1);
            assert_eq!(state.current_step_index(), expected);
        }
        assert!(tracker.advance(&at_anchor, &route, &mut state).arrived);
    }

    #[test]
    fn arrival_on_last_step() {
        let route = route(&[(0.0, 0.0)], &[0.0]);
        let mut state = NavigationState::new(0, 0);
        let tracker = ProgressTracker::new(20.0);

        let progress = tracker.advance(&PositionFix::new(0.0, 0.0, 0), &route, &mut state);
        assert!(progress.step_advanced);
        assert!(progress.arrived);
        assert_eq!(progress.completed_step, Some(0));

        // Further fixes do no step work
        let progress = tracker.advance(&fix_south_of(0.0, 5.0, 1), &route, &mut state);
        assert!(progress.arrived);
        assert!(!progress.step_advanced);
        assert_eq!(state.current_step_index(), 1);
    }

    #[test]
    fn zero_step_route_is_arrived() {
        let route = route(&[], &[]);
        let mut state = NavigationState::new(0, 0);
        let progress = ProgressTracker::new(20.0).advance(&PositionFix::new(1.0, 1.0, 0), &route, &mut state);
        assert!(progress.arrived);
        assert_eq!(progress.distance_to_step_m, 0.0);
    }

    #[test]
    fn far_fix_reports_distance() {
        let route = route(&[(0.0, 0.0)], &[100.0]);
        let mut state = NavigationState::new(0, 0);
        let progress = ProgressTracker::new(20.0).advance(&fix_south_of(0.0, 250.0, 0), &route, &mut state);
        assert!(!progress.step_advanced);
        assert!((progress.distance_to_step_m - 250.0).abs() < 1.0);
    }
}
