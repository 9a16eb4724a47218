//! Mutable per-session navigation state.

use serde::Serialize;

/// Progress bookkeeping for the active route generation.
///
/// `current_step_index` and `traveled_distance_m` only grow while
/// `route_generation` stays the same; installing a new route resets them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationState {
    pub(crate) current_step_index: usize,
    pub(crate) traveled_distance_m: f64,
    pub(crate) session_start_ms: u64,
    /// Start of the sample window for observed speed; moves to the
    /// install time of each new route, together with the distance reset.
    pub(crate) generation_start_ms: u64,
    pub(crate) route_generation: u64,
    pub(crate) pending_reroute: bool,
    pub(crate) following_camera: bool,
}

impl NavigationState {
    pub fn new(session_start_ms: u64, route_generation: u64) -> Self {
        Self {
            current_step_index: 0,
            traveled_distance_m: 0.0,
            session_start_ms,
            generation_start_ms: session_start_ms,
            route_generation,
            pending_reroute: false,
            following_camera: true,
        }
    }

    /// Index of the step being approached. Equal to the step count once
    /// arrived.
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Distance attributed to completed steps, in meters.
    pub fn traveled_distance_m(&self) -> f64 {
        self.traveled_distance_m
    }

    pub fn session_start_ms(&self) -> u64 {
        self.session_start_ms
    }

    pub fn route_generation(&self) -> u64 {
        self.route_generation
    }

    /// Whether a reroute request is outstanding.
    pub fn pending_reroute(&self) -> bool {
        self.pending_reroute
    }

    pub fn following_camera(&self) -> bool {
        self.following_camera
    }

    /// Restart step tracking for a freshly installed route.
    pub(crate) fn reset_for(&mut self, generation: u64, now_ms: u64) {
        self.current_step_index = 0;
        self.traveled_distance_m = 0.0;
        self.generation_start_ms = now_ms;
        self.route_generation = generation;
        self.pending_reroute = false;
    }
}
