//! Spoken guidance scheduling.
//!
//! Decides what to say and when; rendering speech is the host's job.
//! Only one utterance is ever active: every new intent supersedes the
//! previous one instead of queueing behind it, so the traveler never
//! hears stale guidance.

use log::debug;
use serde::Serialize;

use crate::progress::Progress;
use crate::route::Route;
use crate::state::NavigationState;

const START_TEXT: &str = "Starting navigation.";
const ARRIVAL_TEXT: &str = "You have arrived at your destination.";
const REROUTE_TEXT: &str = "Rerouting.";

/// A request to speak `text`, replacing any utterance still playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechIntent {
    pub id: u64,
    pub text: String,
}

/// Announcement lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Pending,
    PreAnnounced,
    Completed,
}

/// Phase of step `index` given the current progress.
pub fn step_phase(route: &Route, state: &NavigationState, index: usize) -> StepPhase {
    if index < state.current_step_index {
        StepPhase::Completed
    } else if route.step(index).is_some_and(|s| s.is_announced()) {
        StepPhase::PreAnnounced
    } else {
        StepPhase::Pending
    }
}

#[derive(Debug, Clone)]
pub struct AnnouncementScheduler {
    pre_announce_m: f64,
    voice_enabled: bool,
    next_id: u64,
    active: Option<u64>,
    arrival_announced: bool,
}

impl AnnouncementScheduler {
    pub fn new(pre_announce_m: f64, voice_enabled: bool) -> Self {
        Self {
            pre_announce_m,
            voice_enabled,
            next_id: 1,
            active: None,
            arrival_announced: false,
        }
    }

    /// Decide the announcement for one processed fix.
    ///
    /// Per fix, at most one intent is produced, by priority: arrival,
    /// completion of the step just passed ("Now, ..."), pre-announcement
    /// of the current step, rerouting notice. Step flags are updated even
    /// when the voice is muted.
    pub fn decide(
        &mut self,
        progress: &Progress,
        route: &mut Route,
        state: &NavigationState,
        rerouting: bool,
    ) -> Option<SpeechIntent> {
        let text = if progress.arrived {
            if self.arrival_announced {
                return None;
            }
            self.arrival_announced = true;
            ARRIVAL_TEXT.to_string()
        } else if let Some(done) = progress.completed_step {
            let instruction = route.step(done).map(|s| s.instruction.as_str()).unwrap_or_default();
            format!("Now, {instruction}")
        } else if progress.distance_to_step_m < self.pre_announce_m
            && route.mark_announced(state.current_step_index)
        {
            let instruction = route
                .step(state.current_step_index)
                .map(|s| s.instruction.as_str())
                .unwrap_or_default();
            format!("In {} meters, {instruction}", round_to_ten(progress.distance_to_step_m))
        } else if rerouting {
            REROUTE_TEXT.to_string()
        } else {
            return None;
        };

        self.issue(text)
    }

    /// The one-shot greeting when navigation starts.
    pub fn announce_start(&mut self) -> Option<SpeechIntent> {
        self.issue(START_TEXT.to_string())
    }

    /// Arrival announcement for routes that are arrived without any fix
    /// (zero steps). Shares the one-shot flag with `decide`.
    pub fn announce_arrival(&mut self) -> Option<SpeechIntent> {
        if self.arrival_announced {
            return None;
        }
        self.arrival_announced = true;
        self.issue(ARRIVAL_TEXT.to_string())
    }

    /// Cancel the active utterance. Returns its id, if one was active.
    pub fn cancel(&mut self) -> Option<u64> {
        self.active.take()
    }

    /// The host finished (or failed) speaking utterance `id`.
    pub fn finished(&mut self, id: u64) {
        if self.active == Some(id) {
            self.active = None;
        }
    }

    pub fn active(&self) -> Option<u64> {
        self.active
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    /// Mute or unmute. Muting cancels the active utterance; its id is
    /// returned so the host can stop it.
    pub fn set_voice_enabled(&mut self, enabled: bool) -> Option<u64> {
        self.voice_enabled = enabled;
        if enabled {
            None
        } else {
            self.cancel()
        }
    }

    /// Forget arrival for a newly installed route.
    pub fn reset_for_new_route(&mut self) {
        self.arrival_announced = false;
    }

    fn issue(&mut self, text: String) -> Option<SpeechIntent> {
        if !self.voice_enabled {
            debug!("Voice muted, skipping: {text}");
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        if let Some(previous) = self.active.replace(id) {
            debug!("Utterance {id} supersedes {previous}");
        }
        Some(SpeechIntent { id, text })
    }
}

fn round_to_ten(meters: f64) -> i64 {
    (meters / 10.0).round() as i64 * 10
}
