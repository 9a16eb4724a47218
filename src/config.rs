//! Navigation tuning parameters.
//!
//! Every field has a default, so a host can pass `{}` or override only
//! the thresholds it cares about.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};

/// Thresholds and options for a navigation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavConfig {
    /// Distance to the current step anchor below which the step is
    /// considered completed (default: 20 m)
    #[serde(default = "default_advance_threshold")]
    pub advance_threshold_m: f64,

    /// Distance from the route geometry beyond which a reroute is
    /// requested (default: 40 m)
    #[serde(default = "default_off_route_threshold")]
    pub off_route_threshold_m: f64,

    /// Distance to the next maneuver at which it is pre-announced
    /// (default: 80 m)
    #[serde(default = "default_pre_announce")]
    pub pre_announce_m: f64,

    /// Elapsed time before observed speed is blended into the ETA
    /// (default: 30 s)
    #[serde(default = "default_eta_min_elapsed")]
    pub eta_min_elapsed_s: f64,

    /// Traveled distance before observed speed is blended into the ETA
    /// (default: 100 m)
    #[serde(default = "default_eta_min_traveled")]
    pub eta_min_traveled_m: f64,

    /// Weight of the planned-duration baseline in the blended ETA;
    /// the observed-speed estimate gets the remainder (default: 0.7)
    #[serde(default = "default_eta_planned_weight")]
    pub eta_planned_weight: f64,

    /// Fixes older than this, relative to the host clock, are dropped
    /// (default: 5000 ms)
    #[serde(default = "default_max_fix_age")]
    pub max_fix_age_ms: u64,

    /// Request high-accuracy fixes from the location source (default: true)
    #[serde(default = "default_true")]
    pub high_accuracy: bool,

    /// Location source timeout (default: 10000 ms)
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_ms: u64,

    /// Map zoom used for camera-follow updates (default: 18)
    #[serde(default = "default_follow_zoom")]
    pub follow_zoom: u8,

    /// Speak guidance (default: true)
    #[serde(default = "default_true")]
    pub voice_enabled: bool,

    /// Offset used for the ETA clock text. Falls back to the device's
    /// local offset when absent.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Real-world offsets span UTC-12:00 to UTC+14:00.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

fn default_advance_threshold() -> f64 {
    20.0
}

fn default_off_route_threshold() -> f64 {
    40.0
}

fn default_pre_announce() -> f64 {
    80.0
}

fn default_eta_min_elapsed() -> f64 {
    30.0
}

fn default_eta_min_traveled() -> f64 {
    100.0
}

fn default_eta_planned_weight() -> f64 {
    0.7
}

fn default_max_fix_age() -> u64 {
    5_000
}

fn default_fix_timeout() -> u64 {
    10_000
}

fn default_follow_zoom() -> u8 {
    18
}

fn default_true() -> bool {
    true
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            advance_threshold_m: default_advance_threshold(),
            off_route_threshold_m: default_off_route_threshold(),
            pre_announce_m: default_pre_announce(),
            eta_min_elapsed_s: default_eta_min_elapsed(),
            eta_min_traveled_m: default_eta_min_traveled(),
            eta_planned_weight: default_eta_planned_weight(),
            max_fix_age_ms: default_max_fix_age(),
            high_accuracy: true,
            fix_timeout_ms: default_fix_timeout(),
            follow_zoom: default_follow_zoom(),
            voice_enabled: true,
            utc_offset_minutes: None,
        }
    }
}

impl NavConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NavConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("advance_threshold_m", self.advance_threshold_m),
            ("off_route_threshold_m", self.off_route_threshold_m),
            ("pre_announce_m", self.pre_announce_m),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(NavError::Config(format!("{name} must be positive, got {value}")));
            }
        }

        if self.pre_announce_m < self.advance_threshold_m {
            return Err(NavError::Config(
                "pre_announce_m must not be smaller than advance_threshold_m".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.eta_planned_weight) {
            return Err(NavError::Config(format!(
                "eta_planned_weight must be within [0, 1], got {}",
                self.eta_planned_weight
            )));
        }

        if let Some(minutes) = self.utc_offset_minutes {
            if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&minutes) {
                return Err(NavError::Config(format!(
                    "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {minutes}"
                )));
            }
        }

        Ok(())
    }
}
