//! Position fixes and the location-source boundary.
//!
//! The engine never polls a sensor. A host-side source is subscribed
//! when navigation starts and pushes each fix into the session.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::geometry::Point;

/// A single timestamped position reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    /// Ground speed in m/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Horizontal accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl PositionFix {
    pub fn new(lat: f64, lon: f64, timestamp_ms: u64) -> Self {
        Self {
            lat,
            lon,
            speed: None,
            heading: None,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    /// Reject fixes with coordinates no sensor could have produced.
    ///
    /// Negative or non-finite optional readings are cleared rather than
    /// rejecting the whole fix.
    pub fn validated(mut self) -> Result<Self> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(NavError::InvalidFix(format!("latitude {} out of range", self.lat)));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(NavError::InvalidFix(format!("longitude {} out of range", self.lon)));
        }

        self.speed = self.speed.filter(|s| s.is_finite() && *s >= 0.0);
        self.heading = self.heading.filter(|h| h.is_finite());
        self.accuracy = self.accuracy.filter(|a| a.is_finite() && *a >= 0.0);
        Ok(self)
    }
}

/// Subscription options passed to the location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    pub high_accuracy: bool,
    /// Cached fixes older than this must not be delivered.
    pub max_fix_age_ms: u64,
    pub timeout_ms: u64,
}

/// Opaque handle identifying a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

/// A source of position fixes, e.g. the platform geolocation service.
pub trait LocationSource {
    /// Start delivering fixes. Fails with `PositionUnavailable` when the
    /// sensor is denied or cannot be reached.
    fn subscribe(&mut self, options: SubscribeOptions) -> Result<SubscriptionHandle>;

    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_fix_passes() {
        let fix = PositionFix::new(48.2, 16.37, 1_000).with_speed(3.0);
        assert_eq!(fix.validated().unwrap(), fix);
    }

    #[test]
    fn out_of_range_latitude_rejected() {
        let result = PositionFix::new(91.0, 0.0, 0).validated();
        assert!(matches!(result, Err(NavError::InvalidFix(_))));
    }

    #[test]
    fn nan_longitude_rejected() {
        assert!(PositionFix::new(0.0, f64::NAN, 0).validated().is_err());
    }

    #[test]
    fn bogus_optionals_are_cleared() {
        let mut fix = PositionFix::new(10.0, 10.0, 0);
        fix.speed = Some(-1.0);
        fix.accuracy = Some(f64::INFINITY);
        fix.heading = Some(f64::NAN);

        let fix = fix.validated().unwrap();
        assert_eq!(fix.speed, None);
        assert_eq!(fix.accuracy, None);
        assert_eq!(fix.heading, None);
    }

    #[test]
    fn fix_json_without_optionals() {
        let fix: PositionFix =
            serde_json::from_str(r#"{"lat": 1.0, "lon": 2.0, "timestamp_ms": 5}"#).unwrap();
        assert_eq!(fix, PositionFix::new(1.0, 2.0, 5));
    }
}
