//! Turn-by-turn navigation tracking engine.
//!
//! Follows a precomputed route against a live stream of position fixes:
//! step progress, off-route detection with single-flight rerouting,
//! blended ETA, and spoken guidance decisions. Rendering, speech
//! synthesis and route computation are left to the host.

pub mod android_jni;
pub mod announce;
pub mod config;
pub mod display;
pub mod error;
pub mod eta;
pub mod geometry;
pub mod instructions;
pub mod location;
pub mod off_route;
pub mod polyline;
pub mod progress;
pub mod route;
pub mod session;
pub mod state;

pub use config::NavConfig;
pub use error::{NavError, Result};
pub use geometry::Point;
pub use location::{LocationSource, PositionFix};
pub use route::{Profile, Route, RouteStep};
pub use session::{NavEvent, NavigationSession};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
