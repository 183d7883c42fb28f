//! Position + heading fusion engine.
//!
//! Combines two independent sensor streams into a single [`LocalSample`]:
//!
//! - **Orientation** – compass readings, never throttled, each one folded
//!   into a circular low-pass [`HeadingFilter`].
//! - **Location** – position fixes, accepted at most once per interval
//!   (1000 ms by default).  Fixes that arrive sooner are discarded, not
//!   queued.
//!
//! Heading precedence for an accepted fix:
//!
//! 1. once any compass reading has arrived, the smoothed compass estimate is
//!    used and the fix's own heading is ignored;
//! 2. otherwise the fix's course (when present) is used raw and seeds the
//!    filter for later smoothing;
//! 3. otherwise the current estimate is used.
//!
//! The engine is synchronous and takes the arrival time as an argument, so it
//! can be driven from a virtual clock.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use questhud_perception::fusion::FusionEngine;
//! use questhud_perception::sources::{LocationReading, OrientationReading};
//! use tokio::time::Instant;
//!
//! let mut engine = FusionEngine::default();
//! engine.update_orientation(OrientationReading::compass(90.0));
//!
//! let fix = LocationReading {
//!     lat: 37.77, lon: -122.41, accuracy: 5.0,
//!     heading: Some(180.0), timestamp_ms: 0,
//! };
//! let now = Instant::now();
//! let sample = engine.update_location(&fix, now).expect("first fix is accepted");
//! assert!((sample.heading - 27.0).abs() < 1e-9);
//! assert!(engine.update_location(&fix, now + Duration::from_millis(10)).is_none());
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::heading::{DEFAULT_SMOOTHING, HeadingFilter};
use crate::sources::{LocationReading, OrientationReading};

/// Minimum spacing between accepted location fixes.
pub const DEFAULT_LOCATION_INTERVAL: Duration = Duration::from_millis(1000);

/// A fused local position and heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSample {
    pub lat: f64,
    pub lon: f64,
    /// Degrees in `[0, 360)`, clockwise from north.
    pub heading: f64,
    /// Monotonic time at which the fix was accepted.
    pub timestamp: Instant,
}

/// Throttle gate plus heading filter.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    filter: HeadingFilter,
    interval: Duration,
    last_accepted: Option<Instant>,
    has_compass: bool,
}

impl FusionEngine {
    /// Create an engine with the given throttle `interval` and smoothing
    /// factor `alpha`.
    pub fn new(interval: Duration, alpha: f64) -> Self {
        Self {
            filter: HeadingFilter::new(alpha),
            interval,
            last_accepted: None,
            has_compass: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` once any orientation reading with a heading has been applied.
    pub fn has_compass(&self) -> bool {
        self.has_compass
    }

    /// Fold an orientation reading into the heading estimate.
    ///
    /// Readings without a usable heading are ignored and return `false`.
    pub fn update_orientation(&mut self, reading: OrientationReading) -> bool {
        let Some(raw) = reading.heading() else {
            return false;
        };
        self.has_compass = true;
        self.filter.update(raw);
        true
    }

    /// Offer a location fix that arrived at `now`.
    ///
    /// Returns the new sample when the fix passes the throttle gate, `None`
    /// when it is discarded.
    pub fn update_location(
        &mut self,
        reading: &LocationReading,
        now: Instant,
    ) -> Option<LocalSample> {
        if let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) < self.interval
        {
            return None;
        }
        self.last_accepted = Some(now);

        if !self.has_compass
            && let Some(course) = reading.heading.filter(|h| h.is_finite())
        {
            self.filter.seed(course);
        }

        Some(LocalSample {
            lat: reading.lat,
            lon: reading.lon,
            heading: self.filter.estimate(),
            timestamp: now,
        })
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_LOCATION_INTERVAL, DEFAULT_SMOOTHING)
    }
}
