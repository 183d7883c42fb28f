//! Simulated sensors for running the HUD without a device.
//!
//! [`SimulatedLocationSource`] walks a small circle around a centre point and
//! reports the tangent as its course, much like a player jogging laps around
//! a block.  [`SimulatedOrientationSource`] replays a fixed list of compass
//! headings.  Both run on Tokio time, so they also behave under a paused
//! test clock.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use questhud_perception::sim::{SimulatedLocationSource, SimulatedOrientationSource};
//!
//! let location = Arc::new(SimulatedLocationSource::new(37.7749, -122.4194));
//! let orientation = Arc::new(SimulatedOrientationSource::new(vec![0.0, 15.0, 30.0]));
//! ```

use std::f64::consts::TAU;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::stream;

use crate::heading::normalize_degrees;
use crate::sources::{
    LocationError, LocationReading, LocationSource, LocationStream, OrientationConsent,
    OrientationReading, OrientationSource, OrientationStream,
};

/// Radius of the simulated lap (degrees, roughly 200 m).
pub const DEFAULT_RADIUS_DEG: f64 = 0.002;
/// Angle advanced per fix (radians).
pub const DEFAULT_ANGULAR_STEP: f64 = 0.02;
/// Time between simulated fixes.
pub const DEFAULT_FIX_PERIOD: Duration = Duration::from_millis(200);

/// Position sensor that circles `center` forever.
#[derive(Debug, Clone)]
pub struct SimulatedLocationSource {
    center_lat: f64,
    center_lon: f64,
    radius_deg: f64,
    angular_step: f64,
    period: Duration,
    accuracy: f64,
}

impl SimulatedLocationSource {
    pub fn new(center_lat: f64, center_lon: f64) -> Self {
        Self {
            center_lat,
            center_lon,
            radius_deg: DEFAULT_RADIUS_DEG,
            angular_step: DEFAULT_ANGULAR_STEP,
            period: DEFAULT_FIX_PERIOD,
            accuracy: 5.0,
        }
    }

    /// Override the time between fixes (builder-style).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Override the lap radius in degrees (builder-style).
    pub fn with_radius(mut self, radius_deg: f64) -> Self {
        self.radius_deg = radius_deg;
        self
    }

    /// The fix at lap angle `angle` (radians).
    pub fn reading_at(&self, angle: f64) -> LocationReading {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        LocationReading {
            lat: self.center_lat + self.radius_deg * angle.cos(),
            lon: self.center_lon + self.radius_deg * angle.sin(),
            accuracy: self.accuracy,
            heading: Some(normalize_degrees(angle.to_degrees() + 90.0)),
            timestamp_ms,
        }
    }
}

#[async_trait]
impl LocationSource for SimulatedLocationSource {
    async fn watch(&self) -> Result<LocationStream, LocationError> {
        let sim = self.clone();
        let fixes = stream::unfold(0.0_f64, move |angle| {
            let sim = sim.clone();
            async move {
                tokio::time::sleep(sim.period).await;
                let next = (angle + sim.angular_step) % TAU;
                Some((Ok(sim.reading_at(next)), next))
            }
        });
        Ok(Box::pin(fixes))
    }
}

/// Compass that cycles through a fixed list of headings.
#[derive(Debug, Clone)]
pub struct SimulatedOrientationSource {
    headings: Vec<f64>,
    period: Duration,
    consent: OrientationConsent,
}

impl SimulatedOrientationSource {
    pub fn new(headings: Vec<f64>) -> Self {
        Self {
            headings,
            period: Duration::from_millis(50),
            consent: OrientationConsent::NotRequired,
        }
    }

    /// Override the time between readings (builder-style).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Answer the consent prompt with `consent` (builder-style).
    pub fn with_consent(mut self, consent: OrientationConsent) -> Self {
        self.consent = consent;
        self
    }
}

#[async_trait]
impl OrientationSource for SimulatedOrientationSource {
    async fn request_consent(&self) -> OrientationConsent {
        self.consent
    }

    fn watch(&self) -> OrientationStream {
        if self.headings.is_empty() {
            return Box::pin(stream::empty());
        }
        let headings = self.headings.clone();
        let period = self.period;
        Box::pin(stream::unfold(0_usize, move |i| {
            let heading = headings[i % headings.len()];
            async move {
                tokio::time::sleep(period).await;
                Some((OrientationReading::compass(heading), i + 1))
            }
        }))
    }
}
