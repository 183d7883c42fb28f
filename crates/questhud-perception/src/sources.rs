//! Sensor capabilities consumed by [`PositionFusion`].
//!
//! Platform sensor APIs (satellite positioning, magnetometer, OS permission
//! prompts) sit behind two traits so the fusion logic can run against fakes
//! on a virtual clock:
//!
//! - [`LocationSource`] – a watch over position fixes that may fail with a
//!   typed [`LocationError`].
//! - [`OrientationSource`] – a consent step plus a stream of compass readings.
//!
//! [`PositionFusion`]: crate::pipeline::PositionFusion

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// One position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationReading {
    pub lat: f64,
    pub lon: f64,
    /// Horizontal accuracy radius (metres).
    pub accuracy: f64,
    /// Course over ground in degrees, when the platform derives one from
    /// successive fixes.
    pub heading: Option<f64>,
    /// Fix time reported by the sensor (milliseconds since the Unix epoch).
    pub timestamp_ms: u64,
}

/// Why a location fix could not be produced.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("unknown location error")]
    Unknown,
    /// The device has no location capability at all.
    #[error("location sensing not supported")]
    Unsupported,
}

impl LocationError {
    /// The user-facing explanation shown next to the sensor status.
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location permission denied. Please enable location access."
            }
            LocationError::PositionUnavailable => "Location unavailable. Check GPS signal.",
            LocationError::Timeout => "Location request timed out.",
            LocationError::Unknown => "Unknown location error.",
            LocationError::Unsupported => "Geolocation is not supported by this device.",
        }
    }
}

/// Stream of fixes or per-fix failures for one location watch.
pub type LocationStream = BoxStream<'static, Result<LocationReading, LocationError>>;

/// A watchable position sensor.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Begin watching.  Dropping the returned stream ends the watch.
    async fn watch(&self) -> Result<LocationStream, LocationError>;
}

/// One orientation event.
///
/// Platforms report either a generic magnetic `alpha` angle, a separately
/// calibrated `compass_heading`, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationReading {
    pub alpha: Option<f64>,
    pub compass_heading: Option<f64>,
}

impl OrientationReading {
    /// Reading carrying only a calibrated compass heading.
    pub fn compass(heading: f64) -> Self {
        Self {
            alpha: None,
            compass_heading: Some(heading),
        }
    }

    /// The heading to feed the filter: the calibrated compass when present,
    /// otherwise `alpha`.  Non-finite values count as absent.
    pub fn heading(&self) -> Option<f64> {
        self.compass_heading
            .filter(|h| h.is_finite())
            .or(self.alpha.filter(|a| a.is_finite()))
    }
}

/// Outcome of the orientation consent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationConsent {
    Granted,
    Denied,
    /// The platform delivers orientation data without asking.
    NotRequired,
}

impl OrientationConsent {
    pub fn allows_watch(self) -> bool {
        !matches!(self, OrientationConsent::Denied)
    }
}

/// Stream of orientation events.
pub type OrientationStream = BoxStream<'static, OrientationReading>;

/// A watchable orientation sensor.
#[async_trait]
pub trait OrientationSource: Send + Sync {
    /// Ask the user for access where the platform requires it.
    async fn request_consent(&self) -> OrientationConsent;

    /// Begin watching.  Dropping the returned stream ends the watch.
    fn watch(&self) -> OrientationStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compass_heading_wins_over_alpha() {
        let reading = OrientationReading {
            alpha: Some(10.0),
            compass_heading: Some(200.0),
        };
        assert_eq!(reading.heading(), Some(200.0));
    }

    #[test]
    fn alpha_used_without_compass() {
        let reading = OrientationReading {
            alpha: Some(42.0),
            compass_heading: None,
        };
        assert_eq!(reading.heading(), Some(42.0));
    }

    #[test]
    fn empty_or_nan_reading_has_no_heading() {
        assert_eq!(OrientationReading::default().heading(), None);
        let reading = OrientationReading {
            alpha: Some(f64::NAN),
            compass_heading: Some(f64::NAN),
        };
        assert_eq!(reading.heading(), None);
    }

    #[test]
    fn user_messages_are_distinct() {
        assert!(LocationError::PermissionDenied.user_message().contains("denied"));
        assert!(LocationError::Timeout.user_message().contains("timed out"));
        assert_ne!(
            LocationError::PositionUnavailable.user_message(),
            LocationError::Unknown.user_message()
        );
    }

    #[test]
    fn only_denied_consent_blocks_watch() {
        assert!(OrientationConsent::Granted.allows_watch());
        assert!(OrientationConsent::NotRequired.allows_watch());
        assert!(!OrientationConsent::Denied.allows_watch());
    }
}
