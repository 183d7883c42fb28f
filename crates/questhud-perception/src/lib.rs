//! `questhud-perception` – local position and heading for the HUD.
//!
//! Turns raw device sensors into a single smoothed `{lat, lon, heading}`
//! sample and reports it upstream.
//!
//! # Modules
//!
//! - [`heading`] – [`HeadingFilter`][heading::HeadingFilter]: circular
//!   low-pass filter that always interpolates the short way around the
//!   compass.
//! - [`fusion`] – [`FusionEngine`][fusion::FusionEngine]: throttle gate and
//!   heading precedence rules producing a [`LocalSample`][fusion::LocalSample].
//! - [`sources`] – the [`LocationSource`][sources::LocationSource] and
//!   [`OrientationSource`][sources::OrientationSource] capabilities.
//! - [`reporter`] – [`PositionReporter`][reporter::PositionReporter] and its
//!   HTTP implementation, plus a log-only stand-in.
//! - [`pipeline`] – [`PositionFusion`][pipeline::PositionFusion]: the async
//!   pipeline tying it all together.
//! - [`sim`] – simulated sensors for demos and tests.

pub mod fusion;
pub mod heading;
pub mod pipeline;
pub mod reporter;
pub mod sim;
pub mod sources;

pub use fusion::{FusionEngine, LocalSample};
pub use pipeline::{FusionConfig, FusionView, PositionFusion};
pub use reporter::{HttpPositionReporter, LogReporter, PositionReporter};
pub use sources::{
    LocationError, LocationReading, LocationSource, OrientationConsent, OrientationReading,
    OrientationSource,
};
