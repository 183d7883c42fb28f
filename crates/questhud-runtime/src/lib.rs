//! `questhud-runtime` – consumer-side glue for the QuestHUD realtime core.
//!
//! # Modules
//!
//! - [`view`] – [`HudView`][view::HudView]: the snapshot and the local
//!   position sample merged into one renderable value.
//! - [`message_fade`] – [`MessageFade`][message_fade::MessageFade]: show,
//!   fade and hide timing for the server's on-screen message.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod message_fade;
pub mod telemetry;
pub mod view;

pub use message_fade::{FADE_DURATION, FadePhase, FadeState, MessageFade};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use view::{HudView, PositionSource};
