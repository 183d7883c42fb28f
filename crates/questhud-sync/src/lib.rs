//! `questhud-sync` – the snapshot side of the HUD.
//!
//! Keeps the server-authoritative world state flowing into the display.
//!
//! # Modules
//!
//! - [`transport`] – the [`SnapshotTransport`] capability and its WebSocket
//!   implementation, [`WsTransport`].
//! - [`channel`] – [`SnapshotChannel`]: reconnecting consumer that always
//!   serves a complete snapshot and a liveness flag.

pub mod channel;
pub mod transport;

pub use channel::{ChannelView, DEFAULT_RECONNECT_DELAY, SnapshotChannel};
pub use transport::{FrameStream, SnapshotTransport, WsTransport};
