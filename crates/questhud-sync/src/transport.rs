//! The snapshot transport capability.
//!
//! [`SnapshotChannel`][crate::channel::SnapshotChannel] never talks to a
//! socket directly.  It asks a [`SnapshotTransport`] for a connection and
//! consumes the resulting stream of inbound frames, which keeps the
//! reconnection logic testable without a network.
//!
//! # Frame stream contract
//!
//! * `Ok(text)` – one inbound frame, expected to be a JSON snapshot.
//! * `Err(HudError::MalformedSnapshot(_))` – a frame arrived but could not be
//!   turned into text; the channel drops it and keeps reading.
//! * any other `Err` – the transport failed; the connection is considered
//!   lost.
//! * end of stream – the peer closed the connection.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use questhud_types::HudError;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Stream of inbound frames for one open connection.
pub type FrameStream = BoxStream<'static, Result<String, HudError>>;

/// Every snapshot source must implement this trait.
#[async_trait]
pub trait SnapshotTransport: Send + Sync {
    /// Open a new connection.
    ///
    /// Resolves once the connection is open.  Dropping the returned stream
    /// releases the connection.
    async fn connect(&self) -> Result<FrameStream, HudError>;
}

/// [`SnapshotTransport`] over a WebSocket, e.g. `ws://localhost:8787/ws`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Create a transport that dials `url` on every [`connect`][SnapshotTransport::connect].
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Return the WebSocket URL this transport dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotTransport for WsTransport {
    async fn connect(&self) -> Result<FrameStream, HudError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| HudError::Transport(format!("ws connect to {}: {e}", self.url)))?;

        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| HudError::MalformedSnapshot(format!("binary frame: {e}"))),
                ),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "ws close frame received");
                    None
                }
                // Ping / pong are answered by tungstenite itself.
                Ok(_) => None,
                Err(e) => Some(Err(HudError::Transport(e.to_string()))),
            }
        });

        Ok(Box::pin(frames))
    }
}
