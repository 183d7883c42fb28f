//! Upstream position reporting.
//!
//! Every accepted [`LocalSample`][crate::fusion::LocalSample] is forwarded to
//! an ingestion endpoint as a [`LocationUpdate`].  Reporting is
//! fire-and-forget: [`PositionFusion`][crate::pipeline::PositionFusion] logs
//! failures and otherwise ignores them.

use std::time::Duration;

use async_trait::async_trait;
use questhud_types::{HudError, LocationUpdate};
use tracing::{debug, warn};

/// Upper bound on a single report round-trip.
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink for accepted position samples.
#[async_trait]
pub trait PositionReporter: Send + Sync {
    async fn report(&self, update: &LocationUpdate) -> Result<(), HudError>;
}

/// `POST`s each update as JSON to `<base>/api/location`.
#[derive(Debug, Clone)]
pub struct HttpPositionReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPositionReporter {
    /// Report to an explicit endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = client_or_fallback(reqwest::Client::builder().timeout(REPORT_TIMEOUT).build());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Report to the server that also serves snapshots at `ws_url`.
    pub fn from_ws_url(ws_url: &str) -> Self {
        Self::new(format!("{}/api/location", http_base_from_ws(ws_url)))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PositionReporter for HttpPositionReporter {
    async fn report(&self, update: &LocationUpdate) -> Result<(), HudError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(update)
            .send()
            .await
            .map_err(|e| HudError::Report(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HudError::Report(format!("{} returned {status}", self.endpoint)));
        }
        debug!(lat = update.lat, lon = update.lon, heading = update.heading, "position reported");
        Ok(())
    }
}

/// Fall back to a default client (no request timeout) when the tuned one
/// cannot be built.
fn client_or_fallback(built: reqwest::Result<reqwest::Client>) -> reqwest::Client {
    built.unwrap_or_else(|e| {
        warn!(error = %e, "HTTP client build failed; reporting without a timeout");
        reqwest::Client::new()
    })
}

/// Logs each update at debug level and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl PositionReporter for LogReporter {
    async fn report(&self, update: &LocationUpdate) -> Result<(), HudError> {
        debug!(
            lat = update.lat,
            lon = update.lon,
            heading = update.heading,
            "position not reported (reporting disabled)"
        );
        Ok(())
    }
}

/// Map a snapshot WebSocket URL to the HTTP base of the same server.
///
/// `ws://host:8787/ws` becomes `http://host:8787`; `wss://` maps to
/// `https://`.
pub fn http_base_from_ws(ws_url: &str) -> String {
    let mapped = if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_string()
    };
    let trimmed = mapped.trim_end_matches('/');
    trimmed.strip_suffix("/ws").unwrap_or(trimmed).to_string()
}
