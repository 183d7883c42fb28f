//! `questhud-types` – shared data model for the QuestHUD realtime core.
//!
//! Everything that crosses a crate boundary lives here: the server-pushed
//! [`Snapshot`] and its parts, the status enums reported by the snapshot
//! channel and the position fusion pipeline, the [`LocationUpdate`] egress
//! body, and the workspace-wide [`HudError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A geographic position with a compass heading.
///
/// `heading` is in degrees, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
}

/// A point of interest shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

/// Transient on-screen message pushed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudMessage {
    pub text: String,
    pub visible: bool,
    /// How long the message stays up before fading; `0` means until replaced.
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

/// Threat level of the current scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    #[default]
    None,
    Low,
    High,
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DangerLevel::None => write!(f, "none"),
            DangerLevel::Low => write!(f, "low"),
            DangerLevel::High => write!(f, "high"),
        }
    }
}

/// Boss encounter fields.  On the wire these are the flat
/// `boss_fight_active` / `boss_name` keys of the snapshot object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossEncounter {
    #[serde(rename = "boss_fight_active", default)]
    pub active: bool,
    #[serde(rename = "boss_name", default)]
    pub name: Option<String>,
}

/// Server-authoritative world state.
///
/// A snapshot is always complete: every inbound frame replaces the previous
/// value wholesale, it is never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub player: Player,
    #[serde(default)]
    pub pois: Vec<Poi>,
    pub objective: String,
    #[serde(default)]
    pub message: HudMessage,
    #[serde(default)]
    pub danger_level: DangerLevel,
    #[serde(flatten)]
    pub boss: BossEncounter,
    #[serde(default)]
    pub environment: String,
}

impl Default for Snapshot {
    /// The placeholder shown before the first frame arrives.
    fn default() -> Self {
        Self {
            player: Player {
                lat: 37.7749,
                lon: -122.4194,
                heading: 0.0,
            },
            pois: Vec::new(),
            objective: "Connecting...".to_string(),
            message: HudMessage::default(),
            danger_level: DangerLevel::None,
            boss: BossEncounter::default(),
            environment: String::new(),
        }
    }
}

impl Snapshot {
    /// Parse and validate one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`HudError::MalformedSnapshot`] when the text is not a JSON
    /// snapshot object or when any coordinate is non-finite or out of range.
    pub fn from_json(text: &str) -> Result<Self, HudError> {
        let snapshot: Snapshot = serde_json::from_str(text)
            .map_err(|e| HudError::MalformedSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the coordinate invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), HudError> {
        check_coordinates("player", self.player.lat, self.player.lon)?;
        if !self.player.heading.is_finite() {
            return Err(HudError::MalformedSnapshot(
                "player heading is not finite".to_string(),
            ));
        }
        for (i, poi) in self.pois.iter().enumerate() {
            check_coordinates(&format!("pois[{i}]"), poi.lat, poi.lon)?;
        }
        Ok(())
    }
}

fn check_coordinates(what: &str, lat: f64, lon: f64) -> Result<(), HudError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(HudError::MalformedSnapshot(format!(
            "{what} latitude {lat} out of range"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(HudError::MalformedSnapshot(format!(
            "{what} longitude {lon} out of range"
        )));
    }
    Ok(())
}

/// Connection lifecycle of the snapshot channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

/// Combined permission / sensing state of the position fusion pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Inactive,
    Acquiring,
    Active,
    Denied,
    Error,
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::Inactive => write!(f, "inactive"),
            SensorStatus::Acquiring => write!(f, "acquiring"),
            SensorStatus::Active => write!(f, "active"),
            SensorStatus::Denied => write!(f, "denied"),
            SensorStatus::Error => write!(f, "error"),
        }
    }
}

/// Body of the position report sent to the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
}

/// Errors raised anywhere in the realtime core.
///
/// None of these are fatal: the channel and the fusion pipeline turn them
/// into status values or log lines and keep serving the last good state.
#[derive(Error, Debug)]
pub enum HudError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Malformed Snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Position Report Failed: {0}")]
    Report(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
