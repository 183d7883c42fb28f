//! The composed HUD state a renderer draws from.
//!
//! [`HudView::compose`] merges the latest [`ChannelView`] with the latest
//! [`FusionView`].  The device's own position beats the server's: once a
//! local sample exists, the player marker follows it.

use questhud_perception::FusionView;
use questhud_sync::ChannelView;
use questhud_types::{
    BossEncounter, ChannelStatus, DangerLevel, HudMessage, Player, Poi, SensorStatus,
};
use serde::Serialize;

/// Where the player position in a [`HudView`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Server,
    Local,
}

/// Everything the HUD shows, in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HudView {
    pub player: Player,
    pub position_source: PositionSource,
    pub pois: Vec<Poi>,
    pub objective: String,
    pub message: HudMessage,
    pub danger_level: DangerLevel,
    pub boss: BossEncounter,
    pub environment: String,
    pub live: bool,
    pub channel_status: ChannelStatus,
    pub sensor_status: SensorStatus,
    pub sensor_error: Option<String>,
    pub has_compass: bool,
}

impl HudView {
    /// Merge the channel's view with the fusion view.
    ///
    /// The player position and heading come from the local sample when one
    /// exists; every other field comes from the retained snapshot.
    pub fn compose(channel: &ChannelView, fusion: &FusionView) -> Self {
        let snapshot = &channel.snapshot;
        let (player, position_source) = match fusion.sample {
            Some(sample) => (
                Player {
                    lat: sample.lat,
                    lon: sample.lon,
                    heading: sample.heading,
                },
                PositionSource::Local,
            ),
            None => (snapshot.player, PositionSource::Server),
        };

        Self {
            player,
            position_source,
            pois: snapshot.pois.clone(),
            objective: snapshot.objective.clone(),
            message: snapshot.message.clone(),
            danger_level: snapshot.danger_level,
            boss: snapshot.boss.clone(),
            environment: snapshot.environment.clone(),
            live: channel.is_live(),
            channel_status: channel.status,
            sensor_status: fusion.status,
            sensor_error: fusion.error.clone(),
            has_compass: fusion.has_compass,
        }
    }
}
