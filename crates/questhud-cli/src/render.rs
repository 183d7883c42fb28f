//! Terminal rendering of the composed HUD.

use colored::Colorize;
use questhud_runtime::{FadePhase, FadeState, HudView, PositionSource};
use questhud_types::{ChannelStatus, DangerLevel, SensorStatus};

/// Render one HUD frame as a multi-line block.
pub fn render(view: &HudView, fade: &FadeState) -> String {
    let mut out = Vec::new();

    let link = match view.channel_status {
        ChannelStatus::Connected => "● LIVE".green().bold(),
        ChannelStatus::Connecting => "◌ connecting".yellow(),
        ChannelStatus::Disconnected => "○ offline".red(),
    };
    let sensors = match view.sensor_status {
        SensorStatus::Active if view.has_compass => "sensors active (compass)".green(),
        SensorStatus::Active => "sensors active".green(),
        SensorStatus::Acquiring => "sensors acquiring".yellow(),
        SensorStatus::Denied => "sensors denied".red(),
        SensorStatus::Error => "sensors error".red(),
        SensorStatus::Inactive => "sensors off".dimmed(),
    };
    out.push(format!("  {link}  {sensors}"));
    out.push(format!("  Objective: {}", view.objective.bold()));

    let source = match view.position_source {
        PositionSource::Local => "[local]".cyan(),
        PositionSource::Server => "[server]".dimmed(),
    };
    out.push(format!(
        "  Player {:.5}, {:.5}  heading {:.0}°  {source}",
        view.player.lat, view.player.lon, view.player.heading
    ));

    let danger = match view.danger_level {
        DangerLevel::None => "none".dimmed(),
        DangerLevel::Low => "low".yellow(),
        DangerLevel::High => "HIGH".red().bold(),
    };
    let mut threat = format!("  Danger: {danger}");
    if view.boss.active {
        let name = view.boss.name.as_deref().unwrap_or("unknown");
        threat.push_str(&format!("   Boss: {}", name.magenta().bold()));
    }
    if !view.environment.is_empty() {
        threat.push_str(&format!("   Env: {}", view.environment));
    }
    out.push(threat);

    if !view.pois.is_empty() {
        let pois: Vec<String> = view
            .pois
            .iter()
            .map(|p| format!("{} ({:.5}, {:.5})", p.label, p.lat, p.lon))
            .collect();
        out.push(format!("  POIs: {}", pois.join(", ")));
    }

    match fade.phase {
        FadePhase::Visible => out.push(format!("  Message: {}", fade.text.bold())),
        FadePhase::FadingOut => out.push(format!("  Message: {}", fade.text.dimmed())),
        FadePhase::Hidden => {}
    }

    if let Some(err) = &view.sensor_error {
        out.push(format!("  {} {err}", "Sensor:".red()));
    }

    out.join("\n")
}
