//! `questhud` – terminal client for the QuestHUD realtime core.
//!
//! 1. Loads `~/.questhud/config.toml` (defaults when absent, `QUESTHUD_*`
//!    environment overrides on top).
//! 2. Connects the snapshot channel to the configured WebSocket endpoint.
//! 3. With `--simulate`, runs position fusion over simulated sensors and
//!    reports samples to the same server.
//! 4. Prints the composed HUD whenever it changes, until Ctrl-C.

mod config;
mod render;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use questhud_perception::sim::{SimulatedLocationSource, SimulatedOrientationSource};
use questhud_perception::{
    FusionConfig, FusionView, HttpPositionReporter, LogReporter, PositionFusion, PositionReporter,
};
use questhud_runtime::{HudView, MessageFade, init_tracing};
use questhud_sync::{SnapshotChannel, WsTransport};
use questhud_types::{HudError, Snapshot};

use config::Config;

const USAGE: &str = "\
Usage: questhud [OPTIONS]

Options:
  --simulate       Drive position fusion from simulated sensors
  --json           Print each HUD frame as one JSON line
  --write-config   Write the effective config to ~/.questhud/config.toml and exit
  -h, --help       Show this help";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Options {
    simulate: bool,
    json: bool,
    write_config: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    for arg in args {
        match arg.as_str() {
            "--simulate" => options.simulate = true,
            "--json" => options.json = true,
            "--write-config" => options.write_config = true,
            "-h" | "--help" => options.help = true,
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(options)
}

fn main() -> ExitCode {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}: {e}\n\n{USAGE}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };
    if options.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG (default "info"), QUESTHUD_LOG_FORMAT=json, and optional OTLP
    // export via OTEL_EXPORTER_OTLP_ENDPOINT.  HUD frames go to stdout.
    let _telemetry = init_tracing("questhud");

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "config unreadable; using defaults");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    if options.write_config {
        return match config::save(&cfg) {
            Ok(path) => {
                println!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "Error saving config".red());
                ExitCode::FAILURE
            }
        };
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, options)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "questhud exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config, options: Options) -> Result<(), HudError> {
    if !options.json {
        print_banner(&cfg, &options);
    }
    info!(ws_url = %cfg.ws_url, simulate = options.simulate, "starting");

    let channel = SnapshotChannel::new(Arc::new(WsTransport::new(cfg.ws_url.clone())))
        .with_reconnect_delay(cfg.reconnect_delay());
    channel.start()?;

    let fusion = options.simulate.then(|| build_fusion(&cfg));
    if let Some(fusion) = &fusion {
        fusion.request_permissions()?;
    }
    // Without sensors the fusion view stays at its default; the sender is
    // held so the receiver never reports a closed channel.
    let (_idle_fusion, idle_rx) = watch::channel(FusionView::default());
    let mut fusion_rx = fusion.as_ref().map_or(idle_rx, PositionFusion::subscribe);
    let mut channel_rx = channel.subscribe();

    let fade = MessageFade::new();
    let mut fade_rx = fade.subscribe();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_frame = String::new();
    loop {
        let channel_view = channel_rx.borrow_and_update().clone();
        fade.apply(&channel_view.snapshot.message)?;
        let fusion_view = fusion_rx.borrow_and_update().clone();
        let fade_state = fade_rx.borrow_and_update().clone();
        let view = HudView::compose(&channel_view, &fusion_view);

        let frame = if options.json {
            serde_json::to_string(&view).unwrap_or_else(|e| {
                warn!(error = %e, "failed to serialize HUD frame");
                String::new()
            })
        } else {
            render::render(&view, &fade_state)
        };
        if !frame.is_empty() && frame != last_frame {
            println!("{frame}");
            if !options.json {
                println!();
            }
            last_frame = frame;
        }

        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!(error = %e, "Ctrl-C listener failed; shutting down");
                }
                break;
            }
            res = channel_rx.changed() => if res.is_err() { break },
            res = fusion_rx.changed() => if res.is_err() { break },
            res = fade_rx.changed() => if res.is_err() { break },
        }
    }

    if !options.json {
        println!("{}", "  Ctrl-C received – shutting down …".yellow().bold());
    }
    fade.stop();
    if let Some(fusion) = &fusion {
        fusion.stop();
    }
    channel.stop();
    info!(attempts = channel.connect_attempts(), "stopped");
    Ok(())
}

/// Simulated laps around the default map centre with a sweeping compass.
fn build_fusion(cfg: &Config) -> PositionFusion {
    let centre = Snapshot::default().player;
    let reporter: Arc<dyn PositionReporter> = if cfg.report_positions {
        Arc::new(HttpPositionReporter::from_ws_url(&cfg.ws_url))
    } else {
        Arc::new(LogReporter)
    };
    let sweep = (0..36).map(|i| f64::from(i) * 10.0).collect();
    PositionFusion::with_config(
        Arc::new(SimulatedLocationSource::new(centre.lat, centre.lon)),
        Arc::new(SimulatedOrientationSource::new(sweep)),
        reporter,
        FusionConfig {
            location_interval: cfg.location_interval(),
            smoothing: cfg.heading_smoothing,
            ..FusionConfig::default()
        },
    )
}

fn print_banner(cfg: &Config, options: &Options) {
    println!();
    println!(
        "  {} {}",
        "QuestHUD".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Snapshots from {}", cfg.ws_url.bold());
    if options.simulate {
        let reporting = if cfg.report_positions {
            HttpPositionReporter::from_ws_url(&cfg.ws_url).endpoint().to_string()
        } else {
            "disabled".to_string()
        };
        println!("  Simulated sensors on; reporting to {}", reporting.dimmed());
    }
    println!("  Press {} to quit.\n", "Ctrl-C".bold());
}
