//! FleetScope operations console
//!
//! Runs a live map view or a trip replay against the configured tracking
//! provider (or the built-in demo fleet) and prints render events as JSON
//! lines, one per event.

mod args;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fleetscope_core::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use args::{Command, Common};

/// Vehicles in the demo fleet
const DEMO_FLEET_SIZE: usize = 12;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let command = match args::parse(std::env::args().skip(1), Utc::now()) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e:#}\n\n{}", args::USAGE);
            std::process::exit(2);
        }
    };

    match command {
        Command::Help => {
            println!("{}", args::USAGE);
            Ok(())
        }
        Command::Live { common, filter } => {
            let mut config = load_config(&common)?;
            if let Some(filter) = filter {
                config.live.default_filter = filter;
            }
            if common.demo {
                live(&config, demo_fleet()).await
            } else {
                live(&config, HttpTelemetrySource::new(&config.provider)?).await
            }
        }
        Command::Replay {
            common,
            vehicle_id,
            range,
            speed,
        } => {
            let config = load_config(&common)?;
            if common.demo {
                replay(&config, demo_fleet(), vehicle_id, range, speed).await
            } else {
                let source = HttpTelemetrySource::new(&config.provider)?;
                replay(&config, source, vehicle_id, range, speed).await
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("fleetscope"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

fn load_config(common: &Common) -> Result<FleetConfig> {
    let path = common.config.clone().unwrap_or_else(default_config_path);
    let config = FleetConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn demo_fleet() -> DemoFleet {
    let seed = Utc::now().timestamp_millis() as u64;
    let fleet = DemoFleet::new(DEMO_FLEET_SIZE, seed);
    tracing::info!(vehicles = ?fleet.vehicle_ids(), "using demo fleet");
    fleet
}

fn emit(event: &RenderEvent) -> Result<()> {
    let line = serde_json::to_string(event)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

async fn live<S: TelemetrySource>(config: &FleetConfig, source: S) -> Result<()> {
    let (events, mut rx) = mpsc::unbounded_channel();
    let view = MapView::new(config, source, events).spawn();
    tracing::info!(view = %view.id(), "live view running, Ctrl-C to stop");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => emit(&event)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.shutdown().await;
    Ok(())
}

async fn replay<S: TelemetrySource>(
    config: &FleetConfig,
    source: S,
    vehicle_id: String,
    range: HistoryRange,
    speed: Option<u32>,
) -> Result<()> {
    let (events, mut rx) = mpsc::unbounded_channel();
    let view = MapView::new(config, source, events)
        .without_live_polling()
        .spawn();

    if let Some(speed) = speed {
        view.set_speed(speed);
    }
    view.load_history(vehicle_id.as_str(), range);

    let outcome = loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            break Ok(());
        };
        emit(&event)?;

        match event {
            RenderEvent::TrackLoaded { .. } => {
                view.play();
            }
            RenderEvent::Playback(frame)
                if frame.state == PlayState::Stopped && frame.index + 1 == frame.len =>
            {
                break Ok(());
            }
            RenderEvent::Advisory(advisory) => break Err(advisory),
            _ => {}
        }
    };

    view.shutdown().await;
    match outcome {
        Ok(()) => Ok(()),
        Err(Advisory::NoHistoryInRange { .. }) => {
            tracing::info!(%vehicle_id, "no history in the requested range");
            Ok(())
        }
        Err(advisory) => bail!("replay of {vehicle_id} failed: {advisory:?}"),
    }
}
