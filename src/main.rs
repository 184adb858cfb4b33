//! AasanaIO - Seat telemetry client daemon
//!
//! ## Data Flow
//!
//! - **Sensors**: 8 pressure pads (MCP3008) + ultrasonic ranger, polled every 5 s
//! - **WebSocket**: Two JSON messages per cycle to the collector (occupancy, pressure)
//!
//! The daemon reconnects to the collector forever; only Ctrl-C / SIGTERM
//! stops it.

use aasana_io::config::Config;
use aasana_io::devices::open_sensors;
use aasana_io::error::{Error, Result};
use aasana_io::streaming::WebSocketConnector;
use aasana_io::{ConnectionSupervisor, ReadingProcessor, SensorAcquisition};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "/etc/aasana.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `aasana-io <path>` (positional)
/// - `aasana-io --config <path>` (flag-based)
/// - `aasana-io -c <path>` (short flag)
///
/// Returns `None` when no path was given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Load the explicit config, else `/etc/aasana.toml` if present, else defaults
fn load_config() -> Result<(Config, String)> {
    match parse_config_path() {
        Some(path) => Ok((Config::load(&path)?, path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
            Config::load(DEFAULT_CONFIG_PATH)?,
            DEFAULT_CONFIG_PATH.to_string(),
        )),
        None => Ok((Config::default(), "built-in defaults".to_string())),
    }
}

fn main() -> Result<()> {
    let (config, source) = load_config()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("AasanaIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", source);
    log::info!(
        "Device: {} | collector: {} | cycle {:?}",
        config.device.device_type,
        config.collector.url,
        config.streaming.cycle_interval()
    );

    // Hardware handles live until the supervisor returns
    let handles = open_sensors(&config.device)?;
    let acquisition = SensorAcquisition::new(handles, config.device.max_distance_m)?;
    log::info!(
        "Sensors ready: 8 pressure channels, ranger {}",
        if acquisition.has_ranger() { "present" } else { "absent" }
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let connector = WebSocketConnector::new(
        config.collector.url.clone(),
        config.collector.poll_interval(),
    );
    let supervisor = ConnectionSupervisor::new(
        connector,
        acquisition,
        ReadingProcessor::new(config.thresholds),
        config.streaming.clone(),
        &config.collector,
        running,
    );

    log::info!("AasanaIO running. Press Ctrl-C to stop.");
    let stats = supervisor.run();

    log::info!(
        "AasanaIO stopped ({} packets over {} connections)",
        stats.packets_sent,
        stats.connections
    );
    Ok(())
}
