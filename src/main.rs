//! # Sensor Uplink
//!
//! Forward sensor board telemetry from a serial port to a remote document store.
//!
//! The board prints frames such as `GAS01:346HUM01:47TEMP01:23`. Every
//! interval the uplink reads one frame, buffers the parsed readings on disk
//! and, when the network is reachable, uploads them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use sensor_uplink::config::Config;
use sensor_uplink::logging::init_logging;
use sensor_uplink::probe::HttpHeadProbe;
use sensor_uplink::scheduler::{UploadPipeline, UploadScheduler};
use sensor_uplink::serial::SerialDevice;
use sensor_uplink::store::MongoStore;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Sensor Uplink
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging (stdout, optional rolling file)
///    - Open the serial device and build the store client
///
/// 2. **Scheduling**
///    - Start the upload scheduler; the first cycle runs after one interval
///    - Each cycle: read frame, parse, buffer, probe, upload
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the scheduler
///    - An in-flight cycle is allowed to finish
///
/// # Errors
///
/// Startup fails, and the scheduler never starts, if the configuration is
/// invalid, the serial device cannot be opened or the store connection
/// string cannot be parsed. Nothing after startup terminates the process.
///
/// # Example Output
///
/// ```text
/// INFO sensor_uplink: Sensor Uplink v0.1.0 starting...
/// INFO sensor_uplink::serial: Opened sensor board at /dev/ttyUSB0 (9600 baud)
/// INFO sensor_uplink::scheduler: Scheduler started, cycle interval 10s
/// INFO sensor_uplink::scheduler::pipeline: Received line: GAS01:346HUM01:47
/// INFO sensor_uplink::scheduler::pipeline: Uploaded 2 readings
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args().nth(1));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("Sensor Uplink v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path.display());

    let device = SerialDevice::open(&config.device)?;
    let store = MongoStore::connect(&config.store).await?;
    let probe = HttpHeadProbe::from_config(&config.probe)?;

    let pipeline = UploadPipeline::from_config(
        &config,
        Box::new(device),
        Box::new(probe),
        Box::new(store),
    );
    let mut scheduler = UploadScheduler::new(pipeline, config.scheduler.interval());
    scheduler.start();

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    scheduler.shutdown().await;

    Ok(())
}

fn config_path(arg: Option<String>) -> PathBuf {
    PathBuf::from(arg.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()))
}
