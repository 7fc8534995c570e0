//! # gaitcued
//!
//! Daemon for the gaitcue wearable.
//!
//! This binary:
//! - Loads `/etc/gaitcue/config.toml` (or `$GAITCUE_CONFIG`)
//! - Couples the actuator and keeps it coupled
//! - Monitors charger, temperature and power, driving the status LEDs
//! - Toggles cueing on button presses (`SIGUSR1` on the simulated board)
//!
//! ## Running
//!
//! ```bash
//! # Development, without a board or actuator
//! GAITCUE__HARDWARE__BACKEND=simulated cargo run --package gaitcued --features mock-bluetooth
//!
//! # Production (on the device)
//! ./gaitcued
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use gaitcue_core::{Config, GaitDevice, Hardware};
use gaitcued::app::CueingApp;
use gaitcued::{logging, simulate};
use tracing::{info, warn};

/// Environment variable pointing at an alternative config file.
const CONFIG_ENV: &str = "GAITCUE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map_or_else(Config::default_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)?;

    logging::init(&config.logging)?;
    info!(config = %config_path.display(), "Starting gaitcued");

    let hardware = Hardware::from_config(&config.hardware)?;
    #[cfg(unix)]
    if let Some(board) = hardware.board.clone() {
        info!("simulated board: send SIGUSR1 to press the button");
        tokio::spawn(async move {
            if let Err(e) = simulate::press_on_signal(board).await {
                warn!(error = %e, "cannot listen for simulated button presses");
            }
        });
    }
    let device = Arc::new(GaitDevice::new(&config, gaitcued::transport(), hardware)?);

    let app = CueingApp::new(Arc::clone(&device), config.cueing.pattern()?);
    app.attach();

    if let Err(e) = device.couple() {
        warn!(error = %e, "cannot start coupling the actuator");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let closing = Arc::clone(&device);
    tokio::task::spawn_blocking(move || closing.close()).await?;
    drop(app);

    Ok(())
}
