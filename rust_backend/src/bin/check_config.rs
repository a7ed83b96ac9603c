//! Scheduler configuration checker
//!
//! Loads a TOML configuration, validates it and resolves every active
//! satellite's sensor geometry.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin check-config -- scheduler.toml
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: info)

use std::env;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use satsched_rust::models::Satellite;
use satsched_rust::SchedulerConfig;

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: check-config <config.toml>");
    };

    let config = SchedulerConfig::from_file(&path)
        .with_context(|| format!("Invalid configuration {}", path))?;

    log::info!(
        "Run {} - {} (step {} s, multithread {})",
        config.run.start,
        config.run.stop,
        config.run.step_secs,
        config.run.multithread
    );

    let filtered_satellites = config.satellites.values().filter(|s| s.filter).count();
    let mut sensors = 0;
    let mut filtered_sensors = 0;
    for (id, settings) in config.active_satellites() {
        let satellite = Satellite::from_settings(id, settings)
            .with_context(|| format!("Failed to resolve satellite {}", id))?;
        for sensor in &satellite.sensors {
            sensors += 1;
            if sensor.is_filtered() {
                filtered_sensors += 1;
            }
            log::debug!(
                "{}/{}: duty cycle {}, {} view(s)",
                satellite.id,
                sensor.id,
                sensor.duty_cycle,
                sensor.views.len()
            );
        }
    }

    log::info!(
        "Loaded {} satellites ({} filtered), {} sensors ({} filtered)",
        config.satellites.len(),
        filtered_satellites,
        sensors,
        filtered_sensors
    );
    log::info!(
        "Solver {:?}, time limit {} s",
        config.optimizer.solver,
        config.optimizer.time_limit_secs
    );

    Ok(())
}
