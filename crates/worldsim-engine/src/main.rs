//! Engine binary for the worldsim simulation.
//!
//! Wires the tick orchestrator to a demo chronicle world and runs it under
//! operator controls until the configured number of hours has passed or
//! the process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `worldsim-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the orchestrator and its regional clocks
//! 4. Wrap it with the chronicle world and register handlers
//! 5. Install the Ctrl-C stop handler
//! 6. Run the simulation loop
//! 7. Log the result

mod chronicle;
mod error;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use worldsim_core::config::{SEED_ENV_VAR, SimulationConfig};
use worldsim_core::events::EventManager;
use worldsim_core::runner::{self, RunControl};
use worldsim_core::{RegionClock, TimeSystem};
use worldsim_types::{Cadence, RegionId};

use crate::chronicle::Chronicle;
use crate::error::EngineError;

/// Config file looked up in the working directory.
const CONFIG_PATH: &str = "worldsim-config.yaml";

/// Hours between chronicle watches.
const WATCH_INTERVAL_HOURS: u32 = 6;

/// Regional hour at which dawn is announced.
const DAWN_HOUR: u8 = 4;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, from_file) = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("worldsim-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        start_day = config.time.start_day,
        start_hour = config.time.start_hour,
        run_hours = config.time.run_hours,
        failure_policy = ?config.dispatch.failure_policy,
        "Configuration loaded"
    );

    // 3. Build the orchestrator.
    let mut system: TimeSystem = TimeSystem::from_config(&config)?;
    announce_regional_dawns(&mut system);
    info!(
        clock = %system.clock(),
        regions = system.regions().len(),
        "World clock initialized"
    );

    // 4. Attach the chronicle world.
    let chronicle = Chronicle::new(config.world.name.clone(), system.clock());
    let mut manager = EventManager::new(chronicle, system);
    chronicle::register(&mut manager, WATCH_INTERVAL_HOURS)?;
    info!(
        handlers = manager.handler_count(),
        watch_interval_hours = WATCH_INTERVAL_HOURS,
        "Chronicle handlers registered"
    );

    // 5. Operator controls.
    let control = Arc::new(RunControl::new(
        config.time.tick_interval_ms,
        config.time.run_hours,
    ));
    let signal_control = Arc::clone(&control);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current hour");
            signal_control.request_stop();
        }
    });

    // 6. Run the simulation.
    let result = runner::run_simulation(&mut manager, &control).await?;

    // 7. Log results.
    runner::log_run_end(&result);

    let clock_json = serde_json::to_string(manager.time_system().clock())?;
    let chronicle = manager.world();
    let days_json = serde_json::to_string(chronicle.closed_days())?;
    debug!(days = %days_json, "Chronicle days");
    info!(
        clock = %clock_json,
        chronicle = chronicle.name(),
        days_closed = chronicle.closed_days().len(),
        watches = chronicle.watches().len(),
        elapsed_seconds = control.elapsed_seconds(),
        "worldsim-engine shutdown complete"
    );

    Ok(())
}

/// Load the simulation configuration, falling back to defaults when the
/// file does not exist.
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), EngineError> {
    if path.exists() {
        Ok((SimulationConfig::from_file(path)?, true))
    } else {
        let mut config = SimulationConfig::default();
        config.apply_seed_override(std::env::var(SEED_ENV_VAR).ok().as_deref())?;
        Ok((config, false))
    }
}

/// Subscribe one hourly callback per region that logs when dawn reaches it.
fn announce_regional_dawns(system: &mut TimeSystem) {
    let regions: Vec<(RegionId, String, i32)> = system
        .regions()
        .iter()
        .map(|r| (r.id(), r.name().to_owned(), r.offset_hours()))
        .collect();

    for (id, name, offset_hours) in regions {
        system.subscribe_with_context(Cadence::Local, id, move |clock, region| {
            if RegionClock::hour_at(clock.local_tick(), offset_hours) == DAWN_HOUR {
                info!(
                    region = %name,
                    region_id = ?region,
                    world_time = %clock,
                    "Dawn breaks"
                );
            }
            Ok(())
        });
    }
}
