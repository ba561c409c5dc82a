//! Application coordinator that manages the complete lifecycle of a run.
//!
//! [`Greenhouse`] acquires process resources (instance lock, signal handler),
//! resolves the configuration, opens every device on the hardware layer and
//! hands them to the [`ControlLoop`]. Devices that cannot be opened are left
//! out with a warning; the loop runs with whatever is available.
//!
//! ```no_run
//! use greenhouse::Greenhouse;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Normal startup
//! let summary = Greenhouse::new().run()?;
//!
//! // Embedded use with an explicit configuration and no lock file
//! let summary = Greenhouse::new()
//!     .with_config(greenhouse::config::Config::default())
//!     .without_lock()
//!     .without_headers()
//!     .run()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    actuator::{GpioRelay, LightingActuator, Relay},
    bounded::{CycleBudget, Guarded},
    common::constants::MATRIX_SPI_CLOCK_HZ,
    config::{Config, ControlParams, Overrides},
    core::{ControlLoop, ControlLoopParams, LoopSettings, RunSummary},
    display::{NumericDisplay, Sink, SymbolMatrix, TextDisplay},
    error::{DeviceError, LoopFatal},
    evaluator::Evaluator,
    hal::{ChipSelect, Hal},
    io::{lock, signals::setup_signal_handler},
    logger::Log,
    model::RelayState,
    sensors::{Bh1750, Dht11, Reader},
    store::SqliteStore,
    time::{Clock, LocalTime, NetworkTime, SntpClient, SystemClock, TimeSource},
};

/// Builder for configuring and running the controller.
pub struct Greenhouse {
    config: Option<Config>,
    overrides: Overrides,
    lock_path: Option<PathBuf>,
    show_headers: bool,
}

impl Default for Greenhouse {
    fn default() -> Self {
        Self::new()
    }
}

impl Greenhouse {
    /// Create a new runner with defaults matching a normal run.
    pub fn new() -> Self {
        Self {
            config: None,
            overrides: Overrides::default(),
            lock_path: Some(lock::default_lock_path()),
            show_headers: true,
        }
    }

    /// Use this configuration instead of loading `greenhouse.toml`.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Command-line values applied on top of the configuration.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Take the instance lock at a custom location.
    pub fn with_lock_path(mut self, path: PathBuf) -> Self {
        self.lock_path = Some(path);
        self
    }

    /// Skip the single-instance lock.
    pub fn without_lock(mut self) -> Self {
        self.lock_path = None;
        self
    }

    /// Skip header display.
    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Run until the iteration count is exhausted or a stop signal arrives.
    ///
    /// Startup problems (bad configuration, lock held elsewhere, signal
    /// registration) are returned as errors. A fatal loop error is reported
    /// in the returned summary.
    pub fn run(self) -> Result<RunSummary> {
        if self.show_headers {
            log_version!();
        }

        let config = match self.config {
            Some(config) => config,
            None => Config::load().context("Configuration failed")?,
        };
        let params = config
            .with_overrides(self.overrides)
            .resolve()
            .context("Invalid configuration")?;

        Log::set_timestamps(params.log_timestamps);

        let _lock = match &self.lock_path {
            Some(path) => match lock::acquire_lock(path)? {
                Some(lock) => {
                    log_block_start!("Lock acquired, starting greenhouse...");
                    Some(lock)
                }
                None => anyhow::bail!("Cannot start - another greenhouse instance is running"),
            },
            None => None,
        };

        let signal_state = setup_signal_handler()?;

        params.log_config("configuration");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let loop_params = assemble(&params, clock, signal_state.running.clone())?;
        let control_loop = ControlLoop::new(loop_params)?;

        let summary = control_loop.run();
        signal_state.close();

        log_block_start!(
            "Completed {} cycles, {} relay writes",
            summary.cycles_completed,
            summary.relay_writes
        );
        Ok(summary)
    }
}

/// Open every device and build the loop parameters from resolved settings.
pub fn assemble(
    params: &ControlParams,
    clock: Arc<dyn Clock>,
    running: Arc<std::sync::atomic::AtomicBool>,
) -> Result<ControlLoopParams> {
    let hal = Hal::new().context("Failed to open the hardware layer")?;
    let budget = CycleBudget::new(params.interval.max(params.device_timeout));
    let timeout = params.device_timeout;

    let mut readers: Vec<Box<dyn Reader>> = Vec::new();
    match hal.pulse_line(params.dht11_pin) {
        Ok(line) => readers.push(guard_reader(Dht11::new(line), timeout, &budget)?),
        Err(e) => log_warning!("DHT11 on GPIO {} unavailable: {e}", params.dht11_pin),
    }
    match hal.i2c(params.light_address) {
        Ok(bus) => readers.push(guard_reader(Bh1750::new(bus), timeout, &budget)?),
        Err(e) => log_warning!(
            "BH1750 at 0x{:02X} unavailable: {e}",
            params.light_address
        ),
    }

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    match hal.i2c(params.lcd_address) {
        Ok(bus) => sinks.push(guard_sink(TextDisplay::new(bus), timeout, &budget)?),
        Err(e) => log_warning!("LCD at 0x{:02X} unavailable: {e}", params.lcd_address),
    }
    match hal.i2c(params.segment_address) {
        Ok(bus) => sinks.push(guard_sink(
            NumericDisplay::new(bus, params.segment_brightness),
            timeout,
            &budget,
        )?),
        Err(e) => log_warning!(
            "7-segment display at 0x{:02X} unavailable: {e}",
            params.segment_address
        ),
    }
    match hal.spi(ChipSelect::Ce1, MATRIX_SPI_CLOCK_HZ) {
        Ok(bus) => sinks.push(guard_sink(
            SymbolMatrix::new(bus, params.matrix_intensity),
            timeout,
            &budget,
        )?),
        Err(e) => log_warning!("LED matrix unavailable: {e}"),
    }

    let relay: Box<dyn Relay> = match hal.output(params.relay_pin) {
        Ok(line) => Box::new(Guarded::new(
            "relay",
            GpioRelay::new(line),
            timeout,
            budget.clone(),
        )?),
        Err(e) => {
            log_warning!("Relay on GPIO {} unavailable: {e}", params.relay_pin);
            Box::new(MissingRelay {
                reason: e.to_string(),
            })
        }
    };
    let actuator = LightingActuator::new(relay, params.lighting_policy, params.window.clone());

    let store = SqliteStore::open(&params.database, params.database_timeout)
        .map(|store| store.with_light_threshold(params.light_threshold))
        .with_context(|| format!("Failed to open database {}", params.database.display()))?;

    let time: Box<dyn TimeSource> = match &params.time_server {
        Some(server) => Box::new(NetworkTime::new(
            clock.clone(),
            Box::new(SntpClient::new(server.clone(), params.time_timeout)),
            params.resync_interval,
        )),
        None => Box::new(LocalTime::new(clock.clone())),
    };

    Ok(ControlLoopParams {
        settings: LoopSettings {
            interval: params.interval,
            iterations: params.iterations,
            sensor_retries: params.sensor_retries,
        },
        evaluator: Evaluator::new(params.light_threshold),
        readers,
        sinks,
        actuator,
        store: Box::new(store),
        time,
        clock,
        running,
        budget: Some(budget),
    })
}

fn guard_reader<R: Reader + 'static>(
    reader: R,
    timeout: Duration,
    budget: &CycleBudget,
) -> Result<Box<dyn Reader>, LoopFatal> {
    let name = reader.name().to_owned();
    Ok(Box::new(Guarded::new(&name, reader, timeout, budget.clone())?))
}

fn guard_sink<S: Sink + 'static>(
    sink: S,
    timeout: Duration,
    budget: &CycleBudget,
) -> Result<Box<dyn Sink>, LoopFatal> {
    let name = sink.name().to_owned();
    Ok(Box::new(Guarded::new(&name, sink, timeout, budget.clone())?))
}

/// Stand-in for a relay whose GPIO line could not be opened.
struct MissingRelay {
    reason: String,
}

impl Relay for MissingRelay {
    fn set(&mut self, _state: RelayState) -> Result<(), DeviceError> {
        Err(DeviceError::unavailable("relay", &self.reason))
    }
}
