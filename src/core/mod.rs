//! The measurement, evaluation and control loop.
//!
//! [`ControlLoop`] owns every device for the duration of a run and drives them
//! through the lifecycle INITIALIZING → RUNNING → STOPPING → STOPPED. Each
//! RUNNING cycle reads sensors, evaluates, renders, actuates and persists;
//! failures of any stage are contained in the cycle (see [`cycle`]). Only a
//! [`LoopFatal`] ends a run early, in the FAULTED state.
//!
//! The loop depends on capability traits only (`Reader`, `Sink`, `Relay`,
//! `MeasurementStore`, `TimeSource`, `Clock`), so tests can drive it with
//! doubles and a virtual clock.

pub mod cycle;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::actuator::LightingActuator;
use crate::bounded::CycleBudget;
use crate::display::Sink;
use crate::error::LoopFatal;
use crate::evaluator::Evaluator;
use crate::sensors::Reader;
use crate::store::MeasurementStore;
use crate::time::{Clock, Ticker, TimeSource};

pub use cycle::CycleReport;

/// Most recent cycle reports kept in a [`RunSummary`].
pub const REPORT_HISTORY: usize = 1000;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Faulted,
}

/// How long and how often to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub interval: Duration,
    /// `None` runs until stopped.
    pub iterations: Option<u64>,
    /// Extra attempts for a sensor that fails transiently within a cycle.
    pub sensor_retries: u32,
}

/// Everything a [`ControlLoop`] needs, bundled to keep construction readable.
pub struct ControlLoopParams {
    pub settings: LoopSettings,
    pub evaluator: Evaluator,
    pub readers: Vec<Box<dyn Reader>>,
    pub sinks: Vec<Box<dyn Sink>>,
    pub actuator: LightingActuator,
    pub store: Box<dyn MeasurementStore>,
    pub time: Box<dyn TimeSource>,
    pub clock: Arc<dyn Clock>,
    /// Cleared by the signal handler to request a stop.
    pub running: Arc<AtomicBool>,
    /// Shared with bounded devices; reset at the start of each cycle.
    pub budget: Option<CycleBudget>,
}

/// What a run did.
#[derive(Debug)]
pub struct RunSummary {
    pub cycles_completed: u64,
    pub final_state: LoopState,
    /// The most recent cycles, oldest first.
    pub reports: Vec<CycleReport>,
    pub relay_writes: u64,
    pub fatal: Option<LoopFatal>,
}

pub struct ControlLoop {
    settings: LoopSettings,
    evaluator: Evaluator,
    readers: Vec<Box<dyn Reader>>,
    sinks: Vec<Box<dyn Sink>>,
    actuator: LightingActuator,
    store: Box<dyn MeasurementStore>,
    time: Box<dyn TimeSource>,
    running: Arc<AtomicBool>,
    budget: Option<CycleBudget>,
    ticker: Ticker,
    state: LoopState,
}

impl ControlLoop {
    /// Validate parameters and assemble the loop.
    ///
    /// A zero interval is rejected as [`LoopFatal::ZeroInterval`].
    pub fn new(params: ControlLoopParams) -> Result<Self, LoopFatal> {
        let ticker = Ticker::new(params.clock, params.settings.interval)?;

        Ok(Self {
            settings: params.settings,
            evaluator: params.evaluator,
            readers: params.readers,
            sinks: params.sinks,
            actuator: params.actuator,
            store: params.store,
            time: params.time,
            running: params.running,
            budget: params.budget,
            ticker,
            state: LoopState::Initializing,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Initialize, then run cycles until the iteration count is exhausted or
    /// the running flag is cleared. The in-flight cycle always completes.
    pub fn run(mut self) -> RunSummary {
        self.initialize();

        let mut reports: VecDeque<CycleReport> = VecDeque::new();
        let mut completed: u64 = 0;
        let mut fatal = None;

        if self.running.load(Ordering::SeqCst) {
            self.state = LoopState::Running;
        } else {
            self.state = LoopState::Stopping;
        }

        while self.state == LoopState::Running {
            if self
                .settings
                .iterations
                .is_some_and(|limit| completed >= limit)
            {
                self.state = LoopState::Stopping;
                break;
            }

            let index = match completed.checked_add(1) {
                Some(index) => index,
                None => {
                    fatal = Some(LoopFatal::Internal("cycle counter overflow".to_owned()));
                    self.state = LoopState::Faulted;
                    break;
                }
            };

            self.ticker.start_cycle();
            if let Some(budget) = &self.budget {
                budget.start();
            }

            let report = self.run_cycle(index);
            completed = index;
            if reports.len() == REPORT_HISTORY {
                reports.pop_front();
            }
            reports.push_back(report);

            let more = self
                .settings
                .iterations
                .is_none_or(|limit| completed < limit);
            if more && !self.ticker.wait_next(&self.running) {
                self.state = LoopState::Stopping;
            }
        }

        if self.state == LoopState::Stopping {
            log_block_start!("Stopping after {completed} cycles");
            self.state = LoopState::Stopped;
        } else if let Some(fatal) = &fatal {
            log_critical!("Control loop faulted: {fatal}");
        }

        RunSummary {
            cycles_completed: completed,
            final_state: self.state,
            reports: reports.into(),
            relay_writes: self.actuator.writes(),
            fatal,
        }
    }

    /// Create the schema and handshake every device.
    ///
    /// Devices that fail their handshake are dropped for the rest of the run.
    /// An unavailable store is only a warning; appends will keep retrying.
    fn initialize(&mut self) {
        self.state = LoopState::Initializing;
        log_block_start!("Initializing devices");

        if let Some(budget) = &self.budget {
            budget.start();
        }

        match self.store.create_schema() {
            Ok(()) => log_decorated!("Measurement store ready"),
            Err(e) => log_warning!("Measurement store unavailable: {e}"),
        }

        self.readers.retain_mut(|reader| match reader.handshake() {
            Ok(()) => {
                log_decorated!("Sensor {} ready", reader.name());
                true
            }
            Err(e) => {
                log_warning!("Sensor disabled for this run: {e}");
                false
            }
        });

        self.sinks.retain_mut(|sink| match sink.handshake() {
            Ok(()) => {
                log_decorated!("Display {} ready", sink.name());
                true
            }
            Err(e) => {
                log_warning!("Display disabled for this run: {e}");
                false
            }
        });

        if self.readers.is_empty() {
            log_warning!("No sensors available; every cycle will be skipped");
        }
    }
}
