//! One pass through read → evaluate → display → actuate → persist.

use chrono::{DateTime, Local};

use super::ControlLoop;
use crate::error::CycleFault;
use crate::model::{ActuatorCommand, EvaluatedState, MeasurementRecord, RecordId, SensorKind};
use crate::sensors::poll_with_retry;

/// Outcome of a single cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub index: u64,
    pub started_at: DateTime<Local>,
    /// `None` when no light reading was available to evaluate.
    pub state: Option<EvaluatedState>,
    pub command: Option<ActuatorCommand>,
    /// Whether the relay was physically written this cycle.
    pub relay_written: bool,
    pub record_id: Option<RecordId>,
    pub time_synced: bool,
    pub faults: Vec<CycleFault>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

impl ControlLoop {
    pub(super) fn run_cycle(&mut self, index: u64) -> CycleReport {
        let now = self.time.now();
        let time_synced = self.time.is_synchronized();
        let mut report = CycleReport {
            index,
            started_at: now,
            state: None,
            command: None,
            relay_written: false,
            record_id: None,
            time_synced,
            faults: Vec::new(),
        };

        // Read
        let mut readings = Vec::new();
        for reader in self.readers.iter_mut() {
            match poll_with_retry(reader.as_mut(), now, self.settings.sensor_retries) {
                Ok(values) => readings.extend(values),
                Err(fault) => {
                    let (kept, fault) = fault.into_parts();
                    readings.extend(kept);
                    report.faults.push(CycleFault::Sensor {
                        sensor: reader.name().to_owned(),
                        fault,
                    });
                }
            }
        }

        // Evaluate
        let state = match self.evaluator.evaluate(&readings, now) {
            Ok(state) => state,
            Err(fault) => {
                report.faults.push(CycleFault::Sensor {
                    sensor: SensorKind::Light.to_string(),
                    fault,
                });
                log_block_start!("Cycle {index}: no light reading, nothing to evaluate");
                log_faults(&report.faults);
                return report;
            }
        };

        log_block_start!(
            "Cycle {index}: {} °C, {} %RH, {:.1} lx ({})",
            optional(state.temperature),
            optional(state.humidity),
            state.light_raw,
            state.light_class
        );
        if !time_synced {
            log_indented!("Timestamp from the local clock (time sync degraded)");
        }

        // Display
        for sink in self.sinks.iter_mut() {
            if let Err(error) = sink.render(&state) {
                report.faults.push(CycleFault::Display {
                    sink: sink.name().to_owned(),
                    error,
                });
            }
        }

        // Actuate
        let command = self.actuator.decide(&state);
        match self.actuator.apply(&command) {
            Ok(written) => report.relay_written = written,
            Err(error) => report.faults.push(CycleFault::Relay(error)),
        }
        report.command = Some(command);

        // Persist
        let record = MeasurementRecord::from_state(&state, time_synced);
        match self.store.append(&record) {
            Ok(id) => {
                log_debug!("Stored measurement {id}");
                report.record_id = Some(id);
            }
            Err(e) => report.faults.push(CycleFault::Persistence(e)),
        }

        report.state = Some(state);
        log_faults(&report.faults);
        report
    }
}

fn optional(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "--".to_owned(),
    }
}

fn log_faults(faults: &[CycleFault]) {
    for fault in faults {
        fault.log();
    }
}
