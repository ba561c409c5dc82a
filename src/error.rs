//! Fault taxonomy of the control loop.
//!
//! Everything below [`LoopFatal`] is contained in the cycle that produced it:
//! it is logged, recorded in the cycle report, and the loop moves on. Only
//! [`LoopFatal`] ends a run.

use crate::logger::LogLevel;
use crate::model::{Reading, SensorKind};

/// A sensor could not produce a usable reading this cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorFault {
    /// The sample decoded fine but lies outside what the sensor can measure.
    #[error("{kind} reading {value} outside plausible range {min}..={max}")]
    OutOfRange {
        kind: SensorKind,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The raw sample could not be decoded (short frame, checksum mismatch).
    #[error("{sensor}: malformed sample ({reason})")]
    Malformed {
        sensor: &'static str,
        reason: String,
    },

    /// Part of a multi-kind sample was usable; `fault` describes the rest.
    #[error("{fault} (kept {} other reading(s))", .readings.len())]
    Incomplete {
        readings: Vec<Reading>,
        fault: Box<SensorFault>,
    },

    /// No reading of this kind was produced at all.
    #[error("no {0} reading available")]
    Missing(SensorKind),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl SensorFault {
    /// Whether polling again within the same cycle could succeed.
    ///
    /// A device still busy with an earlier timed-out call will not free up
    /// within a retry, so it is reported straight away.
    pub fn is_transient(&self) -> bool {
        match self {
            SensorFault::Malformed { .. } | SensorFault::OutOfRange { .. } => true,
            SensorFault::Device(DeviceError::Unavailable { .. }) => false,
            SensorFault::Device(_) => true,
            SensorFault::Missing(_) => false,
            SensorFault::Incomplete { fault, .. } => fault.is_transient(),
        }
    }

    /// Separate the readings an incomplete sample still carries from its fault.
    pub fn into_parts(self) -> (Vec<Reading>, SensorFault) {
        match self {
            SensorFault::Incomplete { readings, fault } => (readings, *fault),
            other => (Vec::new(), other),
        }
    }
}

/// Failure talking to a bus device (sensor, display or relay).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// The device failed its handshake or is still busy with an abandoned call.
    #[error("{device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },

    #[error("{device} did not answer within {timeout_ms} ms")]
    Timeout { device: String, timeout_ms: u64 },

    #[error("{device}: {message}")]
    Io { device: String, message: String },
}

impl DeviceError {
    pub fn io(device: &str, err: impl std::fmt::Display) -> Self {
        DeviceError::Io {
            device: device.to_owned(),
            message: err.to_string(),
        }
    }

    pub fn unavailable(device: &str, reason: impl Into<String>) -> Self {
        DeviceError::Unavailable {
            device: device.to_owned(),
            reason: reason.into(),
        }
    }
}

/// The network time authority could not be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeSyncFailure {
    #[error("cannot resolve time server '{server}': {message}")]
    Resolve { server: String, message: String },

    #[error("time server '{server}' did not answer within {timeout_ms} ms")]
    Timeout { server: String, timeout_ms: u64 },

    #[error("time query failed: {0}")]
    Io(String),

    #[error("invalid time server reply: {0}")]
    InvalidReply(String),
}

/// The measurement store rejected or could not complete an operation.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("store operation '{operation}' timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored row {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Unrecoverable condition that ends the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoopFatal {
    #[error("cycle interval must be greater than zero")]
    ZeroInterval,

    #[error("cannot start device worker thread: {0}")]
    WorkerSpawn(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A contained failure recorded against one cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleFault {
    #[error("sensor {sensor}: {fault}")]
    Sensor {
        sensor: String,
        fault: SensorFault,
    },

    #[error("display {sink}: {error}")]
    Display { sink: String, error: DeviceError },

    #[error("relay: {0}")]
    Relay(DeviceError),

    #[error("persistence: {0}")]
    Persistence(PersistenceFailure),
}

impl CycleFault {
    /// Log severity by fault family.
    pub fn severity(&self) -> LogLevel {
        match self {
            CycleFault::Sensor { .. } | CycleFault::Display { .. } | CycleFault::Relay(_) => {
                LogLevel::Warning
            }
            CycleFault::Persistence(_) => LogLevel::Error,
        }
    }

    /// Emit this fault through the console logger at its severity.
    pub fn log(&self) {
        match self.severity() {
            LogLevel::Debug => log_debug!("{self}"),
            LogLevel::Info => log_info!("{self}"),
            LogLevel::Warning => log_warning!("{self}"),
            LogLevel::Error => log_error!("{self}"),
            LogLevel::Critical => log_critical!("{self}"),
        }
    }
}
