//! Values passed between the stages of one measurement cycle.
//!
//! All of these are immutable once built. Only [`MeasurementRecord`] outlives
//! the cycle, as a row in the store.

use chrono::{DateTime, Local};
use std::fmt;
use std::str::FromStr;

use crate::common::constants::{HUMIDITY_RANGE_PCT, LIGHT_RANGE_LUX, TEMPERATURE_RANGE_C};
use crate::error::SensorFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Light,
}

impl SensorKind {
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%RH",
            SensorKind::Light => "lx",
        }
    }

    /// Inclusive range of values the installed sensors can physically report.
    pub fn plausible_range(&self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => TEMPERATURE_RANGE_C,
            SensorKind::Humidity => HUMIDITY_RANGE_PCT,
            SensorKind::Light => LIGHT_RANGE_LUX,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Light => "light",
        };
        f.write_str(name)
    }
}

/// One validated sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    kind: SensorKind,
    value: f64,
    captured_at: DateTime<Local>,
}

impl Reading {
    /// Build a reading, rejecting values outside the kind's plausible range.
    pub fn new(
        kind: SensorKind,
        value: f64,
        captured_at: DateTime<Local>,
    ) -> Result<Self, SensorFault> {
        let (min, max) = kind.plausible_range();
        if !value.is_finite() || value < min || value > max {
            return Err(SensorFault::OutOfRange {
                kind,
                value,
                min,
                max,
            });
        }
        Ok(Self {
            kind,
            value,
            captured_at,
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightClass {
    Day,
    Night,
}

impl LightClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightClass::Day => "DAY",
            LightClass::Night => "NIGHT",
        }
    }
}

impl fmt::Display for LightClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LightClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAY" => Ok(LightClass::Day),
            "NIGHT" => Ok(LightClass::Night),
            other => Err(format!("unknown light class '{other}'")),
        }
    }
}

/// Output of the evaluator for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedState {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_raw: f64,
    pub light_class: LightClass,
    pub evaluated_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayState {
    Off,
    On,
}

impl RelayState {
    pub fn is_on(&self) -> bool {
        matches!(self, RelayState::On)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayState::Off => "OFF",
            RelayState::On => "ON",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    pub relay_state: RelayState,
    pub issued_at: DateTime<Local>,
    pub reason: LightClass,
}

/// A row of the measurements table, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Local>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_raw: f64,
    pub light_class: LightClass,
    /// False when the timestamp came from the local clock after a failed sync.
    pub time_synced: bool,
}

impl MeasurementRecord {
    pub fn from_state(state: &EvaluatedState, time_synced: bool) -> Self {
        Self {
            timestamp: state.evaluated_at,
            temperature: state.temperature,
            humidity: state.humidity,
            light_raw: state.light_raw,
            light_class: state.light_class,
            time_synced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A record read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: MeasurementRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_rejects_out_of_range_values() {
        let now = Local::now();
        assert!(Reading::new(SensorKind::Temperature, 23.5, now).is_ok());
        assert!(Reading::new(SensorKind::Humidity, 100.0, now).is_ok());
        assert!(Reading::new(SensorKind::Light, 0.0, now).is_ok());

        let err = Reading::new(SensorKind::Temperature, 61.0, now).unwrap_err();
        assert!(matches!(
            err,
            SensorFault::OutOfRange {
                kind: SensorKind::Temperature,
                ..
            }
        ));
        assert!(Reading::new(SensorKind::Temperature, -2.0, now).is_ok());
        assert!(Reading::new(SensorKind::Temperature, -20.5, now).is_err());
        assert!(Reading::new(SensorKind::Humidity, -0.5, now).is_err());
        assert!(Reading::new(SensorKind::Light, f64::NAN, now).is_err());
    }

    #[test]
    fn test_reading_reports_unit_of_its_kind() {
        let reading = Reading::new(SensorKind::Light, 256.0, Local::now()).unwrap();
        assert_eq!(reading.unit(), "lx");
        assert_eq!(reading.kind(), SensorKind::Light);
    }

    #[test]
    fn test_light_class_text_form() {
        assert_eq!("DAY".parse::<LightClass>().unwrap(), LightClass::Day);
        assert_eq!(LightClass::Night.to_string(), "NIGHT");
        assert!("dusk".parse::<LightClass>().is_err());
    }
}
