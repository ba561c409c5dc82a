//! Turns one cycle's readings into an [`EvaluatedState`].

use chrono::{DateTime, Local};

use crate::error::SensorFault;
use crate::model::{EvaluatedState, LightClass, Reading, SensorKind};

/// Light classification threshold, fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluator {
    threshold_lux: f64,
}

impl Evaluator {
    pub fn new(threshold_lux: f64) -> Self {
        Self { threshold_lux }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_lux
    }

    /// DAY strictly above the threshold, NIGHT at or below it.
    pub fn classify(&self, light_raw: f64) -> LightClass {
        if light_raw > self.threshold_lux {
            LightClass::Day
        } else {
            LightClass::Night
        }
    }

    /// Combine the readings of a cycle.
    ///
    /// Missing temperature or humidity stays `None`. Without a light reading
    /// there is nothing to classify, so the cycle cannot be evaluated. When a
    /// kind appears more than once the last reading wins.
    pub fn evaluate(
        &self,
        readings: &[Reading],
        now: DateTime<Local>,
    ) -> Result<EvaluatedState, SensorFault> {
        let latest = |kind: SensorKind| {
            readings
                .iter()
                .rev()
                .find(|r| r.kind() == kind)
                .map(Reading::value)
        };

        let light_raw = latest(SensorKind::Light).ok_or(SensorFault::Missing(SensorKind::Light))?;

        Ok(EvaluatedState {
            temperature: latest(SensorKind::Temperature),
            humidity: latest(SensorKind::Humidity),
            light_raw,
            light_class: self.classify(light_raw),
            evaluated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::test_constants::*;

    fn reading(kind: SensorKind, value: f64) -> Reading {
        Reading::new(kind, value, Local::now()).unwrap()
    }

    #[test]
    fn test_threshold_boundary_is_night() {
        let evaluator = Evaluator::new(100.0);
        assert_eq!(evaluator.classify(100.0), LightClass::Night);
        assert_eq!(evaluator.classify(100.01), LightClass::Day);
        assert_eq!(evaluator.classify(0.0), LightClass::Night);
    }

    #[test]
    fn test_full_readings_evaluate() {
        let now = Local::now();
        let state = Evaluator::new(100.0)
            .evaluate(
                &[
                    reading(SensorKind::Temperature, TEST_TEMPERATURE),
                    reading(SensorKind::Humidity, TEST_HUMIDITY),
                    reading(SensorKind::Light, TEST_DAY_LUX),
                ],
                now,
            )
            .unwrap();

        assert_eq!(state.temperature, Some(TEST_TEMPERATURE));
        assert_eq!(state.humidity, Some(TEST_HUMIDITY));
        assert_eq!(state.light_raw, TEST_DAY_LUX);
        assert_eq!(state.light_class, LightClass::Day);
        assert_eq!(state.evaluated_at, now);
    }

    #[test]
    fn test_missing_climate_readings_propagate_as_none() {
        let state = Evaluator::new(100.0)
            .evaluate(&[reading(SensorKind::Light, TEST_NIGHT_LUX)], Local::now())
            .unwrap();

        assert_eq!(state.temperature, None);
        assert_eq!(state.humidity, None);
        assert_eq!(state.light_class, LightClass::Night);
    }

    #[test]
    fn test_missing_light_cannot_be_evaluated() {
        let result = Evaluator::new(100.0).evaluate(
            &[reading(SensorKind::Temperature, TEST_TEMPERATURE)],
            Local::now(),
        );
        assert_eq!(result, Err(SensorFault::Missing(SensorKind::Light)));
    }
}
