//! BH1750 ambient light sensor on I2C.

use chrono::{DateTime, Local};
use std::time::Duration;

use crate::error::{DeviceError, SensorFault};
use crate::hal::I2cDevice;
use crate::model::{Reading, SensorKind};

const NAME: &str = "bh1750";

const POWER_ON: u8 = 0x01;
const ONE_TIME_HIGH_RES: u8 = 0x20;

/// Worst-case conversion time in high resolution mode.
const CONVERSION_TIME: Duration = Duration::from_millis(180);

pub struct Bh1750 {
    bus: Box<dyn I2cDevice>,
    conversion_time: Duration,
}

impl Bh1750 {
    pub fn new(bus: Box<dyn I2cDevice>) -> Self {
        Self {
            bus,
            conversion_time: CONVERSION_TIME,
        }
    }

    /// Skip the conversion wait, for buses that answer instantly.
    pub fn without_conversion_wait(mut self) -> Self {
        self.conversion_time = Duration::ZERO;
        self
    }
}

impl super::Reader for Bh1750 {
    fn name(&self) -> &str {
        NAME
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.bus
            .write(&[POWER_ON])
            .map_err(|e| DeviceError::io(NAME, e))
    }

    fn read(&mut self, at: DateTime<Local>) -> Result<Vec<Reading>, SensorFault> {
        self.bus
            .write(&[ONE_TIME_HIGH_RES])
            .map_err(|e| DeviceError::io(NAME, e))?;
        if !self.conversion_time.is_zero() {
            std::thread::sleep(self.conversion_time);
        }

        let mut data = [0u8; 2];
        self.bus
            .read(&mut data)
            .map_err(|e| DeviceError::io(NAME, e))?;

        Ok(vec![Reading::new(SensorKind::Light, lux_from_raw(data), at)?])
    }
}

/// Convert the big-endian count to lux (high resolution mode, default sensitivity).
pub fn lux_from_raw(data: [u8; 2]) -> f64 {
    f64::from(u16::from_be_bytes(data)) / 1.2
}
