//! Sensor readers.
//!
//! A reader produces validated [`Reading`]s each time the control loop polls
//! it. One physical sensor may yield several kinds (the DHT11 reports both
//! temperature and humidity in one transmission).

pub mod bh1750;
pub mod dht11;

use chrono::{DateTime, Local};

use crate::error::{DeviceError, SensorFault};
use crate::model::Reading;

pub use bh1750::Bh1750;
pub use dht11::Dht11;

/// Capability of every sensor the loop polls.
#[cfg_attr(test, mockall::automock)]
pub trait Reader: Send {
    /// Short name used in logs and fault reports.
    fn name(&self) -> &str;

    /// Check that the sensor answers, once at startup.
    fn handshake(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Take one sample; all returned readings carry `at` as capture time.
    fn read(&mut self, at: DateTime<Local>) -> Result<Vec<Reading>, SensorFault>;
}

/// Poll `reader`, retrying transient faults up to `retries` extra times.
pub fn poll_with_retry(
    reader: &mut dyn Reader,
    at: DateTime<Local>,
    retries: u32,
) -> Result<Vec<Reading>, SensorFault> {
    let mut attempt = 0;
    loop {
        match reader.read(at) {
            Ok(readings) => {
                if attempt > 0 {
                    log_debug!("{} answered after {} retries", reader.name(), attempt);
                }
                return Ok(readings);
            }
            Err(fault) if fault.is_transient() && attempt < retries => {
                attempt += 1;
                log_debug!(
                    "{} attempt {}/{} failed: {}",
                    reader.name(),
                    attempt,
                    retries + 1,
                    fault
                );
            }
            Err(fault) => return Err(fault),
        }
    }
}
