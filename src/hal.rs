//! Bus access for the greenhouse peripherals.
//!
//! With the `hardware` feature the handles talk to the Raspberry Pi through
//! `rppal`. Without it every handle is simulated: writes are logged at debug
//! level and reads answer with plausible canned samples, so the controller
//! runs unchanged on a development machine.
//!
//! Drivers in `sensors`, `display` and `actuator` only see the small traits
//! below and never depend on which backend is compiled in.

use anyhow::Result;
use std::time::Duration;

/// A device at a fixed address on the I2C bus.
pub trait I2cDevice: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// A write-only SPI peripheral.
pub trait SpiDevice: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A GPIO line driven as an output.
pub trait OutputLine: Send {
    fn set(&mut self, high: bool) -> Result<()>;
}

/// A single-wire data line that can capture one sensor transmission.
pub trait PulseLine: Send {
    /// Trigger the sensor and return the durations of its high pulses, in order.
    fn capture(&mut self) -> Result<Vec<Duration>>;
}

/// SPI chip-select lines of bus 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    Ce0,
    Ce1,
}

// ============================================================================
// Simulated backend
// ============================================================================

#[cfg(not(feature = "hardware"))]
pub struct Hal;

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new() -> Result<Self> {
        log_decorated!("Hardware: simulated buses (built without the `hardware` feature)");
        Ok(Self)
    }

    pub fn i2c(&self, address: u16) -> Result<Box<dyn I2cDevice>> {
        Ok(Box::new(sim::SimulatedI2c { address }))
    }

    pub fn spi(&self, select: ChipSelect, _clock_hz: u32) -> Result<Box<dyn SpiDevice>> {
        Ok(Box::new(sim::SimulatedSpi { select }))
    }

    pub fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>> {
        Ok(Box::new(sim::SimulatedOutput { pin }))
    }

    pub fn pulse_line(&self, pin: u8) -> Result<Box<dyn PulseLine>> {
        Ok(Box::new(sim::SimulatedDht11 { pin }))
    }
}

#[cfg(not(feature = "hardware"))]
mod sim {
    use super::*;
    use chrono::Timelike;

    pub(super) struct SimulatedI2c {
        pub(super) address: u16,
    }

    impl I2cDevice for SimulatedI2c {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            log_debug!("[sim i2c 0x{:02X}] write {:02X?}", self.address, bytes);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            // Only the light sensor reads from the bus: bright by day, dim at night
            let hour = chrono::Local::now().hour();
            let raw: u16 = if (6..20).contains(&hour) { 300 } else { 48 };
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = raw.to_be_bytes().get(i).copied().unwrap_or(0);
            }
            log_debug!("[sim i2c 0x{:02X}] read {:02X?}", self.address, buf);
            Ok(())
        }
    }

    pub(super) struct SimulatedSpi {
        pub(super) select: ChipSelect,
    }

    impl SpiDevice for SimulatedSpi {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            log_debug!("[sim spi {:?}] write {:02X?}", self.select, bytes);
            Ok(())
        }
    }

    pub(super) struct SimulatedOutput {
        pub(super) pin: u8,
    }

    impl OutputLine for SimulatedOutput {
        fn set(&mut self, high: bool) -> Result<()> {
            log_debug!(
                "[sim gpio {}] {}",
                self.pin,
                if high { "HIGH" } else { "LOW" }
            );
            Ok(())
        }
    }

    pub(super) struct SimulatedDht11 {
        pub(super) pin: u8,
    }

    impl PulseLine for SimulatedDht11 {
        fn capture(&mut self) -> Result<Vec<Duration>> {
            log_debug!("[sim gpio {}] DHT11 transmission", self.pin);
            // 50.0 %RH, 25.0 °C
            Ok(crate::sensors::dht11::encode_frame([50, 0, 25, 0]))
        }
    }
}

// ============================================================================
// Raspberry Pi backend
// ============================================================================

#[cfg(feature = "hardware")]
pub struct Hal {
    gpio: rppal::gpio::Gpio,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new() -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new()?;
        log_decorated!("Hardware: Raspberry Pi buses via rppal");
        Ok(Self { gpio })
    }

    pub fn i2c(&self, address: u16) -> Result<Box<dyn I2cDevice>> {
        let mut bus = rppal::i2c::I2c::new()?;
        bus.set_slave_address(address)?;
        Ok(Box::new(pi::PiI2c { bus }))
    }

    pub fn spi(&self, select: ChipSelect, clock_hz: u32) -> Result<Box<dyn SpiDevice>> {
        use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
        let slave = match select {
            ChipSelect::Ce0 => SlaveSelect::Ss0,
            ChipSelect::Ce1 => SlaveSelect::Ss1,
        };
        let spi = Spi::new(Bus::Spi0, slave, clock_hz, Mode::Mode0)?;
        Ok(Box::new(pi::PiSpi { spi }))
    }

    pub fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>> {
        let mut line = self.gpio.get(pin)?.into_output_low();
        // The relay must keep its position when the handle is dropped
        line.set_reset_on_drop(false);
        Ok(Box::new(pi::PiOutput { line }))
    }

    pub fn pulse_line(&self, pin: u8) -> Result<Box<dyn PulseLine>> {
        let line = self.gpio.get(pin)?.into_io(rppal::gpio::Mode::Input);
        Ok(Box::new(pi::PiPulseLine { line }))
    }
}

#[cfg(feature = "hardware")]
mod pi {
    use super::*;
    use rppal::gpio::{IoPin, Mode};
    use std::time::Instant;

    /// Host start signal: hold the line low for at least 18 ms.
    const START_LOW: Duration = Duration::from_millis(20);
    /// The sensor never keeps a level longer than ~100 µs mid-frame.
    const EDGE_TIMEOUT: Duration = Duration::from_micros(200);
    const MAX_PULSES: usize = 48;

    pub(super) struct PiI2c {
        pub(super) bus: rppal::i2c::I2c,
    }

    impl I2cDevice for PiI2c {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.bus.write(bytes)?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            let read = self.bus.read(buf)?;
            if read != buf.len() {
                anyhow::bail!("short I2C read: {read} of {} bytes", buf.len());
            }
            Ok(())
        }
    }

    pub(super) struct PiSpi {
        pub(super) spi: rppal::spi::Spi,
    }

    impl SpiDevice for PiSpi {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.spi.write(bytes)?;
            Ok(())
        }
    }

    pub(super) struct PiOutput {
        pub(super) line: rppal::gpio::OutputPin,
    }

    impl OutputLine for PiOutput {
        fn set(&mut self, high: bool) -> Result<()> {
            if high {
                self.line.set_high();
            } else {
                self.line.set_low();
            }
            Ok(())
        }
    }

    pub(super) struct PiPulseLine {
        pub(super) line: IoPin,
    }

    impl PiPulseLine {
        /// Busy-wait while the line stays at `high`; returns how long that took.
        fn level_duration(&self, high: bool) -> Option<Duration> {
            let started = Instant::now();
            while self.line.is_high() == high {
                if started.elapsed() > EDGE_TIMEOUT {
                    return None;
                }
            }
            Some(started.elapsed())
        }
    }

    impl PulseLine for PiPulseLine {
        fn capture(&mut self) -> Result<Vec<Duration>> {
            self.line.set_mode(Mode::Output);
            self.line.set_low();
            std::thread::sleep(START_LOW);
            self.line.set_high();
            self.line.set_mode(Mode::Input);

            let mut pulses = Vec::with_capacity(MAX_PULSES);
            // Wait for the sensor to pull low, then record every high pulse
            if self.level_duration(true).is_none() {
                anyhow::bail!("no response from DHT11");
            }
            while pulses.len() < MAX_PULSES {
                if self.level_duration(false).is_none() {
                    break;
                }
                match self.level_duration(true) {
                    Some(high) => pulses.push(high),
                    None => break,
                }
            }
            Ok(pulses)
        }
    }
}
