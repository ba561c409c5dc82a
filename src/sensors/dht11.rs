//! DHT11 temperature and humidity sensor on a single-wire GPIO line.
//!
//! One transmission is 40 bits, most significant first: humidity integer,
//! humidity decimal, temperature integer, temperature decimal, checksum. The
//! checksum is the low byte of the sum of the first four bytes. Each bit is a
//! high pulse; longer than 50 µs means 1.

use chrono::{DateTime, Local};
use std::time::Duration;

use crate::error::{DeviceError, SensorFault};
use crate::hal::PulseLine;
use crate::model::{Reading, SensorKind};

const NAME: &str = "dht11";
const FRAME_BITS: usize = 40;
const ONE_THRESHOLD: Duration = Duration::from_micros(50);

const ZERO_PULSE: Duration = Duration::from_micros(27);
const ONE_PULSE: Duration = Duration::from_micros(70);
const RESPONSE_PULSE: Duration = Duration::from_micros(80);

pub struct Dht11 {
    line: Box<dyn PulseLine>,
}

impl Dht11 {
    pub fn new(line: Box<dyn PulseLine>) -> Self {
        Self { line }
    }
}

impl super::Reader for Dht11 {
    fn name(&self) -> &str {
        NAME
    }

    fn read(&mut self, at: DateTime<Local>) -> Result<Vec<Reading>, SensorFault> {
        let pulses = self
            .line
            .capture()
            .map_err(|e| SensorFault::Device(DeviceError::io(NAME, e)))?;
        let frame = decode_frame(&pulses)?;

        let humidity = f64::from(frame[0]) + f64::from(frame[1]) / 10.0;
        let temperature = f64::from(frame[2]) + f64::from(frame[3] & 0x7F) / 10.0;
        // Bit 7 of the decimal byte flags sub-zero readings on newer revisions
        let temperature = if frame[3] & 0x80 != 0 {
            -temperature
        } else {
            temperature
        };

        // Keep whichever kind passes its range check
        let mut readings = Vec::with_capacity(2);
        let mut rejected = None;
        for (kind, value) in [
            (SensorKind::Temperature, temperature),
            (SensorKind::Humidity, humidity),
        ] {
            match Reading::new(kind, value, at) {
                Ok(reading) => readings.push(reading),
                Err(fault) => {
                    rejected.get_or_insert(fault);
                }
            }
        }

        match rejected {
            None => Ok(readings),
            Some(fault) if readings.is_empty() => Err(fault),
            Some(fault) => Err(SensorFault::Incomplete {
                readings,
                fault: Box::new(fault),
            }),
        }
    }
}

/// Decode the last 40 high pulses of a capture into the five frame bytes.
///
/// Leading pulses (the sensor's response signal) are ignored.
pub fn decode_frame(pulses: &[Duration]) -> Result<[u8; 5], SensorFault> {
    if pulses.len() < FRAME_BITS {
        return Err(SensorFault::Malformed {
            sensor: NAME,
            reason: format!("short frame: {} of {FRAME_BITS} bits", pulses.len()),
        });
    }

    let bits = &pulses[pulses.len() - FRAME_BITS..];
    let mut frame = [0u8; 5];
    for (i, pulse) in bits.iter().enumerate() {
        if *pulse > ONE_THRESHOLD {
            frame[i / 8] |= 0x80 >> (i % 8);
        }
    }

    let sum = frame[..4]
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    if sum != frame[4] {
        return Err(SensorFault::Malformed {
            sensor: NAME,
            reason: format!("checksum mismatch: {sum:#04x} != {:#04x}", frame[4]),
        });
    }

    Ok(frame)
}

/// Produce the pulse train a healthy sensor would emit for `data`.
pub fn encode_frame(data: [u8; 4]) -> Vec<Duration> {
    let checksum = data.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    let mut pulses = Vec::with_capacity(FRAME_BITS + 1);
    pulses.push(RESPONSE_PULSE);
    for byte in data.iter().chain(std::iter::once(&checksum)) {
        for bit in (0..8).rev() {
            pulses.push(if byte & (1 << bit) != 0 {
                ONE_PULSE
            } else {
                ZERO_PULSE
            });
        }
    }
    pulses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Reader;

    struct Replay(Vec<Duration>);

    impl PulseLine for Replay {
        fn capture(&mut self) -> anyhow::Result<Vec<Duration>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_decode_healthy_frame() {
        let frame = decode_frame(&encode_frame([45, 2, 23, 5])).unwrap();
        assert_eq!(frame, [45, 2, 23, 5, 75]);
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let mut pulses = encode_frame([45, 0, 23, 0]);
        pulses.truncate(30);
        assert!(matches!(
            decode_frame(&pulses),
            Err(SensorFault::Malformed { .. })
        ));
    }

    #[test]
    fn test_corrupted_bit_fails_checksum() {
        let mut pulses = encode_frame([45, 0, 23, 0]);
        // 45 = 0b0010_1101; set the clear bit worth 2
        pulses[7] = ONE_PULSE;
        assert!(matches!(
            decode_frame(&pulses),
            Err(SensorFault::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_yields_temperature_and_humidity() {
        let mut sensor = Dht11::new(Box::new(Replay(encode_frame([45, 2, 23, 5]))));
        let readings = sensor.read(Local::now()).unwrap();

        assert_eq!(readings[0].kind(), SensorKind::Temperature);
        assert!((readings[0].value() - 23.5).abs() < 1e-9);
        assert_eq!(readings[1].kind(), SensorKind::Humidity);
        assert!((readings[1].value() - 45.2).abs() < 1e-9);
    }

    #[test]
    fn test_implausible_temperature_keeps_humidity() {
        let mut sensor = Dht11::new(Box::new(Replay(encode_frame([45, 0, 80, 0]))));
        let (kept, fault) = sensor.read(Local::now()).unwrap_err().into_parts();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind(), SensorKind::Humidity);
        assert!((kept[0].value() - 45.0).abs() < 1e-9);
        assert!(matches!(
            fault,
            SensorFault::OutOfRange {
                kind: SensorKind::Temperature,
                ..
            }
        ));
    }

    #[test]
    fn test_both_values_implausible_is_plain_fault() {
        let mut sensor = Dht11::new(Box::new(Replay(encode_frame([120, 0, 80, 0]))));
        assert!(matches!(
            sensor.read(Local::now()),
            Err(SensorFault::OutOfRange {
                kind: SensorKind::Temperature,
                ..
            })
        ));
    }

    #[test]
    fn test_sign_bit_gives_sub_zero_temperature() {
        let mut sensor = Dht11::new(Box::new(Replay(encode_frame([45, 0, 2, 0x85]))));
        let readings = sensor.read(Local::now()).unwrap();

        assert_eq!(readings[0].kind(), SensorKind::Temperature);
        assert!((readings[0].value() + 2.5).abs() < 1e-9);
        assert_eq!(readings.len(), 2);
    }
}
