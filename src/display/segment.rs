//! 4-digit 7-segment display driven by an HT16K33 on I2C.
//!
//! The display alternates between temperature and humidity on successive
//! renders, starting with temperature.

use super::Sink;
use crate::error::DeviceError;
use crate::hal::I2cDevice;
use crate::model::EvaluatedState;

const NAME: &str = "segment";

const OSCILLATOR_ON: u8 = 0x21;
const DISPLAY_ON: u8 = 0x81;
const DIMMING: u8 = 0xE0;

const DECIMAL_POINT: u8 = 0x80;
const BLANK: u8 = 0x00;

/// What the display shows next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shown {
    Temperature,
    Humidity,
}

pub struct NumericDisplay {
    bus: Box<dyn I2cDevice>,
    brightness: u8,
    next: Shown,
    last: Option<[u8; 4]>,
}

impl NumericDisplay {
    /// `brightness` is clamped to the 16 dimming steps of the controller.
    pub fn new(bus: Box<dyn I2cDevice>, brightness: u8) -> Self {
        Self {
            bus,
            brightness: brightness.min(15),
            next: Shown::Temperature,
            last: None,
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.bus.write(bytes).map_err(|e| DeviceError::io(NAME, e))
    }
}

impl Sink for NumericDisplay {
    fn name(&self) -> &str {
        NAME
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.send(&[OSCILLATOR_ON])?;
        self.send(&[DISPLAY_ON])?;
        self.send(&[DIMMING | self.brightness])?;
        self.last = None;
        Ok(())
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError> {
        let text = match self.next {
            Shown::Temperature => format_temperature(state.temperature),
            Shown::Humidity => format_humidity(state.humidity),
        };

        let digits = encode(&text);
        if self.last != Some(digits) {
            // Display RAM: digits at 0, 2, 6, 8; the colon sits at 4
            let frame = [
                0x00, digits[0], 0, digits[1], 0, BLANK, 0, digits[2], 0, digits[3], 0,
            ];
            self.last = None;
            self.send(&frame)?;
            self.last = Some(digits);
            log_debug!("7-segment shows {text}");
        }

        // Only advance once the value is actually on the display
        self.next = match self.next {
            Shown::Temperature => Shown::Humidity,
            Shown::Humidity => Shown::Temperature,
        };
        Ok(())
    }
}

pub fn format_temperature(value: Option<f64>) -> String {
    match value {
        None => "----".to_owned(),
        Some(t) if t < 0.0 && t > -10.0 => format!("{t:.1}"),
        Some(t) if (0.0..10.0).contains(&t) => format!("{t:.1}C"),
        Some(t) if t < 100.0 => format!("{t:.0}C"),
        Some(_) => "99C".to_owned(),
    }
}

pub fn format_humidity(value: Option<f64>) -> String {
    match value {
        None => "----".to_owned(),
        Some(h) if h < 10.0 => format!("{h:.1}%"),
        Some(h) if h < 100.0 => format!("{h:.0}%"),
        Some(_) => "99%".to_owned(),
    }
}

fn glyph(c: char) -> u8 {
    match c {
        '0' => 0x3F,
        '1' => 0x06,
        '2' => 0x5B,
        '3' => 0x4F,
        '4' => 0x66,
        '5' => 0x6D,
        '6' => 0x7D,
        '7' => 0x07,
        '8' => 0x7F,
        '9' => 0x6F,
        '-' => 0x40,
        'C' => 0x39,
        // Upper ring, the closest a single digit gets to a percent sign
        '%' => 0x63,
        _ => BLANK,
    }
}

/// Encode text into four right-aligned digit patterns.
///
/// A `.` lights the decimal point of the preceding digit.
pub fn encode(text: &str) -> [u8; 4] {
    let mut cells: Vec<u8> = Vec::with_capacity(4);
    for c in text.chars() {
        if c == '.' {
            match cells.last_mut() {
                Some(cell) => *cell |= DECIMAL_POINT,
                None => cells.push(DECIMAL_POINT),
            }
        } else {
            cells.push(glyph(c));
        }
    }

    let mut digits = [BLANK; 4];
    let shown = &cells[cells.len().saturating_sub(4)..];
    digits[4 - shown.len()..].copy_from_slice(shown);
    digits
}
