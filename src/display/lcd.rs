//! 16x2 HD44780 character LCD behind an MCP23008 I2C port expander.
//!
//! The controller runs in 4-bit mode. Expander pins: GP1 = RS, GP2 = E,
//! GP3..GP6 = D4..D7, GP7 = backlight.

use std::time::Duration;

use super::{Sink, one_decimal};
use crate::error::DeviceError;
use crate::hal::I2cDevice;
use crate::model::EvaluatedState;

const NAME: &str = "lcd";
pub const COLUMNS: usize = 16;

// MCP23008 registers
const IODIR: u8 = 0x00;
const GPIO: u8 = 0x09;

const RS: u8 = 1 << 1;
const ENABLE: u8 = 1 << 2;
const BACKLIGHT: u8 = 1 << 7;

// HD44780 commands
const CLEAR: u8 = 0x01;
const ENTRY_MODE_LEFT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FUNCTION_4BIT_2LINE: u8 = 0x28;
const SET_DDRAM: u8 = 0x80;
const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

pub struct TextDisplay {
    bus: Box<dyn I2cDevice>,
    shown: [Option<String>; 2],
    settle: Duration,
}

impl TextDisplay {
    pub fn new(bus: Box<dyn I2cDevice>) -> Self {
        Self {
            bus,
            shown: [None, None],
            settle: Duration::from_millis(2),
        }
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool) -> Result<(), DeviceError> {
        let mut pins = BACKLIGHT | ((nibble & 0x0F) << 3);
        if rs {
            pins |= RS;
        }
        for value in [pins | ENABLE, pins] {
            self.bus
                .write(&[GPIO, value])
                .map_err(|e| DeviceError::io(NAME, e))?;
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8, rs: bool) -> Result<(), DeviceError> {
        self.write_nibble(byte >> 4, rs)?;
        self.write_nibble(byte & 0x0F, rs)
    }

    fn command(&mut self, command: u8) -> Result<(), DeviceError> {
        self.write_byte(command, false)
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<(), DeviceError> {
        self.command(SET_DDRAM | ROW_OFFSETS[row])?;
        for byte in pad_line(text).bytes() {
            self.write_byte(byte, true)?;
        }
        Ok(())
    }
}

impl Sink for TextDisplay {
    fn name(&self) -> &str {
        NAME
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.bus
            .write(&[IODIR, 0x00])
            .map_err(|e| DeviceError::io(NAME, e))?;

        // Reset into 4-bit mode from any state
        for nibble in [0x03, 0x03, 0x03, 0x02] {
            self.write_nibble(nibble, false)?;
            std::thread::sleep(self.settle);
        }
        for command in [FUNCTION_4BIT_2LINE, DISPLAY_ON, ENTRY_MODE_LEFT, CLEAR] {
            self.command(command)?;
        }
        std::thread::sleep(self.settle);
        self.shown = [None, None];
        Ok(())
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError> {
        let lines = text_lines(state);
        for (row, line) in lines.into_iter().enumerate() {
            if self.shown[row].as_deref() == Some(line.as_str()) {
                continue;
            }
            // Forget the row first so a failed write is retried next cycle
            self.shown[row] = None;
            self.write_row(row, &line)?;
            self.shown[row] = Some(line);
        }
        Ok(())
    }
}

/// The two LCD lines for a state.
pub fn text_lines(state: &EvaluatedState) -> [String; 2] {
    [
        format!("Temp: {}C", one_decimal(state.temperature)),
        format!("Humidity: {}%", one_decimal(state.humidity)),
    ]
}

fn pad_line(text: &str) -> String {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .take(COLUMNS)
        .collect();
    format!("{ascii:<COLUMNS$}")
}
