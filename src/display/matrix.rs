//! 8x8 LED matrix driven by a MAX7219 on SPI: a sun by day, a moon by night.

use super::Sink;
use crate::error::DeviceError;
use crate::hal::SpiDevice;
use crate::model::{EvaluatedState, LightClass};

const NAME: &str = "matrix";

// MAX7219 registers
const DECODE_MODE: u8 = 0x09;
const INTENSITY: u8 = 0x0A;
const SCAN_LIMIT: u8 = 0x0B;
const SHUTDOWN: u8 = 0x0C;
const DISPLAY_TEST: u8 = 0x0F;

/// One row per byte, top row first, most significant bit on the left.
pub type Glyph = [u8; 8];

pub const SUN: Glyph = [0x3C, 0x7E, 0xFF, 0xFF, 0xFF, 0x7E, 0x3C, 0x00];
pub const MOON: Glyph = [0x3C, 0x7E, 0x70, 0x60, 0x60, 0x70, 0x7E, 0x3C];

pub fn glyph_for(class: LightClass) -> &'static Glyph {
    match class {
        LightClass::Day => &SUN,
        LightClass::Night => &MOON,
    }
}

pub struct SymbolMatrix {
    bus: Box<dyn SpiDevice>,
    intensity: u8,
    shown: Option<LightClass>,
}

impl SymbolMatrix {
    pub fn new(bus: Box<dyn SpiDevice>, intensity: u8) -> Self {
        Self {
            bus,
            intensity: intensity.min(15),
            shown: None,
        }
    }

    fn register(&mut self, address: u8, value: u8) -> Result<(), DeviceError> {
        self.bus
            .write(&[address, value])
            .map_err(|e| DeviceError::io(NAME, e))
    }

    /// The symbol currently on the matrix, if the last draw succeeded.
    pub fn shown(&self) -> Option<LightClass> {
        self.shown
    }
}

impl Sink for SymbolMatrix {
    fn name(&self) -> &str {
        NAME
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.register(DISPLAY_TEST, 0x00)?;
        self.register(DECODE_MODE, 0x00)?;
        self.register(SCAN_LIMIT, 0x07)?;
        self.register(INTENSITY, self.intensity)?;
        self.register(SHUTDOWN, 0x01)?;
        for row in 1..=8 {
            self.register(row, 0x00)?;
        }
        self.shown = None;
        Ok(())
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError> {
        if self.shown == Some(state.light_class) {
            return Ok(());
        }

        self.shown = None;
        let glyph = glyph_for(state.light_class);
        for (row, bits) in (1u8..).zip(glyph.iter()) {
            self.register(row, *bits)?;
        }
        self.shown = Some(state.light_class);
        log_debug!(
            "Matrix shows the {}",
            match state.light_class {
                LightClass::Day => "sun",
                LightClass::Night => "moon",
            }
        );
        Ok(())
    }
}
