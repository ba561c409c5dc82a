//! Display sinks.
//!
//! Each sink renders an [`EvaluatedState`] on its own device. Sinks are
//! independent: the loop renders them in any order and a failing sink never
//! affects another. Sinks remember what they last drew and skip redundant
//! bus traffic.

pub mod lcd;
pub mod matrix;
pub mod segment;

use crate::error::DeviceError;
use crate::model::EvaluatedState;

pub use lcd::TextDisplay;
pub use matrix::SymbolMatrix;
pub use segment::NumericDisplay;

#[cfg_attr(test, mockall::automock)]
pub trait Sink: Send {
    fn name(&self) -> &str;

    /// Initialize the device once at startup.
    fn handshake(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError>;
}

/// `{value:.1}` or a dash placeholder when the value is absent.
pub(crate) fn one_decimal(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "--.-".to_owned(),
    }
}
