//! Grow-light relay control.
//!
//! [`LightingActuator::decide`] is a pure function of the evaluated state and
//! the growth window; [`LightingActuator::apply`] touches the relay only when
//! the commanded position differs from the last one that was applied.

use std::str::FromStr;

use crate::error::DeviceError;
use crate::hal::OutputLine;
use crate::model::{ActuatorCommand, EvaluatedState, LightClass, RelayState};
use crate::time::GrowthWindow;

/// How light class and growth window combine into a relay position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingPolicy {
    /// Light only when it is dark inside the growth window.
    Supplement,
    /// Light for the whole growth window regardless of daylight.
    Window,
    /// Never light.
    Off,
}

impl LightingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightingPolicy::Supplement => "supplement",
            LightingPolicy::Window => "window",
            LightingPolicy::Off => "off",
        }
    }
}

impl FromStr for LightingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supplement" => Ok(LightingPolicy::Supplement),
            "window" => Ok(LightingPolicy::Window),
            "off" => Ok(LightingPolicy::Off),
            other => anyhow::bail!(
                "lighting_policy must be \"supplement\", \"window\" or \"off\" (got \"{other}\")"
            ),
        }
    }
}

/// A switchable output.
#[cfg_attr(test, mockall::automock)]
pub trait Relay: Send {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError>;
}

/// Relay module on a GPIO line, energized when the line is high.
pub struct GpioRelay {
    line: Box<dyn OutputLine>,
}

impl GpioRelay {
    pub fn new(line: Box<dyn OutputLine>) -> Self {
        Self { line }
    }
}

impl Relay for GpioRelay {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        self.line
            .set(state.is_on())
            .map_err(|e| DeviceError::io("relay", e))
    }
}

pub struct LightingActuator {
    relay: Box<dyn Relay>,
    policy: LightingPolicy,
    window: GrowthWindow,
    applied: RelayState,
    writes: u64,
}

impl LightingActuator {
    /// The relay is assumed off until the first write.
    pub fn new(relay: Box<dyn Relay>, policy: LightingPolicy, window: GrowthWindow) -> Self {
        Self {
            relay,
            policy,
            window,
            applied: RelayState::Off,
            writes: 0,
        }
    }

    pub fn decide(&self, state: &EvaluatedState) -> ActuatorCommand {
        let in_window = self.window.contains(state.evaluated_at);
        let on = match self.policy {
            LightingPolicy::Supplement => state.light_class == LightClass::Night && in_window,
            LightingPolicy::Window => in_window,
            LightingPolicy::Off => false,
        };

        ActuatorCommand {
            relay_state: if on { RelayState::On } else { RelayState::Off },
            issued_at: state.evaluated_at,
            reason: state.light_class,
        }
    }

    /// Drive the relay to the commanded position if it is not there already.
    ///
    /// Returns whether the relay was written. On failure the last applied
    /// position is kept, so the next cycle tries again.
    pub fn apply(&mut self, command: &ActuatorCommand) -> Result<bool, DeviceError> {
        if command.relay_state == self.applied {
            return Ok(false);
        }

        self.relay.set(command.relay_state)?;
        self.writes += 1;
        log_decorated!(
            "Grow light {} ({} light)",
            command.relay_state,
            command.reason.as_str().to_lowercase()
        );
        self.applied = command.relay_state;
        Ok(true)
    }

    pub fn applied(&self) -> RelayState {
        self.applied
    }

    /// Number of relay writes so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}
