//! # Greenhouse Library
//!
//! Measurement, evaluation and control loop for a small greenhouse: sample
//! temperature, humidity and light, show them on three displays, switch the
//! grow light and keep a history in SQLite.
//!
//! ## Architecture
//!
//! - **Entry Point**: `Greenhouse` builder acquires process resources, opens
//!   devices and runs the loop
//! - **Core Logic**: `core` holds the control loop and the per-cycle pipeline
//! - **Devices**: `sensors`, `display` and `actuator` behind capability traits,
//!   on top of the `hal` bus layer; `bounded` adds per-call time limits
//! - **Domain**: `model` and `evaluator` are pure and hardware-free
//! - **Time**: `time` provides clocks, network time, the ticker and the growth window
//! - **Storage**: `store` persists one record per cycle
//! - **Infrastructure**: `config`, `args`, `io` (lock, signals), `logger`

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

// Public API modules
pub mod actuator;
pub mod args;
pub mod bounded;
pub mod commands;
pub mod common;
pub mod config;
pub mod core;
pub mod display;
pub mod error;
pub mod evaluator;
pub mod hal;
pub mod io;
pub mod model;
pub mod sensors;
pub mod store;
pub mod time;

mod greenhouse;

pub use greenhouse::{Greenhouse, assemble};
