//! Command-line command handlers for greenhouse.
//!
//! One-shot commands that inspect state instead of running the control loop.

pub mod dump;
