// Shared constants used across modules
pub mod constants;
