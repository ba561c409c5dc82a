//! Time handling: local clock, network time discipline, pacing and the
//! growth-light window.

pub mod adapter;
pub mod ntp;
pub mod source;
pub mod ticker;
pub mod window;

pub use adapter::{LocalTime, NetworkTime, TimeSource};
pub use ntp::{NtpQuery, SntpClient};
pub use source::{Clock, SystemClock, VirtualClock};
pub use ticker::Ticker;
pub use window::{GrowthWindow, TimeWindow, WindowSource};
