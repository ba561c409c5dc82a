//! Local clock abstraction.
//!
//! Everything that reads the wall clock or sleeps goes through a [`Clock`], so
//! tests can run hours of cycles instantly on a [`VirtualClock`].

use chrono::{DateTime, Local};
use std::sync::Mutex;
use std::time::Duration;

/// Source of local wall-clock time and blocking sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn sleep(&self, duration: Duration);
}

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fast-forward clock: `sleep` advances the current time and returns at once.
#[derive(Debug)]
pub struct VirtualClock {
    current: Mutex<DateTime<Local>>,
}

impl VirtualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|step| current.checked_add_signed(step))
        {
            *current = next;
        }
    }

    /// Jump to an arbitrary instant, including backwards.
    pub fn set(&self, to: DateTime<Local>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
