//! Fixed-interval pacing for the control loop.

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::source::Clock;
use crate::common::constants::STOP_POLL_INTERVAL_MS;
use crate::error::LoopFatal;

/// Schedules cycle starts `interval` apart, measured start to start.
///
/// Waits are sliced so a cleared running flag is noticed within
/// [`STOP_POLL_INTERVAL_MS`].
pub struct Ticker {
    clock: Arc<dyn Clock>,
    interval: chrono::Duration,
    deadline: Option<DateTime<Local>>,
}

impl Ticker {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Result<Self, LoopFatal> {
        if interval.is_zero() {
            return Err(LoopFatal::ZeroInterval);
        }
        let interval = chrono::Duration::from_std(interval)
            .map_err(|e| LoopFatal::Internal(format!("interval out of range: {e}")))?;
        Ok(Self {
            clock,
            interval,
            deadline: None,
        })
    }

    /// Record that a cycle starts now; the next one is due one interval later.
    pub fn start_cycle(&mut self) {
        let now = self.clock.now();
        self.deadline = Some(now + self.interval);
    }

    /// Block until the next cycle is due.
    ///
    /// Returns `false` as soon as `running` is cleared. A cycle that overran
    /// its interval makes the next one start immediately.
    pub fn wait_next(&mut self, running: &AtomicBool) -> bool {
        let slice = chrono::Duration::milliseconds(STOP_POLL_INTERVAL_MS as i64);

        loop {
            if !running.load(Ordering::SeqCst) {
                return false;
            }

            let Some(deadline) = self.deadline else {
                return true;
            };
            let now = self.clock.now();
            if now >= deadline {
                let overrun = now - deadline;
                if overrun > self.interval {
                    log_debug!(
                        "Cycle overran its interval by {} ms",
                        overrun.num_milliseconds()
                    );
                }
                return true;
            }

            let step = (deadline - now).min(slice);
            self.clock
                .sleep(step.to_std().unwrap_or(Duration::from_millis(STOP_POLL_INTERVAL_MS)));
        }
    }
}
