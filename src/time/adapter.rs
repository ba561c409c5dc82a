//! Network-disciplined wall clock.
//!
//! [`NetworkTime`] learns the offset between a time server and the local
//! [`Clock`] and applies it to every reading. When a resync fails the last
//! known offset stays in use and the adapter reports itself degraded until a
//! later resync succeeds; before the first success it uses the plain local
//! clock. Sync failures are logged and never propagate.

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::ntp::NtpQuery;
use super::source::Clock;

/// Current time for timestamps and window decisions.
pub trait TimeSource: Send {
    fn now(&mut self) -> DateTime<Local>;

    /// False while timestamps come from the unsynchronized local clock.
    fn is_synchronized(&self) -> bool;
}

/// Holds timestamps at the last returned value when the clock steps back.
#[derive(Debug, Default)]
struct Monotonic {
    last: Option<DateTime<Local>>,
}

impl Monotonic {
    fn clamp(&mut self, current: DateTime<Local>) -> DateTime<Local> {
        let current = match self.last {
            Some(previous) if current < previous => {
                log_debug!(
                    "Clock stepped back {} ms, holding at previous timestamp",
                    (previous - current).num_milliseconds()
                );
                previous
            }
            _ => current,
        };
        self.last = Some(current);
        current
    }
}

/// Local clock only, for installations without network time.
pub struct LocalTime {
    clock: Arc<dyn Clock>,
    monotonic: Monotonic,
}

impl LocalTime {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            monotonic: Monotonic::default(),
        }
    }
}

impl TimeSource for LocalTime {
    fn now(&mut self) -> DateTime<Local> {
        let current = self.clock.now();
        self.monotonic.clamp(current)
    }

    fn is_synchronized(&self) -> bool {
        false
    }
}

pub struct NetworkTime {
    clock: Arc<dyn Clock>,
    ntp: Box<dyn NtpQuery>,
    resync_interval: chrono::Duration,
    /// Offset learned from the last successful sync.
    offset: Option<chrono::Duration>,
    synchronized: bool,
    last_attempt: Option<DateTime<Local>>,
    monotonic: Monotonic,
}

impl NetworkTime {
    /// Create the adapter and attempt the first synchronization immediately.
    pub fn new(clock: Arc<dyn Clock>, ntp: Box<dyn NtpQuery>, resync_interval: Duration) -> Self {
        let mut adapter = Self {
            clock,
            ntp,
            resync_interval: chrono::Duration::from_std(resync_interval)
                .unwrap_or(chrono::Duration::hours(1)),
            offset: None,
            synchronized: false,
            last_attempt: None,
            monotonic: Monotonic::default(),
        };
        adapter.synchronize();
        adapter
    }

    /// Query the server now, replacing the stored offset on success.
    pub fn synchronize(&mut self) {
        let local = self.clock.now();
        self.last_attempt = Some(local);

        match self.ntp.query() {
            Ok(server_time) => {
                let offset = server_time - local.with_timezone(&Utc);
                if !self.synchronized {
                    log_info!(
                        "Time synchronized with {} (offset {} ms)",
                        self.ntp.server(),
                        offset.num_milliseconds()
                    );
                } else {
                    log_debug!(
                        "Resynchronized with {} (offset {} ms)",
                        self.ntp.server(),
                        offset.num_milliseconds()
                    );
                }
                self.offset = Some(offset);
                self.synchronized = true;
            }
            Err(e) => {
                match self.offset {
                    Some(offset) => {
                        log_warning!("Time sync lost: {e}");
                        log_indented!(
                            "Keeping the last offset ({} ms) until the next resync",
                            offset.num_milliseconds()
                        );
                    }
                    None => {
                        log_warning!("Time sync failed: {e}");
                        log_indented!("Using the local clock until the next resync");
                    }
                }
                self.synchronized = false;
            }
        }
    }

    fn resync_due(&self, local: DateTime<Local>) -> bool {
        match self.last_attempt {
            Some(last) => local - last >= self.resync_interval || local < last,
            None => true,
        }
    }
}

impl TimeSource for NetworkTime {
    fn now(&mut self) -> DateTime<Local> {
        if self.resync_due(self.clock.now()) {
            self.synchronize();
        }

        let local = self.clock.now();
        let current = match self.offset {
            Some(offset) => local.checked_add_signed(offset).unwrap_or(local),
            None => local,
        };
        self.monotonic.clamp(current)
    }

    fn is_synchronized(&self) -> bool {
        self.synchronized
    }
}
