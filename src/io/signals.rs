//! Unix signal handling.
//!
//! SIGINT, SIGTERM and SIGHUP request a graceful stop: the shared `running`
//! flag is cleared and the control loop finishes its in-flight cycle before
//! exiting. A second signal while stopping is only logged.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::{Handle, Signals},
};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

/// Signal handling state shared with the control loop.
pub struct SignalState {
    /// Cleared when a stop has been requested
    pub running: Arc<AtomicBool>,
    handle: Handle,
}

impl SignalState {
    /// Stop listening for signals; the handler thread then exits.
    pub fn close(&self) {
        self.handle.close();
    }
}

fn signal_name(sig: i32) -> &'static str {
    match sig {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        _ => "signal",
    }
}

/// Register the stop signals and spawn the thread that watches them.
pub fn setup_signal_handler() -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;
    let handle = signals.handle();

    let running_clone = running.clone();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for sig in signals.forever() {
                if running_clone.swap(false, Ordering::SeqCst) {
                    log_pipe!();
                    log_info!(
                        "Received {}, stopping after the current cycle",
                        signal_name(sig)
                    );
                } else {
                    log_debug!("Received {} while already stopping", signal_name(sig));
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState { running, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::{Duration, Instant};

    #[test]
    #[serial]
    fn test_sighup_clears_running_flag() {
        let state = setup_signal_handler().unwrap();
        assert!(state.running.load(Ordering::SeqCst));

        signal_hook::low_level::raise(SIGHUP).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while state.running.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!state.running.load(Ordering::SeqCst));
        state.close();
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(SIGINT), "SIGINT");
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(SIGHUP), "SIGHUP");
    }
}
