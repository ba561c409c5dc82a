//! Time-bounded device calls.
//!
//! Every device lives on its own worker thread. The control loop hands it one
//! job at a time and waits at most the device timeout, clipped to what is left
//! of the cycle budget. A job that outlives its wait keeps running on the
//! worker; until it finishes, further calls fail fast with
//! [`DeviceError::Unavailable`] instead of queueing behind it.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::actuator::Relay;
use crate::display::Sink;
use crate::error::{DeviceError, LoopFatal, SensorFault};
use crate::model::{EvaluatedState, Reading, RelayState};
use crate::sensors::Reader;

type Job<D> = Box<dyn FnOnce(&mut D) + Send>;

/// Shared deadline for all device calls of the current cycle.
#[derive(Debug, Clone)]
pub struct CycleBudget {
    limit: Duration,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl CycleBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            deadline: Arc::new(Mutex::new(None)),
        }
    }

    /// Reset the budget at the start of a cycle.
    pub fn start(&self) {
        *self.deadline.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now() + self.limit);
    }

    /// Time left in the current cycle; the full budget outside of a cycle.
    pub fn remaining(&self) -> Duration {
        match *self.deadline.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.limit,
        }
    }
}

/// A device owned by a dedicated worker thread.
pub struct Bounded<D> {
    name: String,
    jobs: Sender<Job<D>>,
    busy: Arc<AtomicBool>,
    timeout: Duration,
}

impl<D: Send + 'static> Bounded<D> {
    /// Move `device` onto a new worker thread.
    pub fn spawn(name: &str, mut device: D, timeout: Duration) -> Result<Self, LoopFatal> {
        let (jobs, queue) = mpsc::channel::<Job<D>>();
        thread::Builder::new()
            .name(format!("device-{name}"))
            .spawn(move || {
                for job in queue {
                    job(&mut device);
                }
            })
            .map_err(|e| LoopFatal::WorkerSpawn(format!("{name}: {e}")))?;

        Ok(Self {
            name: name.to_owned(),
            jobs,
            busy: Arc::new(AtomicBool::new(false)),
            timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` on the device, waiting at most `min(timeout, limit)`.
    pub fn call<T, E, F>(&self, limit: Duration, op: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<DeviceError> + Send + 'static,
        F: FnOnce(&mut D) -> Result<T, E> + Send + 'static,
    {
        if self.busy.load(Ordering::SeqCst) {
            return Err(
                DeviceError::unavailable(&self.name, "still busy with a timed-out call").into(),
            );
        }

        let wait = self.timeout.min(limit);
        if wait.is_zero() {
            return Err(DeviceError::Timeout {
                device: self.name.clone(),
                timeout_ms: 0,
            }
            .into());
        }

        let (reply, result) = mpsc::sync_channel(1);
        let busy = Arc::clone(&self.busy);
        busy.store(true, Ordering::SeqCst);
        let job: Job<D> = Box::new(move |device| {
            let outcome = op(device);
            busy.store(false, Ordering::SeqCst);
            let _ = reply.send(outcome);
        });

        if self.jobs.send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(DeviceError::unavailable(&self.name, "device worker has stopped").into());
        }

        match result.recv_timeout(wait) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(DeviceError::Timeout {
                device: self.name.clone(),
                timeout_ms: wait.as_millis() as u64,
            }
            .into()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DeviceError::unavailable(&self.name, "device worker has stopped").into())
            }
        }
    }
}

/// A [`Reader`], [`Sink`] or [`Relay`] whose calls are time-bounded.
pub struct Guarded<D> {
    inner: Bounded<D>,
    budget: CycleBudget,
}

impl<D: Send + 'static> Guarded<D> {
    pub fn new(
        name: &str,
        device: D,
        timeout: Duration,
        budget: CycleBudget,
    ) -> Result<Self, LoopFatal> {
        Ok(Self {
            inner: Bounded::spawn(name, device, timeout)?,
            budget,
        })
    }
}

impl<R: Reader + 'static> Reader for Guarded<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.inner
            .call(self.budget.remaining(), |reader: &mut R| reader.handshake())
    }

    fn read(&mut self, at: DateTime<Local>) -> Result<Vec<Reading>, SensorFault> {
        self.inner
            .call(self.budget.remaining(), move |reader: &mut R| reader.read(at))
    }
}

impl<S: Sink + 'static> Sink for Guarded<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        self.inner
            .call(self.budget.remaining(), |sink: &mut S| sink.handshake())
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError> {
        let state = state.clone();
        self.inner
            .call(self.budget.remaining(), move |sink: &mut S| sink.render(&state))
    }
}

impl<R: Relay + 'static> Relay for Guarded<R> {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        self.inner
            .call(self.budget.remaining(), move |relay: &mut R| relay.set(state))
    }
}
