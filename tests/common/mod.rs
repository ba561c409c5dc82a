//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Local, TimeZone};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenhouse::actuator::{LightingActuator, LightingPolicy, Relay};
use greenhouse::core::{ControlLoopParams, LoopSettings};
use greenhouse::display::Sink;
use greenhouse::error::{DeviceError, PersistenceFailure, SensorFault};
use greenhouse::evaluator::Evaluator;
use greenhouse::hal::SpiDevice;
use greenhouse::model::{
    EvaluatedState, MeasurementRecord, Reading, RecordId, RelayState, SensorKind, StoredRecord,
};
use greenhouse::sensors::Reader;
use greenhouse::store::MeasurementStore;
use greenhouse::time::{GrowthWindow, LocalTime, TimeWindow, VirtualClock};

pub fn at(hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
}

pub fn default_window() -> GrowthWindow {
    GrowthWindow::manual(TimeWindow::new(
        chrono::NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
    ))
}

/// What one poll of a [`ScriptedReader`] produces.
#[derive(Clone)]
pub enum Sample {
    Values(Vec<(SensorKind, f64)>),
    Fault(SensorFault),
}

pub fn timeout_fault(device: &str) -> SensorFault {
    SensorFault::Device(DeviceError::Timeout {
        device: device.to_owned(),
        timeout_ms: 2000,
    })
}

/// Plays back a script of samples, then repeats the fallback forever.
pub struct ScriptedReader {
    name: String,
    script: VecDeque<Sample>,
    fallback: Sample,
    pub polls: Arc<Mutex<u32>>,
    handshake_ok: bool,
}

impl ScriptedReader {
    pub fn steady(name: &str, values: Vec<(SensorKind, f64)>) -> Self {
        Self {
            name: name.to_owned(),
            script: VecDeque::new(),
            fallback: Sample::Values(values),
            polls: Arc::new(Mutex::new(0)),
            handshake_ok: true,
        }
    }

    pub fn with_script(mut self, script: Vec<Sample>) -> Self {
        self.script = script.into();
        self
    }

    pub fn failing_handshake(mut self) -> Self {
        self.handshake_ok = false;
        self
    }
}

impl Reader for ScriptedReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn handshake(&mut self) -> Result<(), DeviceError> {
        if self.handshake_ok {
            Ok(())
        } else {
            Err(DeviceError::unavailable(&self.name, "no answer"))
        }
    }

    fn read(&mut self, at: DateTime<Local>) -> Result<Vec<Reading>, SensorFault> {
        *self.polls.lock().unwrap() += 1;
        let sample = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match sample {
            Sample::Values(values) => values
                .into_iter()
                .map(|(kind, value)| Reading::new(kind, value, at))
                .collect(),
            Sample::Fault(fault) => Err(fault),
        }
    }
}

pub fn climate(temperature: f64, humidity: f64) -> ScriptedReader {
    ScriptedReader::steady(
        "dht11",
        vec![
            (SensorKind::Temperature, temperature),
            (SensorKind::Humidity, humidity),
        ],
    )
}

pub fn light(lux: f64) -> ScriptedReader {
    ScriptedReader::steady("bh1750", vec![(SensorKind::Light, lux)])
}

/// Remembers every state it was asked to render.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub rendered: Arc<Mutex<Vec<EvaluatedState>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recorder"
    }

    fn render(&mut self, state: &EvaluatedState) -> Result<(), DeviceError> {
        if *self.fail.lock().unwrap() {
            return Err(DeviceError::io("recorder", "bus error"));
        }
        self.rendered.lock().unwrap().push(state.clone());
        Ok(())
    }
}

/// SPI bus that keeps every written frame.
#[derive(Clone, Default)]
pub struct RecordingSpi {
    pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SpiDevice for RecordingSpi {
    fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.frames.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

impl RecordingSpi {
    /// Last value written to each of the eight row registers.
    pub fn rows(&self) -> [u8; 8] {
        let mut rows = [0u8; 8];
        for frame in self.frames.lock().unwrap().iter() {
            if let [register @ 1..=8, value] = frame.as_slice() {
                rows[(*register - 1) as usize] = *value;
            }
        }
        rows
    }
}

#[derive(Clone, Default)]
pub struct RecordingRelay {
    pub writes: Arc<Mutex<Vec<RelayState>>>,
}

impl Relay for RecordingRelay {
    fn set(&mut self, state: RelayState) -> Result<(), DeviceError> {
        self.writes.lock().unwrap().push(state);
        Ok(())
    }
}

/// In-memory store that can be told to fail specific appends (1-based).
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub rows: Arc<Mutex<Vec<MeasurementRecord>>>,
    pub fail_appends: Arc<Mutex<Vec<usize>>>,
    appends: Arc<Mutex<usize>>,
    pub schema_calls: Arc<Mutex<u32>>,
}

impl MeasurementStore for MemoryStore {
    fn create_schema(&mut self) -> Result<(), PersistenceFailure> {
        *self.schema_calls.lock().unwrap() += 1;
        Ok(())
    }

    fn append(&mut self, record: &MeasurementRecord) -> Result<RecordId, PersistenceFailure> {
        let attempt = {
            let mut appends = self.appends.lock().unwrap();
            *appends += 1;
            *appends
        };
        if self.fail_appends.lock().unwrap().contains(&attempt) {
            return Err(PersistenceFailure::Unavailable("database locked".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        rows.push(record.clone());
        Ok(RecordId(rows.len() as i64))
    }

    fn records(&mut self) -> Result<Vec<StoredRecord>, PersistenceFailure> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, record)| StoredRecord {
                id: RecordId(i as i64 + 1),
                record: record.clone(),
            })
            .collect())
    }
}

/// Everything a test needs to drive and inspect a loop.
pub struct Rig {
    pub clock: Arc<VirtualClock>,
    pub running: Arc<AtomicBool>,
    pub store: MemoryStore,
    pub relay: RecordingRelay,
    pub sink: RecordingSink,
    pub readers: Vec<Box<dyn Reader>>,
    pub extra_sinks: Vec<Box<dyn Sink>>,
    pub policy: LightingPolicy,
    pub iterations: Option<u64>,
    pub interval: Duration,
    pub retries: u32,
}

impl Rig {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            clock: Arc::new(VirtualClock::new(start)),
            running: Arc::new(AtomicBool::new(true)),
            store: MemoryStore::default(),
            relay: RecordingRelay::default(),
            sink: RecordingSink::default(),
            readers: Vec::new(),
            extra_sinks: Vec::new(),
            policy: LightingPolicy::Supplement,
            iterations: Some(1),
            interval: Duration::from_secs(3),
            retries: 3,
        }
    }

    pub fn reader(mut self, reader: impl Reader + 'static) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.extra_sinks.push(Box::new(sink));
        self
    }

    pub fn iterations(mut self, n: Option<u64>) -> Self {
        self.iterations = n;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.retries = n;
        self
    }

    pub fn policy(mut self, policy: LightingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hand the devices to loop parameters, keeping shared handles in `self`.
    pub fn params(&mut self) -> ControlLoopParams {
        let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(self.sink.clone())];
        sinks.append(&mut self.extra_sinks);

        ControlLoopParams {
            settings: LoopSettings {
                interval: self.interval,
                iterations: self.iterations,
                sensor_retries: self.retries,
            },
            evaluator: Evaluator::new(100.0),
            readers: std::mem::take(&mut self.readers),
            sinks,
            actuator: LightingActuator::new(
                Box::new(self.relay.clone()),
                self.policy,
                default_window(),
            ),
            store: Box::new(self.store.clone()),
            time: Box::new(LocalTime::new(self.clock.clone())),
            clock: self.clock.clone(),
            running: self.running.clone(),
            budget: None,
        }
    }
}
