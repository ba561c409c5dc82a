//! End-to-end behavior of the control loop with doubles and a virtual clock.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use greenhouse::actuator::LightingPolicy;
use greenhouse::core::{ControlLoop, LoopState};
use greenhouse::display::SymbolMatrix;
use greenhouse::display::matrix::{MOON, SUN};
use greenhouse::error::{CycleFault, LoopFatal, SensorFault};
use greenhouse::hal::PulseLine;
use greenhouse::model::{LightClass, RelayState, SensorKind};
use greenhouse::sensors::Reader;
use greenhouse::sensors::{Dht11, dht11::encode_frame};

#[test]
fn test_bright_cycle_is_day_with_sun_and_record() {
    let spi = RecordingSpi::default();
    let mut rig = Rig::new(at(12, 0))
        .reader(climate(23.5, 45.2))
        .reader(light(256.0))
        .sink(SymbolMatrix::new(Box::new(spi.clone()), 8));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(summary.final_state, LoopState::Stopped);
    assert_eq!(summary.cycles_completed, 1);
    let report = &summary.reports[0];
    assert!(report.is_clean(), "faults: {:?}", report.faults);

    let state = report.state.as_ref().unwrap();
    assert_eq!(state.light_class, LightClass::Day);
    assert_eq!(spi.rows(), SUN);

    let rows = rig.store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].temperature, Some(23.5));
    assert_eq!(rows[0].humidity, Some(45.2));
    assert_eq!(rows[0].light_raw, 256.0);
    assert_eq!(rows[0].light_class, LightClass::Day);
    assert_eq!(rows[0].timestamp, at(12, 0));
    assert!(!rows[0].time_synced);
}

#[test]
fn test_dark_cycle_inside_window_switches_light_on() {
    let spi = RecordingSpi::default();
    let mut rig = Rig::new(at(7, 0))
        .reader(climate(20.0, 60.0))
        .reader(light(40.0))
        .sink(SymbolMatrix::new(Box::new(spi.clone()), 8));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    let report = &summary.reports[0];
    assert_eq!(
        report.state.as_ref().unwrap().light_class,
        LightClass::Night
    );
    assert_eq!(spi.rows(), MOON);
    assert_eq!(
        report.command.as_ref().unwrap().relay_state,
        RelayState::On
    );
    assert!(report.relay_written);
    assert_eq!(*rig.relay.writes.lock().unwrap(), vec![RelayState::On]);
}

#[test]
fn test_dark_cycle_outside_window_keeps_light_off() {
    let mut rig = Rig::new(at(22, 0))
        .reader(climate(20.0, 60.0))
        .reader(light(40.0));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    let report = &summary.reports[0];
    assert_eq!(
        report.command.as_ref().unwrap().relay_state,
        RelayState::Off
    );
    assert!(!report.relay_written);
    assert!(rig.relay.writes.lock().unwrap().is_empty());
}

#[test]
fn test_temperature_failure_still_renders_and_persists() {
    let dht = climate(23.5, 45.2).with_script(vec![
        Sample::Fault(timeout_fault("dht11")),
        Sample::Fault(timeout_fault("dht11")),
    ]);
    let polls = dht.polls.clone();
    let mut rig = Rig::new(at(7, 0))
        .reader(dht)
        .reader(light(40.0))
        .retries(1);

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(*polls.lock().unwrap(), 2);
    let report = &summary.reports[0];
    assert_eq!(report.faults.len(), 1);
    assert!(matches!(
        &report.faults[0],
        CycleFault::Sensor { sensor, .. } if sensor == "dht11"
    ));

    let rendered = rig.sink.rendered.lock().unwrap();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].temperature, None);
    assert_eq!(rendered[0].humidity, None);

    let rows = rig.store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].temperature, None);
    assert_eq!(rows[0].light_class, LightClass::Night);
    assert_eq!(*rig.relay.writes.lock().unwrap(), vec![RelayState::On]);
}

#[test]
fn test_implausible_temperature_still_shows_humidity() {
    let dht = Dht11::new(Box::new(Replay(encode_frame([45, 0, 80, 0]))));
    let mut rig = Rig::new(at(12, 0))
        .reader(dht)
        .reader(light(256.0))
        .retries(1);

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    let report = &summary.reports[0];
    assert!(matches!(
        report.faults.as_slice(),
        [CycleFault::Sensor {
            fault: SensorFault::OutOfRange {
                kind: SensorKind::Temperature,
                ..
            },
            ..
        }]
    ));

    let rendered = rig.sink.rendered.lock().unwrap();
    assert_eq!(rendered[0].temperature, None);
    assert_eq!(rendered[0].humidity, Some(45.0));

    let rows = rig.store.rows.lock().unwrap();
    assert_eq!(rows[0].temperature, None);
    assert_eq!(rows[0].humidity, Some(45.0));
}

#[test]
fn test_retry_recovers_within_the_cycle() {
    let dht = climate(23.5, 45.2).with_script(vec![Sample::Fault(timeout_fault("dht11"))]);
    let mut rig = Rig::new(at(12, 0))
        .reader(dht)
        .reader(light(256.0))
        .retries(1);

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert!(summary.reports[0].is_clean());
    assert_eq!(rig.store.rows.lock().unwrap()[0].temperature, Some(23.5));
}

#[test]
fn test_store_outage_skips_one_record_and_continues() {
    let mut rig = Rig::new(at(12, 0))
        .reader(climate(23.5, 45.2))
        .reader(light(256.0))
        .iterations(Some(3));
    rig.store.fail_appends.lock().unwrap().push(2);

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(summary.cycles_completed, 3);
    assert!(summary.reports[0].record_id.is_some());
    assert!(summary.reports[1].record_id.is_none());
    assert!(matches!(
        summary.reports[1].faults.as_slice(),
        [CycleFault::Persistence(_)]
    ));
    assert!(summary.reports[2].record_id.is_some());

    let rows = rig.store.rows.lock().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, at(12, 0));
    assert_eq!(rows[1].timestamp, at(12, 0) + chrono::Duration::seconds(6));
}

#[test]
fn test_missing_light_skips_actuation_and_persistence() {
    let bh = light(256.0).with_script(vec![Sample::Fault(greenhouse::error::SensorFault::Device(
        greenhouse::error::DeviceError::unavailable("bh1750", "busy"),
    ))]);
    let mut rig = Rig::new(at(7, 0))
        .reader(climate(23.5, 45.2))
        .reader(bh)
        .iterations(Some(2));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    let first = &summary.reports[0];
    assert!(first.state.is_none());
    assert!(first.command.is_none());
    assert!(first.record_id.is_none());
    assert!(first.faults.iter().any(|f| matches!(
        f,
        CycleFault::Sensor { fault: greenhouse::error::SensorFault::Missing(SensorKind::Light), .. }
    )));

    assert!(summary.reports[1].record_id.is_some());
    assert_eq!(rig.sink.rendered.lock().unwrap().len(), 1);
    assert_eq!(rig.store.rows.lock().unwrap().len(), 1);
}

#[test]
fn test_display_failure_does_not_block_other_stages() {
    let mut rig = Rig::new(at(7, 0))
        .reader(climate(23.5, 45.2))
        .reader(light(40.0));
    *rig.sink.fail.lock().unwrap() = true;

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    let report = &summary.reports[0];
    assert!(matches!(
        report.faults.as_slice(),
        [CycleFault::Display { .. }]
    ));
    assert!(report.relay_written);
    assert!(report.record_id.is_some());
}

#[test]
fn test_relay_written_only_on_change() {
    let bh = light(40.0).with_script(vec![
        Sample::Values(vec![(SensorKind::Light, 40.0)]),
        Sample::Values(vec![(SensorKind::Light, 40.0)]),
        Sample::Values(vec![(SensorKind::Light, 500.0)]),
        Sample::Values(vec![(SensorKind::Light, 500.0)]),
        Sample::Values(vec![(SensorKind::Light, 30.0)]),
    ]);
    let mut rig = Rig::new(at(7, 0))
        .reader(bh)
        .iterations(Some(5));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(
        *rig.relay.writes.lock().unwrap(),
        vec![RelayState::On, RelayState::Off, RelayState::On]
    );
    assert_eq!(summary.relay_writes, 3);
}

#[test]
fn test_window_policy_ignores_daylight() {
    let mut rig = Rig::new(at(12, 0))
        .reader(light(900.0))
        .policy(LightingPolicy::Window);

    ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(*rig.relay.writes.lock().unwrap(), vec![RelayState::On]);
}

#[test]
fn test_timestamps_follow_the_interval() {
    let mut rig = Rig::new(at(12, 0))
        .reader(light(256.0))
        .iterations(Some(4));

    ControlLoop::new(rig.params()).unwrap().run();

    let rows = rig.store.rows.lock().unwrap();
    assert_eq!(rows.len(), 4);
    for pair in rows.windows(2) {
        assert_eq!(
            pair[1].timestamp - pair[0].timestamp,
            chrono::Duration::seconds(3)
        );
    }
}

#[test]
fn test_failed_handshake_disables_device_for_the_run() {
    let broken = climate(23.5, 45.2).failing_handshake();
    let polls = broken.polls.clone();
    let mut rig = Rig::new(at(12, 0))
        .reader(broken)
        .reader(light(256.0))
        .iterations(Some(2));

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(*polls.lock().unwrap(), 0);
    assert!(summary.reports.iter().all(|r| r.is_clean()));
    assert_eq!(rig.store.rows.lock().unwrap().len(), 2);
    assert_eq!(*rig.store.schema_calls.lock().unwrap(), 1);
}

#[test]
fn test_stop_before_start_runs_no_cycles() {
    let mut rig = Rig::new(at(12, 0)).reader(light(256.0)).iterations(None);
    rig.running.store(false, Ordering::SeqCst);

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(summary.cycles_completed, 0);
    assert_eq!(summary.final_state, LoopState::Stopped);
    assert!(rig.store.rows.lock().unwrap().is_empty());
}

#[test]
fn test_stop_signal_ends_unbounded_run_after_in_flight_cycle() {
    let mut rig = Rig::new(at(12, 0)).iterations(None);
    let running = rig.running.clone();
    let stopper = light(256.0).with_script(vec![
        Sample::Values(vec![(SensorKind::Light, 256.0)]),
        Sample::Values(vec![(SensorKind::Light, 256.0)]),
    ]);
    let polls = stopper.polls.clone();
    rig = rig.reader(StopAfter {
        inner: stopper,
        polls,
        after: 3,
        running,
    });

    let summary = ControlLoop::new(rig.params()).unwrap().run();

    assert_eq!(summary.cycles_completed, 3);
    assert_eq!(summary.final_state, LoopState::Stopped);
    assert_eq!(rig.store.rows.lock().unwrap().len(), 3);
}

#[test]
fn test_zero_interval_is_fatal_at_construction() {
    let mut rig = Rig::new(at(12, 0)).reader(light(256.0));
    rig.interval = Duration::ZERO;

    let result = ControlLoop::new(rig.params());

    assert!(matches!(result, Err(LoopFatal::ZeroInterval)));
}

/// Single-wire line that answers every capture with the same transmission.
struct Replay(Vec<Duration>);

impl PulseLine for Replay {
    fn capture(&mut self) -> anyhow::Result<Vec<Duration>> {
        Ok(self.0.clone())
    }
}

/// Clears the running flag from inside a poll, like a signal arriving mid-cycle.
struct StopAfter {
    inner: ScriptedReader,
    polls: std::sync::Arc<std::sync::Mutex<u32>>,
    after: u32,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Reader for StopAfter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read(
        &mut self,
        at: chrono::DateTime<chrono::Local>,
    ) -> Result<Vec<greenhouse::model::Reading>, greenhouse::error::SensorFault> {
        let result = self.inner.read(at);
        if *self.polls.lock().unwrap() >= self.after {
            self.running.store(false, Ordering::SeqCst);
        }
        result
    }
}
