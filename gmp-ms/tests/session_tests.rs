//! Session Controller lifecycle tests against scripted gateway fakes
//!
//! Covers restart-while-running, reads during SETTLING, concurrent starts,
//! device timeouts, settle-fetch failures and per-patient independence.
//! Every test runs on a paused clock, so device delays, command timeouts and
//! settle delays elapse only when the test advances time or the runtime
//! idles.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use gmp_common::events::{EventBus, GmpEvent, SessionFaultKind, SessionState};
use gmp_ms::gateway::{DeviceGateway, GatewayError, MeasurementStore};
use gmp_ms::models::{
    ChannelId, ChannelSet, DeviceCommand, MeasurementSession, SensorPoint, VideoAsset,
};
use gmp_ms::session::{SessionController, SessionRegistry, SessionSettings};
use gmp_ms::timeline::ChannelGrouping;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct ScriptedDevice {
    commands: Mutex<Vec<(DeviceCommand, i64)>>,
    delay: Duration,
    unreachable: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedDevice {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn commands_for(&self, patient_id: i64) -> Vec<DeviceCommand> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| *p == patient_id)
            .map(|(c, _)| *c)
            .collect()
    }
}

#[async_trait]
impl DeviceGateway for ScriptedDevice {
    async fn send_command(&self, command: DeviceCommand, patient_id: i64) -> Result<(), GatewayError> {
        self.commands.lock().unwrap().push((command, patient_id));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct SettableStore {
    channels: Mutex<ChannelSet>,
    failing: AtomicBool,
}

impl SettableStore {
    fn set_speed_samples(&self, count: usize) {
        *self.channels.lock().unwrap() = speed_set(count);
    }
}

#[async_trait]
impl MeasurementStore for SettableStore {
    async fn fetch_channels(&self, _patient_id: i64) -> Result<ChannelSet, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("store offline".into()));
        }
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn fetch_asset_by_measurement_id(
        &self,
        _measurement_id: &str,
    ) -> Result<Option<VideoAsset>, GatewayError> {
        Ok(None)
    }

    async fn fetch_assets_near_time(
        &self,
        _patient_id: i64,
        _at: DateTime<Utc>,
        _window_seconds: u32,
    ) -> Result<Vec<VideoAsset>, GatewayError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn speed_set(count: usize) -> ChannelSet {
    let base = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
    ChannelSet::from_points((0..count).map(|i| SensorPoint {
        channel: ChannelId::Speed,
        value: 2.0 + i as f64 * 0.1,
        measured_at: base + ChronoDuration::seconds(i as i64),
        measurement_id: Some(format!("m-{}", i)),
    }))
}

fn settings(settle_ms: u64, timeout_ms: u64) -> SessionSettings {
    SessionSettings {
        settle_delay: Duration::from_millis(settle_ms),
        command_timeout: Duration::from_millis(timeout_ms),
    }
}

fn controller(
    device: Arc<ScriptedDevice>,
    store: Arc<SettableStore>,
    settings: SessionSettings,
) -> (SessionController, EventBus) {
    let bus = EventBus::new(256);
    let controller =
        SessionController::new(SessionRegistry::new(), device, store, bus.clone(), settings);
    (controller, bus)
}

/// Move the paused clock forward and let woken tasks run
async fn elapse(duration: Duration) {
    tokio::time::advance(duration).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Step the clock until the patient's session reaches `state`, giving up
/// after two virtual seconds
async fn wait_for_state(
    controller: &SessionController,
    patient_id: i64,
    state: SessionState,
) -> MeasurementSession {
    for _ in 0..200 {
        let current = controller.state(patient_id).await;
        if current.state == state {
            return current;
        }
        elapse(Duration::from_millis(10)).await;
    }
    panic!(
        "patient {} never reached {:?}; last {:?}",
        patient_id,
        state,
        controller.state(patient_id).await.state
    );
}

fn drain(rx: &mut Receiver<GmpEvent>) -> Vec<GmpEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_while_running_silently_stops_then_starts_once() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    let (c, bus) = controller(device.clone(), store, settings(30, 500));

    let first = c.start(7).await;
    assert_eq!(first.state, SessionState::Running);
    assert_eq!(first.sequence, 1);

    let mut rx = bus.subscribe();
    let second = c.start(7).await;
    assert_eq!(second.state, SessionState::Running);
    assert_eq!(second.sequence, 2);

    assert_eq!(
        device.commands_for(7),
        vec![DeviceCommand::Start, DeviceCommand::Stop, DeviceCommand::Start]
    );

    let events = drain(&mut rx);
    // Silent stop of session 1 never notifies
    for event in &events {
        if let GmpEvent::SessionStateChanged {
            sequence, notify, ..
        } = event
        {
            assert_eq!(*notify, *sequence == 2, "unexpected {:?}", event);
        }
    }
    assert!(events.iter().any(|e| matches!(
        e,
        GmpEvent::SessionStateChanged {
            sequence: 1,
            new_state: SessionState::Idle,
            notify: false,
            ..
        }
    )));

    // No settle-fetch for the silently stopped session
    elapse(Duration::from_millis(80)).await;
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, GmpEvent::TimelineReady { .. })));
    assert_eq!(c.state(7).await.state, SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_settling_serves_pre_stop_snapshot_then_ready_serves_final() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    store.set_speed_samples(3);
    let (c, bus) = controller(device, store.clone(), settings(100, 500));
    let mut rx = bus.subscribe();

    c.start(1).await;
    let stopped = c.stop(1, false).await;
    assert_eq!(stopped.state, SessionState::Settling);
    assert!(stopped.stopped_at.is_some());

    // Device flushes more samples while settling
    store.set_speed_samples(5);

    let during = c.aligned_timeline(1, ChannelGrouping::Speed).await.unwrap();
    assert_eq!(during.points.len(), 3);

    elapse(Duration::from_millis(80)).await;
    assert_eq!(c.state(1).await.state, SessionState::Settling);

    let ready = wait_for_state(&c, 1, SessionState::Ready).await;
    assert_eq!(ready.sequence, 1);

    let after = c.aligned_timeline(1, ChannelGrouping::Speed).await.unwrap();
    assert_eq!(after.points.len(), 5);
    assert_eq!(after.points[4].sequence, 5);

    let events = drain(&mut rx);
    let ready_event = events
        .iter()
        .find_map(|e| match e {
            GmpEvent::TimelineReady {
                sequence,
                channel_lengths,
                ..
            } => Some((*sequence, channel_lengths.clone())),
            _ => None,
        })
        .expect("TimelineReady emitted");
    assert_eq!(ready_event.0, 1);
    assert_eq!(ready_event.1["speed"], 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_coalesce_into_one_device_start() {
    let device = Arc::new(ScriptedDevice::with_delay(Duration::from_millis(60)));
    let store = Arc::new(SettableStore::default());
    let (c, _bus) = controller(device.clone(), store, settings(30, 1_000));

    let (a, b) = tokio::join!(c.start(3), c.start(3));

    assert_eq!(a.state, SessionState::Running);
    assert_eq!(b.state, SessionState::Running);
    assert_eq!(a.sequence, b.sequence);
    assert_eq!(device.commands_for(3), vec![DeviceCommand::Start]);
}

#[tokio::test(start_paused = true)]
async fn test_start_timeout_is_device_unreachable() {
    let device = Arc::new(ScriptedDevice::with_delay(Duration::from_millis(300)));
    let store = Arc::new(SettableStore::default());
    let (c, bus) = controller(device, store, settings(30, 40));
    let mut rx = bus.subscribe();

    let session = c.start(2).await;
    assert_eq!(session.state, SessionState::Error);
    let fault = session.fault.expect("fault recorded");
    assert_eq!(fault.kind, SessionFaultKind::DeviceUnreachable);
    assert_eq!(fault.command, Some(DeviceCommand::Start));

    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        GmpEvent::SessionFailed {
            kind: SessionFaultKind::DeviceUnreachable,
            notify: true,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_on_stop_reports_stop_failure() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    let (c, _bus) = controller(device.clone(), store, settings(30, 500));

    c.start(4).await;
    device.unreachable.store(true, Ordering::SeqCst);

    let session = c.stop(4, false).await;
    assert_eq!(session.state, SessionState::Error);
    let fault = session.fault.expect("fault recorded");
    assert_eq!(fault.kind, SessionFaultKind::DeviceUnreachable);
    assert!(fault.is_stop_failure());
}

#[tokio::test(start_paused = true)]
async fn test_settle_fetch_failure_ends_in_error() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    store.set_speed_samples(2);
    let (c, _bus) = controller(device, store.clone(), settings(50, 500));

    c.start(5).await;
    assert_eq!(c.stop(5, false).await.state, SessionState::Settling);
    store.failing.store(true, Ordering::SeqCst);

    // Snapshot still served while settling; the store is not consulted
    let during = c.aligned_timeline(5, ChannelGrouping::Speed).await.unwrap();
    assert_eq!(during.points.len(), 2);

    let failed = wait_for_state(&c, 5, SessionState::Error).await;
    let fault = failed.fault.expect("fault recorded");
    assert_eq!(fault.kind, SessionFaultKind::SettleFetchFailed);
    assert_eq!(fault.command, None);

    assert!(c.aligned_timeline(5, ChannelGrouping::Speed).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_settling_discards_stale_settle() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    let (c, bus) = controller(device.clone(), store, settings(60, 500));
    let mut rx = bus.subscribe();

    c.start(6).await;
    assert_eq!(c.stop(6, false).await.state, SessionState::Settling);

    let restarted = c.start(6).await;
    assert_eq!(restarted.state, SessionState::Running);
    assert_eq!(restarted.sequence, 2);
    // Stop already acknowledged; the silent stop sends nothing more
    assert_eq!(
        device.commands_for(6),
        vec![DeviceCommand::Start, DeviceCommand::Stop, DeviceCommand::Start]
    );

    elapse(Duration::from_millis(150)).await;
    let current = c.state(6).await;
    assert_eq!(current.state, SessionState::Running);
    assert_eq!(current.sequence, 2);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, GmpEvent::TimelineReady { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_not_running_is_noop() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    let (c, _bus) = controller(device.clone(), store, settings(30, 500));

    assert_eq!(c.stop(9, false).await.state, SessionState::Idle);
    c.start(9).await;
    c.stop(9, false).await;
    let ready = wait_for_state(&c, 9, SessionState::Ready).await;

    let again = c.stop(9, false).await;
    assert_eq!(again, ready);
    assert_eq!(
        device.commands_for(9),
        vec![DeviceCommand::Start, DeviceCommand::Stop]
    );
}

#[tokio::test(start_paused = true)]
async fn test_patients_proceed_in_parallel() {
    let device = Arc::new(ScriptedDevice::with_delay(Duration::from_millis(60)));
    let store = Arc::new(SettableStore::default());
    let (c, _bus) = controller(device.clone(), store, settings(30, 1_000));

    let (a, b) = tokio::join!(c.start(10), c.start(11));

    assert_eq!(a.state, SessionState::Running);
    assert_eq!(b.state, SessionState::Running);
    assert_eq!(a.sequence, 1);
    assert_eq!(b.sequence, 1);
    assert_eq!(device.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(c.registry().active_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_sequences_continue_from_seeded_history() {
    let device = Arc::new(ScriptedDevice::default());
    let store = Arc::new(SettableStore::default());
    let registry = SessionRegistry::with_sequences([(12, 41)].into_iter().collect());
    let c = SessionController::new(
        registry,
        device,
        store,
        EventBus::new(16),
        settings(30, 500),
    );

    assert_eq!(c.start(12).await.sequence, 42);
}
