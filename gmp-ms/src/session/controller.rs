//! Session Controller
//!
//! Drives the per-patient session state machine against the remote device.
//! Device and settle failures end the session in ERROR with a typed fault;
//! they are never returned as errors. Callers read the resulting state (or
//! follow the event stream) and react.
//!
//! Every lifecycle transition for a patient runs under that patient's
//! lifecycle guard, so transitions are totally ordered per patient while
//! different patients proceed in parallel.

use super::registry::{PatientSlot, SessionRegistry};
use crate::gateway::{DeviceGateway, GatewayError, MeasurementStore};
use crate::models::{ChannelSet, DeviceCommand, MeasurementSession, SessionFault, StateTransition};
use crate::timeline::{align_grouping, AlignedTimeline, AlignmentCounters, ChannelGrouping};
use gmp_common::config::TomlConfig;
use gmp_common::events::{EventBus, GmpEvent, SessionFaultKind, SessionState};
use gmp_common::time::{millis_to_duration, now};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timing knobs for the session lifecycle
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Device-side flush latency waited out after a stop acknowledgement
    pub settle_delay: Duration,
    /// Limit for one device command or channel fetch
    pub command_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            settle_delay: millis_to_duration(config.session.settle_delay_ms),
            command_timeout: millis_to_duration(config.device.command_timeout_ms),
        }
    }
}

/// Timeline read failure
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Channel lookup failed: {0}")]
    LookupFailed(#[from] GatewayError),
}

struct ControllerInner {
    registry: SessionRegistry,
    device: Arc<dyn DeviceGateway>,
    store: Arc<dyn MeasurementStore>,
    event_bus: EventBus,
    settings: SessionSettings,
    counters: Arc<AlignmentCounters>,
}

/// Cheap to clone; clones share one registry
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(
        registry: SessionRegistry,
        device: Arc<dyn DeviceGateway>,
        store: Arc<dyn MeasurementStore>,
        event_bus: EventBus,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                registry,
                device,
                store,
                event_bus,
                settings,
                counters: Arc::new(AlignmentCounters::default()),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn alignment_counters(&self) -> &AlignmentCounters {
        &self.inner.counters
    }

    /// Current session for a patient (IDLE placeholder when none)
    pub async fn state(&self, patient_id: i64) -> MeasurementSession {
        self.inner.registry.current(patient_id).await
    }

    /// Start a new session, silently stopping any active one first
    ///
    /// Concurrent starts for one patient are serialized: a caller that
    /// queued behind another start observes that start's outcome instead of
    /// driving the device again.
    pub async fn start(&self, patient_id: i64) -> MeasurementSession {
        loop {
            let slot = self.inner.registry.get_or_create(patient_id).await;
            let seen = slot.current().await;
            let _guard = slot.lifecycle.lock().await;

            if slot.is_retired() {
                continue;
            }

            // STARTING is only observable while another start holds the guard
            let current = slot.current().await;
            if current.sequence != seen.sequence || seen.state == SessionState::Starting {
                debug!(
                    patient_id,
                    sequence = current.sequence,
                    state = current.state.as_str(),
                    "Start coalesced with concurrent start"
                );
                return current;
            }

            if current.is_active() {
                self.silent_stop(&slot, &current).await;
            }

            return self.begin(&slot, patient_id, current.sequence + 1).await;
        }
    }

    /// Stop the running session
    ///
    /// Anything but RUNNING is a no-op returning the current state. A
    /// non-silent stop returns as soon as the device acknowledges; the
    /// settle-then-fetch continues in the background.
    pub async fn stop(&self, patient_id: i64, silent: bool) -> MeasurementSession {
        let Some(slot) = self.inner.registry.get(patient_id).await else {
            return self.inner.registry.current(patient_id).await;
        };
        let _guard = slot.lifecycle.lock().await;

        let current = slot.current().await;
        if current.state != SessionState::Running {
            debug!(
                patient_id,
                state = current.state.as_str(),
                "Stop ignored; session not running"
            );
            return current;
        }

        if silent {
            self.silent_stop(&slot, &current).await;
            return slot.current().await;
        }

        self.capture_snapshot(&slot, patient_id).await;

        match self.send(DeviceCommand::Stop, patient_id).await {
            Ok(()) => {
                self.apply(&slot, true, |s| {
                    s.stopped_at = Some(now());
                    s.transition_to(SessionState::Stopping)
                })
                .await;
                let settling = self
                    .apply(&slot, true, |s| s.transition_to(SessionState::Settling))
                    .await;
                self.spawn_settle(slot.clone(), patient_id, settling.sequence);
                settling
            }
            Err(fault) => self.fail(&slot, fault, true).await,
        }
    }

    /// Drop a patient's idle or terminal slot
    pub async fn clear(&self, patient_id: i64) -> Result<bool, MeasurementSession> {
        self.inner.registry.clear(patient_id).await
    }

    /// Aligned timeline for a patient
    ///
    /// While SETTLING the pre-stop snapshot is served; in every other state
    /// the channels are read through and the snapshot refreshed.
    pub async fn aligned_timeline(
        &self,
        patient_id: i64,
        grouping: ChannelGrouping,
    ) -> Result<AlignedTimeline, TimelineError> {
        let slot = self.inner.registry.get(patient_id).await;
        let state = match &slot {
            Some(slot) => Some(slot.current().await.state),
            None => None,
        };

        let channels = match (&slot, state) {
            (Some(slot), Some(SessionState::Settling)) => {
                slot.snapshot.read().await.clone().unwrap_or_default()
            }
            _ => {
                let fresh = Arc::new(self.fetch(patient_id).await?);
                if let Some(slot) = &slot {
                    if slot.current().await.state != SessionState::Settling {
                        *slot.snapshot.write().await = Some(fresh.clone());
                    }
                }
                fresh
            }
        };

        let aligned = align_grouping(&channels, grouping);
        self.inner.counters.record(&aligned.diagnostics);
        Ok(aligned)
    }

    async fn begin(
        &self,
        slot: &PatientSlot,
        patient_id: i64,
        sequence: u64,
    ) -> MeasurementSession {
        self.apply(slot, true, |s| {
            *s = MeasurementSession::new(patient_id, sequence);
            s.transition_to(SessionState::Starting)
        })
        .await;

        match self.send(DeviceCommand::Start, patient_id).await {
            Ok(()) => {
                self.apply(slot, true, |s| {
                    s.started_at = Some(now());
                    s.transition_to(SessionState::Running)
                })
                .await
            }
            Err(fault) => self.fail(slot, fault, true).await,
        }
    }

    /// Clear an active session without notification or settle-fetch
    ///
    /// Caller holds the lifecycle guard.
    async fn silent_stop(&self, slot: &PatientSlot, current: &MeasurementSession) {
        let patient_id = current.patient_id;
        debug!(
            patient_id,
            sequence = current.sequence,
            state = current.state.as_str(),
            "Silent stop"
        );

        if current.state != SessionState::Running {
            // Stop already acknowledged; a pending settle sees the state
            // change and discards its result
            self.apply(slot, false, |s| s.transition_to(SessionState::Idle))
                .await;
            return;
        }

        match self.send(DeviceCommand::Stop, patient_id).await {
            Ok(()) => {
                self.apply(slot, false, |s| {
                    s.stopped_at = Some(now());
                    s.transition_to(SessionState::Stopping)
                })
                .await;
                self.apply(slot, false, |s| s.transition_to(SessionState::Idle))
                    .await;
            }
            Err(fault) => {
                self.fail(slot, fault, false).await;
            }
        }
    }

    fn spawn_settle(&self, slot: Arc<PatientSlot>, patient_id: i64, sequence: u64) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.settle(slot, patient_id, sequence).await;
        });
    }

    async fn settle(&self, slot: Arc<PatientSlot>, patient_id: i64, sequence: u64) {
        tokio::time::sleep(self.inner.settings.settle_delay).await;
        let fetched = self.fetch(patient_id).await;

        let _guard = slot.lifecycle.lock().await;
        let current = slot.current().await;
        if current.sequence != sequence || current.state != SessionState::Settling {
            debug!(
                patient_id,
                sequence,
                current_sequence = current.sequence,
                state = current.state.as_str(),
                "Discarding stale settle result"
            );
            return;
        }

        match fetched {
            Ok(channels) => {
                debug!(
                    patient_id,
                    sequence,
                    points = channels.total_points(),
                    "Settle fetch complete"
                );
                let channel_lengths = channels.lengths();
                *slot.snapshot.write().await = Some(Arc::new(channels));
                let ready = self
                    .apply(&slot, true, |s| s.transition_to(SessionState::Ready))
                    .await;
                self.inner.event_bus.emit_lossy(GmpEvent::TimelineReady {
                    patient_id,
                    sequence: ready.sequence,
                    channel_lengths,
                    timestamp: now(),
                });
            }
            Err(e) => {
                let fault = SessionFault {
                    kind: SessionFaultKind::SettleFetchFailed,
                    command: None,
                    message: e.to_string(),
                };
                self.fail(&slot, fault, true).await;
            }
        }
    }

    /// Best-effort pre-stop snapshot for reads during SETTLING
    async fn capture_snapshot(&self, slot: &PatientSlot, patient_id: i64) {
        match self.fetch(patient_id).await {
            Ok(channels) => *slot.snapshot.write().await = Some(Arc::new(channels)),
            Err(e) => debug!(patient_id, "Pre-stop snapshot unavailable: {}", e),
        }
    }

    async fn fetch(&self, patient_id: i64) -> Result<ChannelSet, GatewayError> {
        let limit = self.inner.settings.command_timeout;
        match tokio::time::timeout(limit, self.inner.store.fetch_channels(patient_id)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Unavailable(format!(
                "channel fetch timed out after {} ms",
                limit.as_millis()
            ))),
        }
    }

    async fn send(&self, command: DeviceCommand, patient_id: i64) -> Result<(), SessionFault> {
        let limit = self.inner.settings.command_timeout;
        let outcome = tokio::time::timeout(
            limit,
            self.inner.device.send_command(command, patient_id),
        )
        .await;

        let (kind, message) = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(GatewayError::Unavailable(message))) => {
                (SessionFaultKind::DeviceUnreachable, message)
            }
            Ok(Err(e)) => (SessionFaultKind::CommandRejected, e.to_string()),
            Err(_) => (
                SessionFaultKind::DeviceUnreachable,
                format!("{} command timed out after {} ms", command, limit.as_millis()),
            ),
        };

        Err(SessionFault {
            kind,
            command: Some(command),
            message,
        })
    }

    async fn apply<F>(&self, slot: &PatientSlot, notify: bool, change: F) -> MeasurementSession
    where
        F: FnOnce(&mut MeasurementSession) -> StateTransition,
    {
        let (transition, snapshot) = {
            let mut session = slot.session.write().await;
            let transition = change(&mut session);
            (transition, session.clone())
        };
        self.publish(&transition, notify);
        snapshot
    }

    async fn fail(&self, slot: &PatientSlot, fault: SessionFault, notify: bool) -> MeasurementSession {
        let kind = fault.kind;
        let message = fault.message.clone();
        let command = fault.command;

        let failed = self.apply(slot, notify, |s| s.fail(fault)).await;
        warn!(
            patient_id = failed.patient_id,
            sequence = failed.sequence,
            kind = ?kind,
            command = ?command,
            "Session failed: {}",
            message
        );

        self.inner.event_bus.emit_lossy(GmpEvent::SessionFailed {
            patient_id: failed.patient_id,
            sequence: failed.sequence,
            kind,
            message,
            notify,
            timestamp: now(),
        });
        failed
    }

    fn publish(&self, transition: &StateTransition, notify: bool) {
        if notify {
            info!(
                patient_id = transition.patient_id,
                sequence = transition.sequence,
                "Session {} -> {}",
                transition.old_state.as_str(),
                transition.new_state.as_str()
            );
        } else {
            debug!(
                patient_id = transition.patient_id,
                sequence = transition.sequence,
                "Silent session {} -> {}",
                transition.old_state.as_str(),
                transition.new_state.as_str()
            );
        }

        self.inner.event_bus.emit_lossy(GmpEvent::SessionStateChanged {
            patient_id: transition.patient_id,
            sequence: transition.sequence,
            old_state: transition.old_state,
            new_state: transition.new_state,
            notify,
            timestamp: transition.transitioned_at,
        });
    }
}
