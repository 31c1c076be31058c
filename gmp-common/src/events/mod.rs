//! Event system for GMP services
//!
//! Provides shared event definitions and the EventBus used to broadcast
//! session lifecycle changes to SSE clients and background recorders.

mod session_types;

pub use session_types::{SessionFaultKind, SessionState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// GMP event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// `notify` marks events the UI should surface to the therapist; silent
/// cleanup transitions carry `notify: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GmpEvent {
    /// A measurement session moved between lifecycle states
    SessionStateChanged {
        patient_id: i64,
        /// Per-patient monotonic session number
        sequence: u64,
        old_state: SessionState,
        new_state: SessionState,
        notify: bool,
        timestamp: DateTime<Utc>,
    },

    /// Finalized channels were fetched after settling
    TimelineReady {
        patient_id: i64,
        sequence: u64,
        /// Sample count per channel name
        channel_lengths: BTreeMap<String, usize>,
        timestamp: DateTime<Utc>,
    },

    /// A session entered ERROR
    SessionFailed {
        patient_id: i64,
        sequence: u64,
        kind: SessionFaultKind,
        message: String,
        notify: bool,
        timestamp: DateTime<Utc>,
    },
}

impl GmpEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            GmpEvent::SessionStateChanged { .. } => "SessionStateChanged",
            GmpEvent::TimelineReady { .. } => "TimelineReady",
            GmpEvent::SessionFailed { .. } => "SessionFailed",
        }
    }

    pub fn patient_id(&self) -> i64 {
        match self {
            GmpEvent::SessionStateChanged { patient_id, .. }
            | GmpEvent::TimelineReady { patient_id, .. }
            | GmpEvent::SessionFailed { patient_id, .. } => *patient_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use gmp_common::events::{EventBus, GmpEvent, SessionState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GmpEvent::SessionStateChanged {
///     patient_id: 7,
///     sequence: 1,
///     old_state: SessionState::Idle,
///     new_state: SessionState::Starting,
///     notify: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GmpEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GmpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GmpEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_event() -> GmpEvent {
        GmpEvent::SessionFailed {
            patient_id: 3,
            sequence: 2,
            kind: SessionFaultKind::DeviceUnreachable,
            message: "connection refused".to_string(),
            notify: true,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit_lossy(failed_event());

        // Late subscribers only see what follows
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.emit_lossy(failed_event());
        assert_eq!(rx.recv().await.unwrap().patient_id(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit_lossy(failed_event());

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1.patient_id(), 3);
        assert_eq!(e1.event_type(), "SessionFailed");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(failed_event()).unwrap();
        assert_eq!(json["type"], "SessionFailed");
        assert_eq!(json["kind"], "device_unreachable");
    }
}
