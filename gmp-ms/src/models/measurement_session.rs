//! Measurement session state machine
//!
//! One session is one bounded device-driven measurement run for one patient.
//! `IDLE → STARTING → RUNNING → STOPPING → SETTLING → READY`, with `ERROR`
//! reachable from `STARTING`, `STOPPING` or `SETTLING`.

use chrono::{DateTime, Utc};
use gmp_common::events::{SessionFaultKind, SessionState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the remote sensor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCommand {
    Start,
    Stop,
}

impl DeviceCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCommand::Start => "start",
            DeviceCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure recorded on a session that ended in ERROR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFault {
    pub kind: SessionFaultKind,
    /// Device command that failed; `None` for settle-fetch failures
    pub command: Option<DeviceCommand>,
    pub message: String,
}

impl SessionFault {
    /// "could not stop" is a stop-command fault of any kind
    pub fn is_stop_failure(&self) -> bool {
        self.command == Some(DeviceCommand::Stop)
    }
}

/// State transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub patient_id: i64,
    pub sequence: u64,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Current session of one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSession {
    pub patient_id: i64,
    /// Per-patient monotonic session number; 0 means "no session yet"
    pub sequence: u64,
    pub state: SessionState,
    /// When the start request was accepted
    pub created_at: DateTime<Utc>,
    /// Start acknowledgement time
    pub started_at: Option<DateTime<Utc>>,
    /// Stop acknowledgement time
    pub stopped_at: Option<DateTime<Utc>>,
    pub fault: Option<SessionFault>,
}

impl MeasurementSession {
    /// Placeholder for a patient that never had a session
    pub fn idle(patient_id: i64) -> Self {
        Self {
            patient_id,
            sequence: 0,
            state: SessionState::Idle,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            fault: None,
        }
    }

    /// Fresh session about to issue its start command
    pub fn new(patient_id: i64, sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::idle(patient_id)
        }
    }

    /// Move to `new_state`, returning the transition record
    pub fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            patient_id: self.patient_id,
            sequence: self.sequence,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        transition
    }

    /// Enter ERROR with a typed fault
    pub fn fail(&mut self, fault: SessionFault) -> StateTransition {
        self.fault = Some(fault);
        self.transition_to(SessionState::Error)
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Wall-clock running time for display
    ///
    /// Measured from the start acknowledgement to the stop acknowledgement,
    /// or to `now` while still RUNNING. Not used for any decision.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let end = match (self.stopped_at, self.state) {
            (Some(stopped), _) => stopped,
            (None, SessionState::Running) => now,
            (None, _) => return None,
        };
        Some((end - started).num_seconds().max(0))
    }
}
