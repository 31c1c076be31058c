//! Measurement session state types shared by events and the session service

use serde::{Deserialize, Serialize};

/// Lifecycle state of one measurement session
///
/// `IDLE → STARTING → RUNNING → STOPPING → SETTLING → READY`, with `ERROR`
/// reachable from `STARTING`, `STOPPING` or `SETTLING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// No device run in progress (also the state after a silent stop)
    Idle,
    /// Start command sent, awaiting acknowledgement
    Starting,
    /// Device acknowledged start and is sampling
    Running,
    /// Stop command acknowledged
    Stopping,
    /// Waiting out the device flush before fetching final channels
    Settling,
    /// Finalized channels fetched
    Ready,
    /// Device or fetch failure
    Error,
}

impl SessionState {
    /// States that occupy the patient's single active-session slot
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Starting
                | SessionState::Running
                | SessionState::Stopping
                | SessionState::Settling
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Starting => "STARTING",
            SessionState::Running => "RUNNING",
            SessionState::Stopping => "STOPPING",
            SessionState::Settling => "SETTLING",
            SessionState::Ready => "READY",
            SessionState::Error => "ERROR",
        }
    }

    /// Inverse of [`SessionState::as_str`]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IDLE" => Some(SessionState::Idle),
            "STARTING" => Some(SessionState::Starting),
            "RUNNING" => Some(SessionState::Running),
            "STOPPING" => Some(SessionState::Stopping),
            "SETTLING" => Some(SessionState::Settling),
            "READY" => Some(SessionState::Ready),
            "ERROR" => Some(SessionState::Error),
            _ => None,
        }
    }
}

/// Why a session ended in ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFaultKind {
    /// Command transport failed or timed out
    DeviceUnreachable,
    /// Device answered but refused the command
    CommandRejected,
    /// Post-stop channel fetch failed
    SettleFetchFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_in_flight_states_are_active() {
        let all = [
            SessionState::Idle,
            SessionState::Starting,
            SessionState::Running,
            SessionState::Stopping,
            SessionState::Settling,
            SessionState::Ready,
            SessionState::Error,
        ];
        for state in all {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
        let active: Vec<SessionState> = all.into_iter().filter(|s| s.is_active()).collect();
        assert_eq!(
            active,
            vec![
                SessionState::Starting,
                SessionState::Running,
                SessionState::Stopping,
                SessionState::Settling,
            ]
        );
    }

    #[test]
    fn test_serde_uses_uppercase_names() {
        let json = serde_json::to_string(&SessionState::Settling).unwrap();
        assert_eq!(json, "\"SETTLING\"");
    }
}
