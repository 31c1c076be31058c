//! Measurement session history
//!
//! Written by the session recorder from bus events; the live state is owned
//! by the in-memory registry. On startup the table seeds per-patient
//! sequence counters and loses any session a previous process left mid-flight.

use chrono::{DateTime, Utc};
use gmp_common::events::{SessionFaultKind, SessionState};
use gmp_common::time::{now, to_storage};
use gmp_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

const INTERRUPTED_MESSAGE: &str = "Service restarted while session was in flight";

/// One persisted history row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub patient_id: i64,
    pub sequence: u64,
    pub state: SessionState,
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
    pub fault_kind: Option<String>,
    pub fault_message: Option<String>,
}

/// Upsert the session row for a transition into `new_state`
pub async fn record_transition(
    pool: &SqlitePool,
    patient_id: i64,
    sequence: u64,
    new_state: SessionState,
    at: DateTime<Utc>,
) -> Result<()> {
    let ts = to_storage(&at);
    let started_at = (new_state == SessionState::Running).then(|| ts.clone());
    let stopped_at = (new_state == SessionState::Stopping).then(|| ts.clone());

    sqlx::query(
        r#"
        INSERT INTO measurement_sessions (
            patient_id, sequence, state, started_at, stopped_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(patient_id, sequence) DO UPDATE SET
            state = excluded.state,
            started_at = COALESCE(measurement_sessions.started_at, excluded.started_at),
            stopped_at = COALESCE(measurement_sessions.stopped_at, excluded.stopped_at),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(patient_id)
    .bind(sequence as i64)
    .bind(new_state.as_str())
    .bind(started_at)
    .bind(stopped_at)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await?;

    Ok(())
}

/// Attach a fault to a session row
pub async fn record_fault(
    pool: &SqlitePool,
    patient_id: i64,
    sequence: u64,
    kind: SessionFaultKind,
    message: &str,
) -> Result<()> {
    let kind = serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string));

    sqlx::query(
        r#"
        UPDATE measurement_sessions
        SET fault_kind = ?, fault_message = ?, updated_at = ?
        WHERE patient_id = ? AND sequence = ?
        "#,
    )
    .bind(kind)
    .bind(message)
    .bind(to_storage(&now()))
    .bind(patient_id)
    .bind(sequence as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark sessions left in a non-terminal state as ERROR; returns the count
///
/// No fault kind is recorded: the process died, the device was never asked.
pub async fn recover_interrupted(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE measurement_sessions
        SET state = ?, fault_kind = NULL, fault_message = ?, updated_at = ?
        WHERE state IN (?, ?, ?, ?)
        "#,
    )
    .bind(SessionState::Error.as_str())
    .bind(INTERRUPTED_MESSAGE)
    .bind(to_storage(&now()))
    .bind(SessionState::Starting.as_str())
    .bind(SessionState::Running.as_str())
    .bind(SessionState::Stopping.as_str())
    .bind(SessionState::Settling.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Highest recorded sequence per patient
pub async fn latest_sequences(pool: &SqlitePool) -> Result<HashMap<i64, u64>> {
    let rows = sqlx::query(
        "SELECT patient_id, MAX(sequence) AS sequence FROM measurement_sessions GROUP BY patient_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let sequence: i64 = row.get("sequence");
            (row.get::<i64, _>("patient_id"), sequence.max(0) as u64)
        })
        .collect())
}

/// History of one patient, newest first
pub async fn list_for_patient(pool: &SqlitePool, patient_id: i64) -> Result<Vec<SessionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT patient_id, sequence, state, started_at, stopped_at, fault_kind, fault_message
        FROM measurement_sessions
        WHERE patient_id = ?
        ORDER BY sequence DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let state: String = row.get("state");
            let sequence: i64 = row.get("sequence");
            SessionRecord {
                patient_id: row.get("patient_id"),
                sequence: sequence.max(0) as u64,
                state: SessionState::parse(&state).unwrap_or(SessionState::Error),
                started_at: row.get("started_at"),
                stopped_at: row.get("stopped_at"),
                fault_kind: row.get("fault_kind"),
                fault_message: row.get("fault_message"),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn test_transitions_upsert_one_row() {
        let pool = init_memory_pool().await.unwrap();
        for state in [
            SessionState::Starting,
            SessionState::Running,
            SessionState::Stopping,
            SessionState::Settling,
            SessionState::Ready,
        ] {
            record_transition(&pool, 3, 1, state, now()).await.unwrap();
        }

        let history = list_for_patient(&pool, 3).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, SessionState::Ready);
        assert!(history[0].started_at.is_some());
        assert!(history[0].stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_recovery_and_sequence_seeding() {
        let pool = init_memory_pool().await.unwrap();
        record_transition(&pool, 1, 1, SessionState::Ready, now()).await.unwrap();
        record_transition(&pool, 1, 2, SessionState::Running, now()).await.unwrap();
        record_transition(&pool, 2, 5, SessionState::Settling, now()).await.unwrap();

        assert_eq!(recover_interrupted(&pool).await.unwrap(), 2);

        let history = list_for_patient(&pool, 1).await.unwrap();
        assert_eq!(history[0].sequence, 2);
        assert_eq!(history[0].state, SessionState::Error);
        assert_eq!(history[0].fault_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(history[0].fault_kind, None);
        assert_eq!(history[1].state, SessionState::Ready);

        let seeds = latest_sequences(&pool).await.unwrap();
        assert_eq!(seeds[&1], 2);
        assert_eq!(seeds[&2], 5);
    }

    #[tokio::test]
    async fn test_fault_is_attached() {
        let pool = init_memory_pool().await.unwrap();
        record_transition(&pool, 4, 1, SessionState::Error, now()).await.unwrap();
        record_fault(&pool, 4, 1, SessionFaultKind::CommandRejected, "busy")
            .await
            .unwrap();

        let history = list_for_patient(&pool, 4).await.unwrap();
        assert_eq!(history[0].fault_kind.as_deref(), Some("command_rejected"));
        assert_eq!(history[0].fault_message.as_deref(), Some("busy"));
    }
}
