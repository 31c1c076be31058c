//! Session history recorder
//!
//! Subscribes to the event bus and mirrors lifecycle events into the
//! `measurement_sessions` table. Runs for the lifetime of the process.

use crate::db::sessions;
use gmp_common::events::{EventBus, GmpEvent};
use gmp_common::Result;
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Persist one event; events without history meaning are ignored
pub async fn record_event(pool: &SqlitePool, event: &GmpEvent) -> Result<()> {
    match event {
        GmpEvent::SessionStateChanged {
            patient_id,
            sequence,
            new_state,
            timestamp,
            ..
        } => sessions::record_transition(pool, *patient_id, *sequence, *new_state, *timestamp).await,
        GmpEvent::SessionFailed {
            patient_id,
            sequence,
            kind,
            message,
            ..
        } => sessions::record_fault(pool, *patient_id, *sequence, *kind, message).await,
        GmpEvent::TimelineReady { .. } => Ok(()),
    }
}

/// Spawn the recorder task
///
/// The subscription is taken before returning, so no event emitted after
/// this call is missed.
pub fn spawn_session_recorder(pool: SqlitePool, event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = record_event(&pool, &event).await {
                        warn!(
                            patient_id = event.patient_id(),
                            event = event.event_type(),
                            "Failed to record session event: {}",
                            e
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session recorder lagged; {} events not recorded", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Event bus closed; session recorder exiting");
                    break;
                }
            }
        }
    })
}
