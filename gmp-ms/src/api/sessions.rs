//! Session lifecycle API handlers
//!
//! POST /api/sessions/:patient_id/start, POST /api/sessions/:patient_id/stop,
//! GET/DELETE /api/sessions/:patient_id, GET /api/sessions/:patient_id/history
//!
//! Device failures do not produce error responses: the returned session is
//! in ERROR and carries the typed fault.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::require_patient;
use crate::db::sessions::{self, SessionRecord};
use crate::error::{ApiError, ApiResult};
use crate::models::MeasurementSession;
use crate::AppState;

/// POST /api/sessions/:patient_id/stop request
#[derive(Debug, Default, Deserialize)]
pub struct StopSessionRequest {
    /// Skip the settle-fetch and user-facing notification
    #[serde(default)]
    pub silent: bool,
}

/// Session plus derived display values
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: MeasurementSession,
    /// Wall-clock running time; display only
    pub elapsed_seconds: Option<i64>,
}

impl From<MeasurementSession> for SessionResponse {
    fn from(session: MeasurementSession) -> Self {
        let elapsed_seconds = session.elapsed_seconds(chrono::Utc::now());
        Self {
            session,
            elapsed_seconds,
        }
    }
}

/// DELETE /api/sessions/:patient_id response
#[derive(Debug, Serialize)]
pub struct ClearSessionResponse {
    pub patient_id: i64,
    pub cleared: bool,
}

/// POST /api/sessions/:patient_id/start
pub async fn start_session(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    require_patient(&state, patient_id).await?;

    let session = state.sessions.start(patient_id).await;
    if let Some(fault) = &session.fault {
        state
            .note_error(format!("patient {}: {}", patient_id, fault.message))
            .await;
    }
    Ok(Json(session.into()))
}

/// POST /api/sessions/:patient_id/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    request: Option<Json<StopSessionRequest>>,
) -> ApiResult<Json<SessionResponse>> {
    require_patient(&state, patient_id).await?;

    let silent = request.map(|Json(r)| r.silent).unwrap_or(false);
    let session = state.sessions.stop(patient_id, silent).await;
    if let Some(fault) = session.fault.as_ref().filter(|f| f.is_stop_failure()) {
        state
            .note_error(format!("patient {}: {}", patient_id, fault.message))
            .await;
    }
    Ok(Json(session.into()))
}

/// GET /api/sessions/:patient_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    Ok(Json(state.sessions.state(patient_id).await.into()))
}

/// DELETE /api/sessions/:patient_id
///
/// Drops the patient's registry slot; refused while a session is active.
pub async fn clear_session(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<ClearSessionResponse>> {
    match state.sessions.clear(patient_id).await {
        Ok(cleared) => Ok(Json(ClearSessionResponse {
            patient_id,
            cleared,
        })),
        Err(active) => Err(ApiError::Conflict(format!(
            "Session {} for patient {} is {}",
            active.sequence,
            patient_id,
            active.state.as_str()
        ))),
    }
}

/// GET /api/sessions/:patient_id/history
pub async fn session_history(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Vec<SessionRecord>>> {
    Ok(Json(sessions::list_for_patient(&state.db, patient_id).await?))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/sessions/:patient_id",
            get(get_session).delete(clear_session),
        )
        .route("/api/sessions/:patient_id/start", post(start_session))
        .route("/api/sessions/:patient_id/stop", post(stop_session))
        .route("/api/sessions/:patient_id/history", get(session_history))
}
