//! Sensor ingestion and manual speed entry

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::require_patient;
use crate::db::measurements::{self, SpeedEntry, SOURCE_DEVICE, SOURCE_MANUAL};
use crate::error::{ApiError, ApiResult};
use crate::models::{ChannelId, NewSensorPoint};
use crate::AppState;

/// POST /api/patients/:patient_id/measurements body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub points: Vec<NewSensorPoint>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub stored: usize,
}

/// POST /api/patients/:patient_id/speed body
#[derive(Debug, Deserialize)]
pub struct ManualSpeedRequest {
    pub speed_kmh: f64,
    /// Defaults to now
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
}

/// POST /api/patients/:patient_id/measurements
pub async fn ingest_measurements(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    if request.points.is_empty() {
        return Err(ApiError::BadRequest("points must not be empty".to_string()));
    }
    if let Some(bad) = request.points.iter().find(|p| !p.value.is_finite()) {
        return Err(ApiError::BadRequest(format!(
            "Non-finite value on channel {}",
            bad.channel
        )));
    }
    require_patient(&state, patient_id).await?;

    let stored =
        measurements::insert_points(&state.db, patient_id, &request.points, SOURCE_DEVICE).await?;
    debug!(patient_id, stored, "Ingested sensor points");

    Ok((StatusCode::CREATED, Json(IngestResponse { stored })))
}

/// POST /api/patients/:patient_id/speed
pub async fn record_speed(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(request): Json<ManualSpeedRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    if !request.speed_kmh.is_finite() || request.speed_kmh < 0.0 {
        return Err(ApiError::BadRequest(
            "speed_kmh must be a non-negative number".to_string(),
        ));
    }
    require_patient(&state, patient_id).await?;

    let point = NewSensorPoint {
        channel: ChannelId::Speed,
        value: request.speed_kmh,
        measured_at: request.measured_at.unwrap_or_else(gmp_common::time::now),
        measurement_id: None,
    };
    let stored = measurements::insert_points(&state.db, patient_id, &[point], SOURCE_MANUAL).await?;

    Ok((StatusCode::CREATED, Json(IngestResponse { stored })))
}

/// GET /api/patients/:patient_id/speed-history
///
/// Newest first; includes device and manual entries.
pub async fn speed_history(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Vec<SpeedEntry>>> {
    require_patient(&state, patient_id).await?;
    let history = measurements::speed_history(&state.db, patient_id).await?;
    Ok(Json(history))
}

/// Build measurement routes
pub fn measurement_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/patients/:patient_id/measurements",
            post(ingest_measurements),
        )
        .route("/api/patients/:patient_id/speed", post(record_speed))
        .route("/api/patients/:patient_id/speed-history", get(speed_history))
}
