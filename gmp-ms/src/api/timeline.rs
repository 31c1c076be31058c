//! Aligned timeline API handler

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use gmp_common::events::SessionState;
use serde::{Deserialize, Serialize};

use super::require_patient;
use crate::error::{ApiError, ApiResult};
use crate::timeline::{AlignedTimeline, ChannelGrouping};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    /// speed | pressure | foot_lift | all (default)
    pub grouping: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub patient_id: i64,
    /// SETTLING means the pre-stop snapshot is being served
    pub session_state: SessionState,
    #[serde(flatten)]
    pub timeline: AlignedTimeline,
}

/// GET /api/patients/:patient_id/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<TimelineResponse>> {
    let grouping = match query.grouping.as_deref() {
        None | Some("") => ChannelGrouping::default(),
        Some(raw) => ChannelGrouping::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown grouping '{}' (expected speed, pressure, foot_lift or all)",
                raw
            ))
        })?,
    };

    require_patient(&state, patient_id).await?;

    let session_state = state.sessions.state(patient_id).await.state;
    let timeline = state.sessions.aligned_timeline(patient_id, grouping).await?;

    Ok(Json(TimelineResponse {
        patient_id,
        session_state,
        timeline,
    }))
}

/// Build timeline routes
pub fn timeline_routes() -> Router<AppState> {
    Router::new().route("/api/patients/:patient_id/timeline", get(get_timeline))
}
