//! Video evidence API handlers
//!
//! GET /api/videos/resolve, POST /api/patients/:patient_id/videos

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use gmp_common::time::parse_rfc3339;
use serde::{Deserialize, Serialize};

use super::require_patient;
use crate::db::videos;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewVideoAsset, VideoAsset};
use crate::video::{ResolvedVideo, VideoQuery, VideoResolution};
use crate::AppState;

/// GET /api/videos/resolve query
#[derive(Debug, Deserialize)]
pub struct ResolveVideoQuery {
    pub measurement_id: Option<String>,
    pub patient_id: Option<i64>,
    /// RFC 3339 timestamp of the timeline point
    pub at: Option<String>,
    pub window_seconds: Option<i64>,
}

/// "Nothing recorded" is a normal answer, not an error status
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveVideoResponse {
    Found { video: ResolvedVideo },
    NoMatchingAsset,
}

impl From<VideoResolution> for ResolveVideoResponse {
    fn from(resolution: VideoResolution) -> Self {
        match resolution {
            VideoResolution::Found(video) => ResolveVideoResponse::Found { video },
            VideoResolution::NoMatchingAsset => ResolveVideoResponse::NoMatchingAsset,
        }
    }
}

/// GET /api/videos/resolve
///
/// Lookup failures in the store answer 502 so callers can tell "could not
/// check" from "nothing recorded".
pub async fn resolve_video(
    State(state): State<AppState>,
    Query(query): Query<ResolveVideoQuery>,
) -> ApiResult<Json<ResolveVideoResponse>> {
    let at = query
        .at
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_rfc3339)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let window_seconds = match query.window_seconds {
        Some(w) if w < 0 => {
            return Err(ApiError::BadRequest(
                "window_seconds must not be negative".to_string(),
            ))
        }
        Some(w) => Some(u32::try_from(w).unwrap_or(u32::MAX)),
        None => None,
    };

    let video_query = VideoQuery {
        measurement_id: query.measurement_id.filter(|s| !s.trim().is_empty()),
        patient_id: query.patient_id,
        at,
        window_seconds,
    };

    let resolution = state.correlator.resolve(&video_query).await?;
    Ok(Json(resolution.into()))
}

/// POST /api/patients/:patient_id/videos
pub async fn register_video(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(request): Json<NewVideoAsset>,
) -> ApiResult<(StatusCode, Json<VideoAsset>)> {
    if request.locator.trim().is_empty() {
        return Err(ApiError::BadRequest("locator must not be empty".to_string()));
    }
    require_patient(&state, patient_id).await?;

    let asset = videos::insert_asset(&state.db, patient_id, &request).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// Build video routes
pub fn video_routes() -> Router<AppState> {
    Router::new()
        .route("/api/videos/resolve", get(resolve_video))
        .route("/api/patients/:patient_id/videos", post(register_video))
}
