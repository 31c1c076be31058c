//! Patient notes API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::paging::PageParams;
use super::require_patient;
use crate::db::{notes, NoteLog};
use crate::error::{ApiError, ApiResult};
use crate::models::{NewNote, Note};
use crate::query::{Page, PageRequest, SortDir};
use crate::AppState;

/// GET /api/patients/:patient_id/notes
///
/// Without any of `page`, `page_size`, `sort_by`, `sort_dir` the legacy bare
/// listing is served, wrapped as one full page so the response shape never
/// changes.
pub async fn list_notes(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<Note>>> {
    require_patient(&state, patient_id).await?;

    let page = if params.is_unpaged() {
        let request = PageRequest::new(0, state.query_engine.max_page_size());
        let source = NoteLog::legacy(state.db.clone(), patient_id);
        state.query_engine.page(&source, &request).await?
    } else {
        let request = params.to_request("created_at", SortDir::Desc)?;
        let source = NoteLog::new(state.db.clone(), patient_id);
        state.query_engine.page(&source, &request).await?
    };

    Ok(Json(page))
}

/// POST /api/patients/:patient_id/notes
pub async fn add_note(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(request): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    if request.body.trim().is_empty() {
        return Err(ApiError::BadRequest("Note body must not be empty".to_string()));
    }
    if request.therapist_id.trim().is_empty() {
        return Err(ApiError::BadRequest("therapist_id must not be empty".to_string()));
    }
    require_patient(&state, patient_id).await?;

    let note = notes::insert_note(&state.db, patient_id, &request).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// Build note routes
pub fn note_routes() -> Router<AppState> {
    Router::new().route(
        "/api/patients/:patient_id/notes",
        get(list_notes).post(add_note),
    )
}
