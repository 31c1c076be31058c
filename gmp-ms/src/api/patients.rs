//! Patient roster API handlers
//!
//! GET/POST /api/patients, GET/PUT /api/patients/:patient_id

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::paging::PageParams;
use crate::db::{patients, PatientRoster};
use crate::error::{ApiError, ApiResult};
use crate::models::{NewPatient, Patient, PatientUpdate};
use crate::query::{Filter, Page, SortDir};
use crate::AppState;

/// GET /api/patients query
#[derive(Debug, Deserialize)]
pub struct ListPatientsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    /// Full name contains (case-insensitive)
    pub q_name: Option<String>,
    /// External patient id contains
    pub q_id: Option<String>,
    /// External patient id, exact
    pub patient_id: Option<String>,
}

impl ListPatientsQuery {
    fn paging(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
            sort_by: self.sort_by.clone(),
            sort_dir: self.sort_dir.clone(),
        }
    }
}

/// GET /api/patients
///
/// Defaults to most recently updated first.
pub async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<ListPatientsQuery>,
) -> ApiResult<Json<Page<Patient>>> {
    let mut request = query.paging().to_request("updated_at", SortDir::Desc)?;
    if let Some(name) = &query.q_name {
        request = request.with_filter(Filter::contains("name", name.as_str()));
    }
    if let Some(id) = &query.q_id {
        request = request.with_filter(Filter::contains("patient_id", id.as_str()));
    }
    if let Some(id) = &query.patient_id {
        request = request.with_filter(Filter::equals("patient_id", id.as_str()));
    }

    let source = PatientRoster::new(state.db.clone());
    let page = state.query_engine.page(&source, &request).await?;
    Ok(Json(page))
}

/// POST /api/patients
pub async fn create_patient(
    State(state): State<AppState>,
    Json(request): Json<NewPatient>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    if request.patient_id.trim().is_empty() {
        return Err(ApiError::BadRequest("patient_id must not be empty".to_string()));
    }

    match patients::insert_patient(&state.db, &request).await? {
        Some(patient) => Ok((StatusCode::CREATED, Json(patient))),
        None => Err(ApiError::Conflict(format!(
            "Patient id '{}' already exists",
            request.patient_id.trim()
        ))),
    }
}

/// GET /api/patients/:patient_id
pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Patient>> {
    patients::get_patient(&state.db, patient_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Patient {}", patient_id)))
}

/// PUT /api/patients/:patient_id
pub async fn update_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(update): Json<PatientUpdate>,
) -> ApiResult<Json<Patient>> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    patients::update_patient(&state.db, patient_id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Patient {}", patient_id)))
}

/// Build patient routes
pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/api/patients", get(list_patients).post(create_patient))
        .route(
            "/api/patients/:patient_id",
            get(get_patient).put(update_patient),
        )
}
