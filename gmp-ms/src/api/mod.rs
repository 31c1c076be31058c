//! HTTP API handlers for gmp-ms

pub mod health;
pub mod measurements;
pub mod notes;
pub mod paging;
pub mod patients;
pub mod sessions;
pub mod sse;
pub mod timeline;
pub mod videos;

pub use health::health_routes;
pub use measurements::measurement_routes;
pub use notes::note_routes;
pub use patients::patient_routes;
pub use sessions::session_routes;
pub use sse::event_stream;
pub use timeline::timeline_routes;
pub use videos::video_routes;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// 404 unless the patient exists
pub(crate) async fn require_patient(state: &AppState, patient_id: i64) -> ApiResult<()> {
    if crate::db::patients::patient_exists(&state.db, patient_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("Patient {}", patient_id)))
    }
}
