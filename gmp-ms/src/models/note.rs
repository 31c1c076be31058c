//! Therapist notes (append-only per patient)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable note attached to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Row id; doubles as creation order for tie-breaks
    pub id: i64,
    /// Internal id of the patient
    pub patient_id: i64,
    /// Author reference
    pub therapist_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// POST /api/patients/:id/notes body
#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    pub therapist_id: String,
    pub body: String,
}
