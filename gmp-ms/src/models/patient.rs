//! Patient roster records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A patient on the clinical roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Stable internal id (row id)
    pub id: i64,
    /// External identifier entered by the therapist; unique
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<i64>,
    pub condition: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// POST /api/patients body
#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// PUT /api/patients/:id body; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub condition: Option<String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.age.is_none()
            && self.condition.is_none()
    }
}
