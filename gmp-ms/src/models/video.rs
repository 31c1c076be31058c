//! Video evidence assets recorded alongside measurement sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded clip; read-only to the correlator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: i64,
    pub patient_id: i64,
    /// Measurement the clip was captured for, when the device tagged it
    pub measurement_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    /// Playable locator (URL or path)
    pub locator: String,
    pub created_at: DateTime<Utc>,
}

/// POST /api/patients/:id/videos body
#[derive(Debug, Clone, Deserialize)]
pub struct NewVideoAsset {
    #[serde(default)]
    pub measurement_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub locator: String,
}
