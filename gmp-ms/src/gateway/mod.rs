//! Acquisition Gateway contracts
//!
//! The remote sensor controller and the persisted measurement store are
//! external collaborators. The core only talks to them through these traits,
//! which keeps the Session Controller and Video Correlator testable against
//! scripted fakes.

mod device;

pub use device::HttpDeviceGateway;

use crate::models::{ChannelSet, DeviceCommand, VideoAsset};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Collaborator boundary errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Transport failure or timeout
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// Collaborator answered with a refusal
    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response could not be interpreted
    #[error("Gateway response decode failed: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                GatewayError::Decode(err.to_string())
            }
            other => GatewayError::Unavailable(other.to_string()),
        }
    }
}

/// Remote controller command endpoint
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Send `command` for `patient_id`; `Ok` is the device acknowledgement
    ///
    /// Duplicate stops are idempotent on the device side.
    async fn send_command(&self, command: DeviceCommand, patient_id: i64)
        -> Result<(), GatewayError>;
}

/// Persisted measurement store (read side used by the core)
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Every channel for the patient, in storage order
    async fn fetch_channels(&self, patient_id: i64) -> Result<ChannelSet, GatewayError>;

    async fn fetch_asset_by_measurement_id(
        &self,
        measurement_id: &str,
    ) -> Result<Option<VideoAsset>, GatewayError>;

    /// Candidate assets of `patient_id` captured within `window_seconds` of `at`
    async fn fetch_assets_near_time(
        &self,
        patient_id: i64,
        at: DateTime<Utc>,
        window_seconds: u32,
    ) -> Result<Vec<VideoAsset>, GatewayError>;
}
