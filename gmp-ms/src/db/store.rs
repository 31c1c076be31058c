//! [`MeasurementStore`] backed by the local SQLite database

use super::{measurements, videos};
use crate::gateway::{GatewayError, MeasurementStore};
use crate::models::{ChannelSet, VideoAsset};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

fn lookup_failed(err: gmp_common::Error) -> GatewayError {
    match err {
        gmp_common::Error::Database(e) => e.into(),
        other => GatewayError::Decode(other.to_string()),
    }
}

#[derive(Clone)]
pub struct SqliteMeasurementStore {
    pool: SqlitePool,
}

impl SqliteMeasurementStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MeasurementStore for SqliteMeasurementStore {
    async fn fetch_channels(&self, patient_id: i64) -> Result<ChannelSet, GatewayError> {
        measurements::fetch_channels(&self.pool, patient_id)
            .await
            .map_err(lookup_failed)
    }

    async fn fetch_asset_by_measurement_id(
        &self,
        measurement_id: &str,
    ) -> Result<Option<VideoAsset>, GatewayError> {
        videos::find_by_measurement_id(&self.pool, measurement_id)
            .await
            .map_err(lookup_failed)
    }

    async fn fetch_assets_near_time(
        &self,
        patient_id: i64,
        at: DateTime<Utc>,
        window_seconds: u32,
    ) -> Result<Vec<VideoAsset>, GatewayError> {
        videos::find_near_time(&self.pool, patient_id, at, window_seconds)
            .await
            .map_err(lookup_failed)
    }
}
