//! Sensor sample storage (append-only)

use super::stored_timestamp;
use crate::models::{ChannelId, ChannelSet, NewSensorPoint, SensorPoint};
use chrono::{DateTime, Utc};
use gmp_common::time::{now, to_storage};
use gmp_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Samples pushed by the remote controller
pub const SOURCE_DEVICE: &str = "device";
/// Speed entered by a therapist
pub const SOURCE_MANUAL: &str = "manual";

/// One row of the speed history listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedEntry {
    pub id: i64,
    pub speed_kmh: f64,
    pub measured_at: DateTime<Utc>,
    pub source: String,
}

fn point_from_row(row: &SqliteRow) -> Result<SensorPoint> {
    let channel: String = row.get("channel");
    let measured_at: String = row.get("measured_at");
    Ok(SensorPoint {
        channel: ChannelId::parse(&channel)
            .ok_or_else(|| Error::CorruptRecord(format!("unknown channel '{}'", channel)))?,
        value: row.get("value"),
        measured_at: stored_timestamp(&measured_at)?,
        measurement_id: row.get("measurement_id"),
    })
}

/// Append a batch of samples in one transaction; returns the number stored
pub async fn insert_points(
    pool: &SqlitePool,
    patient_id: i64,
    points: &[NewSensorPoint],
    source: &str,
) -> Result<usize> {
    let created_at = to_storage(&now());
    let mut tx = pool.begin().await?;

    for point in points {
        sqlx::query(
            r#"
            INSERT INTO sensor_points (patient_id, channel, value, measured_at, measurement_id, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patient_id)
        .bind(point.channel.as_str())
        .bind(point.value)
        .bind(to_storage(&point.measured_at))
        .bind(&point.measurement_id)
        .bind(source)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(points.len())
}

/// All channels of a patient in storage order (not re-sorted)
pub async fn fetch_channels(pool: &SqlitePool, patient_id: i64) -> Result<ChannelSet> {
    let rows = sqlx::query(
        r#"
        SELECT channel, value, measured_at, measurement_id
        FROM sensor_points
        WHERE patient_id = ?
        ORDER BY id
        "#,
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await?;

    let points = rows.iter().map(point_from_row).collect::<Result<Vec<_>>>()?;
    Ok(ChannelSet::from_points(points))
}

/// Speed channel entries, newest first
pub async fn speed_history(pool: &SqlitePool, patient_id: i64) -> Result<Vec<SpeedEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, value, measured_at, source
        FROM sensor_points
        WHERE patient_id = ? AND channel = ?
        ORDER BY measured_at DESC, id DESC
        "#,
    )
    .bind(patient_id)
    .bind(ChannelId::Speed.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<SpeedEntry> {
            let measured_at: String = row.get("measured_at");
            Ok(SpeedEntry {
                id: row.get("id"),
                speed_kmh: row.get("value"),
                measured_at: stored_timestamp(&measured_at)?,
                source: row.get("source"),
            })
        })
        .collect()
}
