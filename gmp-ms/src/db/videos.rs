//! Video asset registry (append-only)

use super::stored_timestamp;
use crate::models::{NewVideoAsset, VideoAsset};
use chrono::{DateTime, Duration, Utc};
use gmp_common::time::{now, to_storage};
use gmp_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SELECT_ASSET: &str = r#"
    SELECT id, patient_id, measurement_id, captured_at, locator, created_at
    FROM video_assets
"#;

fn asset_from_row(row: &SqliteRow) -> Result<VideoAsset> {
    let captured_at: String = row.get("captured_at");
    let created_at: String = row.get("created_at");
    Ok(VideoAsset {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        measurement_id: row.get("measurement_id"),
        captured_at: stored_timestamp(&captured_at)?,
        locator: row.get("locator"),
        created_at: stored_timestamp(&created_at)?,
    })
}

pub async fn insert_asset(
    pool: &SqlitePool,
    patient_id: i64,
    asset: &NewVideoAsset,
) -> Result<VideoAsset> {
    let done = sqlx::query(
        r#"
        INSERT INTO video_assets (patient_id, measurement_id, captured_at, locator, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(patient_id)
    .bind(&asset.measurement_id)
    .bind(to_storage(&asset.captured_at))
    .bind(&asset.locator)
    .bind(to_storage(&now()))
    .execute(pool)
    .await?;

    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ASSET))
        .bind(done.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    asset_from_row(&row)
}

/// Most recently registered asset carrying `measurement_id`
pub async fn find_by_measurement_id(
    pool: &SqlitePool,
    measurement_id: &str,
) -> Result<Option<VideoAsset>> {
    let row = sqlx::query(&format!(
        "{} WHERE measurement_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        SELECT_ASSET
    ))
    .bind(measurement_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Assets of a patient captured within `window_seconds` of `at`
///
/// The range is padded by one second on each side; callers apply the exact
/// window themselves.
pub async fn find_near_time(
    pool: &SqlitePool,
    patient_id: i64,
    at: DateTime<Utc>,
    window_seconds: u32,
) -> Result<Vec<VideoAsset>> {
    let span = Duration::seconds(i64::from(window_seconds) + 1);

    let rows = sqlx::query(&format!(
        "{} WHERE patient_id = ? AND captured_at BETWEEN ? AND ? ORDER BY captured_at",
        SELECT_ASSET
    ))
    .bind(patient_id)
    .bind(to_storage(&(at - span)))
    .bind(to_storage(&(at + span)))
    .fetch_all(pool)
    .await?;

    rows.iter().map(asset_from_row).collect()
}
