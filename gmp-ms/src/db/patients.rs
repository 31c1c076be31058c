//! Patient roster storage

use super::stored_timestamp;
use crate::models::{NewPatient, Patient, PatientUpdate};
use gmp_common::time::{now, to_storage};
use gmp_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub(super) const SELECT_PATIENT: &str = r#"
    SELECT id, patient_id, first_name, last_name, age, condition, created_at, updated_at
    FROM patients
"#;

pub(super) fn patient_from_row(row: &SqliteRow) -> Result<Patient> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(Patient {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        age: row.get("age"),
        condition: row.get("condition"),
        created_at: stored_timestamp(&created_at)?,
        updated_at: stored_timestamp(&updated_at)?,
    })
}

/// Insert a patient; `None` when the external `patient_id` is already taken
pub async fn insert_patient(pool: &SqlitePool, patient: &NewPatient) -> Result<Option<Patient>> {
    let ts = to_storage(&now());

    let result = sqlx::query(
        r#"
        INSERT INTO patients (patient_id, first_name, last_name, age, condition, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(patient.patient_id.trim())
    .bind(&patient.first_name)
    .bind(&patient.last_name)
    .bind(patient.age)
    .bind(&patient.condition)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await;

    match result {
        Ok(done) => get_patient(pool, done.last_insert_rowid()).await,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_patient(pool: &SqlitePool, id: i64) -> Result<Option<Patient>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PATIENT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(patient_from_row).transpose()
}

pub async fn patient_exists(pool: &SqlitePool, id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Apply the present fields of `update` and bump `updated_at`
pub async fn update_patient(
    pool: &SqlitePool,
    id: i64,
    update: &PatientUpdate,
) -> Result<Option<Patient>> {
    let result = sqlx::query(
        r#"
        UPDATE patients SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            age = COALESCE(?, age),
            condition = COALESCE(?, condition),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(update.age)
    .bind(&update.condition)
    .bind(to_storage(&now()))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_patient(pool, id).await
}
