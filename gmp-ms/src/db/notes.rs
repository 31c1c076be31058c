//! Append-only therapist notes

use super::stored_timestamp;
use crate::models::{NewNote, Note};
use gmp_common::time::{now, to_storage};
use gmp_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub(super) const SELECT_NOTE: &str = r#"
    SELECT id, patient_id, therapist_id, body, created_at
    FROM notes
"#;

pub(super) fn note_from_row(row: &SqliteRow) -> Result<Note> {
    let created_at: String = row.get("created_at");
    Ok(Note {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        therapist_id: row.get("therapist_id"),
        body: row.get("body"),
        created_at: stored_timestamp(&created_at)?,
    })
}

pub async fn insert_note(pool: &SqlitePool, patient_id: i64, note: &NewNote) -> Result<Note> {
    let created_at = now();

    let done = sqlx::query(
        "INSERT INTO notes (patient_id, therapist_id, body, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(patient_id)
    .bind(&note.therapist_id)
    .bind(&note.body)
    .bind(to_storage(&created_at))
    .execute(pool)
    .await?;

    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_NOTE))
        .bind(done.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    note_from_row(&row)
}

/// Every note of a patient, newest first
pub async fn list_notes(pool: &SqlitePool, patient_id: i64) -> Result<Vec<Note>> {
    let rows = sqlx::query(&format!(
        "{} WHERE patient_id = ? ORDER BY created_at DESC, id DESC",
        SELECT_NOTE
    ))
    .bind(patient_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(note_from_row).collect()
}
