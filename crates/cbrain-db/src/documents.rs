//! Database operations for the `source_documents` table.

use cbrain_core::SourceDocument;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `source_documents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceDocumentRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub title: String,
    pub raw_text: String,
    pub speaker_hint: Option<String>,
    pub knowledge_extracted_at: Option<DateTime<Utc>>,
    pub ideas_extracted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<SourceDocumentRow> for SourceDocument {
    fn from(row: SourceDocumentRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            team_id: row.team_id,
            title: row.title,
            raw_text: row.raw_text,
            speaker_hint: row.speaker_hint,
            knowledge_extracted_at: row.knowledge_extracted_at,
            ideas_extracted_at: row.ideas_extracted_at,
            created_at: row.created_at,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, owner_id, team_id, title, raw_text, speaker_hint, \
     knowledge_extracted_at, ideas_extracted_at, created_at FROM source_documents";

/// Insert a new source document and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_source_document(
    pool: &PgPool,
    owner_id: Uuid,
    team_id: Option<Uuid>,
    title: &str,
    raw_text: &str,
    speaker_hint: Option<&str>,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO source_documents (id, owner_id, team_id, title, raw_text, speaker_hint) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(owner_id)
    .bind(team_id)
    .bind(title)
    .bind(raw_text)
    .bind(speaker_hint)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Fetch a source document by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_source_document(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<SourceDocumentRow>, DbError> {
    let row = sqlx::query_as::<_, SourceDocumentRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Reset both extraction timestamps so the document is picked up again.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the document does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn clear_extraction_timestamps(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE source_documents \
         SET knowledge_extracted_at = NULL, ideas_extracted_at = NULL, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Stamp `knowledge_extracted_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_knowledge_extracted(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE source_documents SET knowledge_extracted_at = NOW(), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stamp `ideas_extracted_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_ideas_extracted(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE source_documents SET ideas_extracted_at = NOW(), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
