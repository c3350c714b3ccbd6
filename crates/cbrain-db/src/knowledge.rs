//! Database operations for the `knowledge_entries` table.

use cbrain_core::{Actionability, KnowledgeEntry, KnowledgeType, NewKnowledgeEntry};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `knowledge_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KnowledgeEntryRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub source_document_id: Option<Uuid>,
    pub category: String,
    pub knowledge_type: String,
    pub speaker: Option<String>,
    pub content: String,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    pub quality_score: i16,
    pub specificity: bool,
    pub actionability: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<KnowledgeEntryRow> for KnowledgeEntry {
    type Error = DbError;

    fn try_from(row: KnowledgeEntryRow) -> Result<Self, Self::Error> {
        let knowledge_type: KnowledgeType =
            row.knowledge_type
                .parse()
                .map_err(|e: cbrain_core::CoreError| DbError::InvalidRow {
                    table: "knowledge_entries",
                    reason: e.to_string(),
                })?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            team_id: row.team_id,
            source_document_id: row.source_document_id,
            category: row.category,
            knowledge_type,
            speaker: row.speaker,
            content: row.content,
            context: row.context,
            tags: row.tags,
            topics: row.topics,
            quality_score: row.quality_score,
            specificity: row.specificity,
            actionability: Actionability::parse_or_default(Some(&row.actionability)),
            embedding: row.embedding,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, owner_id, team_id, source_document_id, category, \
     knowledge_type, speaker, content, context, tags, topics, quality_score, specificity, \
     actionability, embedding, created_at, updated_at FROM knowledge_entries";

/// Text the keyword filter looks in.
const SEARCHABLE_TEXT: &str = "(content || ' ' || COALESCE(context, '') || ' ' || category)";

/// Structured filters for candidate retrieval. `None` fields are not applied.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub owner_id: Uuid,
    /// When set, entries shared with this team are visible as well as the owner's.
    pub team_id: Option<Uuid>,
    pub category: Option<String>,
    pub speaker: Option<String>,
    pub tag: Option<String>,
    pub topic: Option<String>,
    pub knowledge_type: Option<KnowledgeType>,
    pub min_quality: Option<i16>,
    pub since: Option<DateTime<Utc>>,
    /// At least one keyword must appear (case-insensitive) in content, context
    /// or category. Rows matching more keywords sort first.
    pub keywords: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Insert a validated entry and return its generated id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including CHECK violations).
pub async fn insert_knowledge_entry(
    pool: &PgPool,
    entry: &NewKnowledgeEntry,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO knowledge_entries \
             (id, owner_id, team_id, source_document_id, category, knowledge_type, speaker, \
              content, context, tags, topics, quality_score, specificity, actionability, embedding) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(id)
    .bind(entry.owner_id)
    .bind(entry.team_id)
    .bind(entry.source_document_id)
    .bind(&entry.category)
    .bind(entry.knowledge_type.as_str())
    .bind(&entry.speaker)
    .bind(&entry.content)
    .bind(&entry.context)
    .bind(&entry.tags)
    .bind(&entry.topics)
    .bind(entry.quality_score)
    .bind(entry.specificity)
    .bind(entry.actionability.as_str())
    .bind(&entry.embedding)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Fetch one entry by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_knowledge_entry(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<KnowledgeEntryRow>, DbError> {
    let row = sqlx::query_as::<_, KnowledgeEntryRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Return the tag arrays of every entry derived from a document.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_entry_tags_for_document(
    pool: &PgPool,
    document_id: Uuid,
) -> Result<Vec<Vec<String>>, DbError> {
    let rows = sqlx::query_scalar::<_, Vec<String>>(
        "SELECT tags FROM knowledge_entries WHERE source_document_id = $1",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete every entry derived from a document. Returns the number deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_entries_for_document(pool: &PgPool, document_id: Uuid) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM knowledge_entries WHERE source_document_id = $1")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete one entry, returning its tags so callers can adjust usage counts.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no entry has this id, or [`DbError::Sqlx`]
/// if the delete fails.
pub async fn delete_knowledge_entry(pool: &PgPool, id: Uuid) -> Result<Vec<String>, DbError> {
    sqlx::query_scalar::<_, Vec<String>>("DELETE FROM knowledge_entries WHERE id = $1 RETURNING tags")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Overwrite the editable fields of an entry.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no entry has this id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_knowledge_entry(
    pool: &PgPool,
    id: Uuid,
    category: &str,
    content: &str,
    context: Option<&str>,
    tags: &[String],
    embedding: Option<&[f32]>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE knowledge_entries \
         SET category = $1, content = $2, context = $3, tags = $4, embedding = $5, \
             updated_at = NOW() \
         WHERE id = $6",
    )
    .bind(category)
    .bind(content)
    .bind(context)
    .bind(tags)
    .bind(embedding)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Load entries matching the structured filters, ordered by keyword hits
/// (when keywords are given), then quality, then recency.
///
/// Ranking by similarity happens in the caller; this query only narrows the
/// candidate set. `limit` and `offset` page through it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn search_knowledge_candidates(
    pool: &PgPool,
    filter: &EntryFilter,
) -> Result<Vec<KnowledgeEntryRow>, DbError> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(SELECT_COLUMNS);
    qb.push(" WHERE (owner_id = ").push_bind(filter.owner_id);
    if let Some(team_id) = filter.team_id {
        qb.push(" OR team_id = ").push_bind(team_id);
    }
    qb.push(")");

    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(speaker) = &filter.speaker {
        qb.push(" AND speaker = ").push_bind(speaker.clone());
    }
    if let Some(tag) = &filter.tag {
        qb.push(" AND ").push_bind(tag.clone()).push(" = ANY(tags)");
    }
    if let Some(topic) = &filter.topic {
        qb.push(" AND ").push_bind(topic.clone()).push(" = ANY(topics)");
    }
    if let Some(knowledge_type) = filter.knowledge_type {
        qb.push(" AND knowledge_type = ")
            .push_bind(knowledge_type.as_str());
    }
    if let Some(min_quality) = filter.min_quality {
        qb.push(" AND quality_score >= ").push_bind(min_quality);
    }
    if let Some(since) = filter.since {
        qb.push(" AND created_at >= ").push_bind(since);
    }
    let patterns: Vec<String> = filter
        .keywords
        .iter()
        .map(|k| format!("%{}%", escape_like(k)))
        .collect();
    if !patterns.is_empty() {
        qb.push(" AND ")
            .push(SEARCHABLE_TEXT)
            .push(" ILIKE ANY(")
            .push_bind(patterns.clone())
            .push(")");
    }

    qb.push(" ORDER BY ");
    if !patterns.is_empty() {
        qb.push("(SELECT COUNT(*) FROM unnest(")
            .push_bind(patterns)
            .push("::text[]) AS p WHERE ")
            .push(SEARCHABLE_TEXT)
            .push(" ILIKE p) DESC, ");
    }
    qb.push("quality_score DESC, created_at DESC, id LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    let rows = qb
        .build_query_as::<KnowledgeEntryRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn row_with_unknown_type_is_rejected() {
        let row = KnowledgeEntryRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            team_id: None,
            source_document_id: None,
            category: "sales".to_string(),
            knowledge_type: "rumour".to_string(),
            speaker: None,
            content: "x".to_string(),
            context: None,
            tags: Vec::new(),
            topics: Vec::new(),
            quality_score: 3,
            specificity: false,
            actionability: "contextual".to_string(),
            embedding: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = KnowledgeEntry::try_from(row).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow { table: "knowledge_entries", .. }));
    }
}
