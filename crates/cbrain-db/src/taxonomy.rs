//! Atomic counters for the `topics` and `tags` tables.
//!
//! Every mutation here is a single statement so concurrent extraction batches
//! for the same owner never lose an update.

use cbrain_core::Topic;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `topics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicRow {
    pub owner_id: Uuid,
    pub slug: String,
    pub label: String,
    pub usage_count: i64,
    pub embedding: Option<Vec<f32>>,
}

impl From<TopicRow> for Topic {
    fn from(row: TopicRow) -> Self {
        Self {
            owner_id: row.owner_id,
            slug: row.slug,
            label: row.label,
            usage_count: row.usage_count,
            embedding: row.embedding,
        }
    }
}

/// List an owner's canonical topics, most used first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_topics(pool: &PgPool, owner_id: Uuid) -> Result<Vec<TopicRow>, DbError> {
    let rows = sqlx::query_as::<_, TopicRow>(
        "SELECT owner_id, slug, label, usage_count, embedding FROM topics \
         WHERE owner_id = $1 \
         ORDER BY usage_count DESC, slug",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Increment a topic's usage, creating it with usage 1 if it does not exist.
///
/// Returns the usage count after the increment.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn increment_topic(
    pool: &PgPool,
    owner_id: Uuid,
    slug: &str,
    label: &str,
    embedding: Option<&[f32]>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "INSERT INTO topics (owner_id, slug, label, usage_count, embedding) \
         VALUES ($1, $2, $3, 1, $4) \
         ON CONFLICT (owner_id, slug) DO UPDATE SET \
             usage_count = topics.usage_count + 1, \
             embedding = COALESCE(topics.embedding, EXCLUDED.embedding), \
             updated_at = NOW() \
         RETURNING usage_count",
    )
    .bind(owner_id)
    .bind(slug)
    .bind(label)
    .bind(embedding)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Store an embedding on a topic that was created without one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_topic_embedding(
    pool: &PgPool,
    owner_id: Uuid,
    slug: &str,
    embedding: &[f32],
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE topics SET embedding = $1, updated_at = NOW() \
         WHERE owner_id = $2 AND slug = $3 AND embedding IS NULL",
    )
    .bind(embedding)
    .bind(owner_id)
    .bind(slug)
    .execute(pool)
    .await?;
    Ok(())
}

/// Add `by` to a tag's usage count, creating the tag if needed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn increment_tag(pool: &PgPool, owner_id: Uuid, label: &str, by: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "INSERT INTO tags (owner_id, label, usage_count) VALUES ($1, $2, $3) \
         ON CONFLICT (owner_id, label) DO UPDATE SET \
             usage_count = tags.usage_count + EXCLUDED.usage_count, \
             updated_at = NOW() \
         RETURNING usage_count",
    )
    .bind(owner_id)
    .bind(label)
    .bind(by)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Subtract `by` from a tag's usage count, floored at zero.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the tag does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn decrement_tag(pool: &PgPool, owner_id: Uuid, label: &str, by: i64) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE tags SET usage_count = GREATEST(usage_count - $1, 0), updated_at = NOW() \
         WHERE owner_id = $2 AND label = $3 \
         RETURNING usage_count",
    )
    .bind(by)
    .bind(owner_id)
    .bind(label)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Current usage count of a tag, or `None` if it has never been used.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tag_usage(pool: &PgPool, owner_id: Uuid, label: &str) -> Result<Option<i64>, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT usage_count FROM tags WHERE owner_id = $1 AND label = $2",
    )
    .bind(owner_id)
    .bind(label)
    .fetch_optional(pool)
    .await?;
    Ok(count)
}
