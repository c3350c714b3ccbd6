//! Database operations for `performance_records` and `performance_patterns`.

use cbrain_core::{PatternType, PerformancePattern, PerformanceRecord};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `performance_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PerformanceRecordRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub post_id: Uuid,
    pub platform: String,
    pub captured_at: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
    pub clicks: i64,
    pub impressions: i64,
    pub engagement_rate: f64,
    pub archetype: Option<String>,
    pub hook_type: Option<String>,
    pub format: Option<String>,
    pub topic: Option<String>,
    pub content_pillar: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: Option<i32>,
}

impl From<PerformanceRecordRow> for PerformanceRecord {
    fn from(row: PerformanceRecordRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            post_id: row.post_id,
            platform: row.platform,
            captured_at: row.captured_at,
            views: row.views,
            likes: row.likes,
            comments: row.comments,
            shares: row.shares,
            saves: row.saves,
            clicks: row.clicks,
            impressions: row.impressions,
            engagement_rate: row.engagement_rate,
            archetype: row.archetype,
            hook_type: row.hook_type,
            format: row.format,
            topic: row.topic,
            content_pillar: row.content_pillar,
            published_at: row.published_at,
            word_count: row.word_count,
        }
    }
}

/// A row from the `performance_patterns` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PerformancePatternRow {
    pub owner_id: Uuid,
    pub pattern_type: String,
    pub pattern_value: String,
    pub avg_engagement_rate: f64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub sample_count: i32,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<PerformancePatternRow> for PerformancePattern {
    type Error = DbError;

    fn try_from(row: PerformancePatternRow) -> Result<Self, Self::Error> {
        let pattern_type: PatternType =
            row.pattern_type
                .parse()
                .map_err(|e: cbrain_core::CoreError| DbError::InvalidRow {
                    table: "performance_patterns",
                    reason: e.to_string(),
                })?;
        Ok(Self {
            owner_id: row.owner_id,
            pattern_type,
            pattern_value: row.pattern_value,
            avg_engagement_rate: row.avg_engagement_rate,
            avg_views: row.avg_views,
            avg_likes: row.avg_likes,
            avg_comments: row.avg_comments,
            sample_count: row.sample_count,
            confidence: row.confidence,
            last_updated: row.last_updated,
        })
    }
}

/// Append a snapshot. A duplicate `(post_id, captured_at)` is ignored.
///
/// Returns `true` when a new row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_performance_record(
    pool: &PgPool,
    record: &PerformanceRecord,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO performance_records \
             (id, owner_id, post_id, platform, captured_at, views, likes, comments, shares, \
              saves, clicks, impressions, engagement_rate, archetype, hook_type, format, topic, \
              content_pillar, published_at, word_count) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                 $18, $19, $20) \
         ON CONFLICT (post_id, captured_at) DO NOTHING",
    )
    .bind(record.id)
    .bind(record.owner_id)
    .bind(record.post_id)
    .bind(&record.platform)
    .bind(record.captured_at)
    .bind(record.views)
    .bind(record.likes)
    .bind(record.comments)
    .bind(record.shares)
    .bind(record.saves)
    .bind(record.clicks)
    .bind(record.impressions)
    .bind(record.engagement_rate)
    .bind(&record.archetype)
    .bind(&record.hook_type)
    .bind(&record.format)
    .bind(&record.topic)
    .bind(&record.content_pillar)
    .bind(record.published_at)
    .bind(record.word_count)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// The newest snapshot per `(post_id, platform)` for one owner.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_latest_performance(
    pool: &PgPool,
    owner_id: Uuid,
) -> Result<Vec<PerformanceRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, PerformanceRecordRow>(
        "SELECT DISTINCT ON (post_id, platform) \
                id, owner_id, post_id, platform, captured_at, views, likes, comments, shares, \
                saves, clicks, impressions, engagement_rate, archetype, hook_type, format, topic, \
                content_pillar, published_at, word_count \
         FROM performance_records \
         WHERE owner_id = $1 \
         ORDER BY post_id, platform, captured_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace an owner's whole pattern projection in one transaction, so readers
/// see either the previous set or the new one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is rolled back.
pub async fn replace_performance_patterns(
    pool: &PgPool,
    owner_id: Uuid,
    patterns: &[PerformancePattern],
) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM performance_patterns WHERE owner_id = $1")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

    for pattern in patterns {
        sqlx::query(
            "INSERT INTO performance_patterns \
                 (owner_id, pattern_type, pattern_value, avg_engagement_rate, avg_views, \
                  avg_likes, avg_comments, sample_count, confidence, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(owner_id)
        .bind(pattern.pattern_type.as_str())
        .bind(&pattern.pattern_value)
        .bind(pattern.avg_engagement_rate)
        .bind(pattern.avg_views)
        .bind(pattern.avg_likes)
        .bind(pattern.avg_comments)
        .bind(pattern.sample_count)
        .bind(pattern.confidence)
        .bind(pattern.last_updated)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(patterns.len())
}

/// All stored patterns for an owner, optionally of one type.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_performance_patterns(
    pool: &PgPool,
    owner_id: Uuid,
    pattern_type: Option<PatternType>,
) -> Result<Vec<PerformancePatternRow>, DbError> {
    let rows = sqlx::query_as::<_, PerformancePatternRow>(
        "SELECT owner_id, pattern_type, pattern_value, avg_engagement_rate, avg_views, \
                avg_likes, avg_comments, sample_count, confidence, last_updated \
         FROM performance_patterns \
         WHERE owner_id = $1 AND ($2::TEXT IS NULL OR pattern_type = $2) \
         ORDER BY avg_engagement_rate * confidence DESC, pattern_type, pattern_value",
    )
    .bind(owner_id)
    .bind(pattern_type.map(PatternType::as_str))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Owners that have at least one performance snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_performance_owners(pool: &PgPool) -> Result<Vec<Uuid>, DbError> {
    let owners = sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT owner_id FROM performance_records ORDER BY owner_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(owners)
}
