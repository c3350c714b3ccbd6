//! Database operations for the `templates` table.

use cbrain_core::Template;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `templates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub category: String,
    pub structure: String,
    pub examples: Vec<String>,
    pub tags: Vec<String>,
    pub usage_count: i64,
    pub avg_engagement_score: f64,
    pub embedding: Option<Vec<f32>>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            category: row.category,
            structure: row.structure,
            examples: row.examples,
            tags: row.tags,
            usage_count: row.usage_count,
            avg_engagement_score: row.avg_engagement_score,
            embedding: row.embedding,
        }
    }
}

/// Platform-shared templates plus the owner's private ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_templates_for_owner(
    pool: &PgPool,
    owner_id: Uuid,
) -> Result<Vec<TemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, TemplateRow>(
        "SELECT id, owner_id, name, category, structure, examples, tags, usage_count, \
                avg_engagement_score, embedding \
         FROM templates \
         WHERE owner_id IS NULL OR owner_id = $1 \
         ORDER BY usage_count DESC, name",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Persist a freshly computed template embedding.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_template_embedding(
    pool: &PgPool,
    template_id: Uuid,
    embedding: &[f32],
) -> Result<(), DbError> {
    sqlx::query("UPDATE templates SET embedding = $1, updated_at = NOW() WHERE id = $2")
        .bind(embedding)
        .bind(template_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record that a template was used for a post and fold its engagement into
/// the running average.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the template does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_template_use(
    pool: &PgPool,
    template_id: Uuid,
    engagement_score: Option<f64>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE templates SET \
             avg_engagement_score = CASE WHEN $1::DOUBLE PRECISION IS NULL \
                 THEN avg_engagement_score \
                 ELSE (avg_engagement_score * usage_count + $1) / (usage_count + 1) END, \
             usage_count = usage_count + 1, \
             updated_at = NOW() \
         WHERE id = $2",
    )
    .bind(engagement_score)
    .bind(template_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
