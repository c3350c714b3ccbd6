use cbrain_core::TemplateConfig;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Upsert platform-shared templates from config.
///
/// Returns the number of templates processed. Usage counters and engagement
/// averages of existing rows are preserved. A change to any embedded field
/// (category, structure or first example) clears the stored embedding so it
/// is recomputed on next use. All upserts run in a single transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_templates(pool: &PgPool, templates: &[TemplateConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for template in templates {
        sqlx::query(
            "INSERT INTO templates (id, owner_id, name, category, structure, examples, tags) \
             VALUES ($1, NULL, $2, $3, $4, $5, $6) \
             ON CONFLICT (name) WHERE owner_id IS NULL DO UPDATE SET \
                 category = EXCLUDED.category, \
                 structure = EXCLUDED.structure, \
                 examples = EXCLUDED.examples, \
                 tags = EXCLUDED.tags, \
                 embedding = CASE WHEN templates.structure = EXCLUDED.structure \
                     AND templates.category = EXCLUDED.category \
                     AND templates.examples[1] IS NOT DISTINCT FROM EXCLUDED.examples[1] \
                     THEN templates.embedding ELSE NULL END, \
                 updated_at = NOW()",
        )
        .bind(Uuid::new_v4())
        .bind(&template.name)
        .bind(&template.category)
        .bind(&template.structure)
        .bind(&template.examples)
        .bind(&template.tags)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
