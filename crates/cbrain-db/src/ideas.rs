//! Database operations for content ideas, drafts, voice profiles and edit records.

use cbrain_core::{ContentIdea, IdeaStatus, VoiceProfile};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `content_ideas` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentIdeaRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_document_id: Option<Uuid>,
    pub title: String,
    pub core_insight: String,
    pub hook: Option<String>,
    pub content_pillar: Option<String>,
    pub speaker: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ContentIdeaRow> for ContentIdea {
    type Error = DbError;

    fn try_from(row: ContentIdeaRow) -> Result<Self, Self::Error> {
        let status: IdeaStatus =
            row.status
                .parse()
                .map_err(|e: cbrain_core::CoreError| DbError::InvalidRow {
                    table: "content_ideas",
                    reason: e.to_string(),
                })?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            source_document_id: row.source_document_id,
            title: row.title,
            core_insight: row.core_insight,
            hook: row.hook,
            content_pillar: row.content_pillar,
            speaker: row.speaker,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `voice_profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoiceProfileRow {
    pub owner_id: Uuid,
    pub speaker: String,
    pub tone: String,
    pub style_notes: Vec<String>,
    pub signature_phrases: Vec<String>,
    pub banned_phrases: Vec<String>,
}

impl From<VoiceProfileRow> for VoiceProfile {
    fn from(row: VoiceProfileRow) -> Self {
        Self {
            owner_id: row.owner_id,
            speaker: row.speaker,
            tone: row.tone,
            style_notes: row.style_notes,
            signature_phrases: row.signature_phrases,
            banned_phrases: row.banned_phrases,
        }
    }
}

/// Values for a new `content_drafts` row.
#[derive(Debug, Clone)]
pub struct NewContentDraft<'a> {
    pub idea_id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Option<Uuid>,
    pub draft_content: &'a str,
    pub final_content: Option<&'a str>,
    pub dm_text: Option<&'a str>,
    pub cta_keyword: Option<&'a str>,
    pub variations: &'a [String],
    pub hook_score: Option<i16>,
    pub polish_changes: &'a [String],
}

// ---------------------------------------------------------------------------
// content_ideas operations
// ---------------------------------------------------------------------------

/// Insert a new idea in `extracted` status and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
#[allow(clippy::too_many_arguments)]
pub async fn insert_content_idea(
    pool: &PgPool,
    owner_id: Uuid,
    source_document_id: Option<Uuid>,
    title: &str,
    core_insight: &str,
    hook: Option<&str>,
    content_pillar: Option<&str>,
    speaker: Option<&str>,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO content_ideas \
             (id, owner_id, source_document_id, title, core_insight, hook, content_pillar, speaker) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(id)
    .bind(owner_id)
    .bind(source_document_id)
    .bind(title)
    .bind(core_insight)
    .bind(hook)
    .bind(content_pillar)
    .bind(speaker)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Fetch an idea by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_content_idea(pool: &PgPool, id: Uuid) -> Result<Option<ContentIdeaRow>, DbError> {
    let row = sqlx::query_as::<_, ContentIdeaRow>(
        "SELECT id, owner_id, source_document_id, title, core_insight, hook, content_pillar, \
                speaker, status, created_at, updated_at \
         FROM content_ideas WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Compare-and-set an idea's status. Returns `false` when the idea was not in
/// `from` (someone else moved it first, or it does not exist).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn transition_idea_status(
    pool: &PgPool,
    id: Uuid,
    from: IdeaStatus,
    to: IdeaStatus,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE content_ideas SET status = $1, updated_at = NOW() \
         WHERE id = $2 AND status = $3",
    )
    .bind(to.as_str())
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Delete every idea derived from a document. Returns the number deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_ideas_for_document(pool: &PgPool, document_id: Uuid) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM content_ideas WHERE source_document_id = $1")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// content_drafts / voice_profiles / edit_records
// ---------------------------------------------------------------------------

/// Insert a generated draft and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_content_draft(pool: &PgPool, draft: &NewContentDraft<'_>) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO content_drafts \
             (id, idea_id, owner_id, template_id, draft_content, final_content, dm_text, \
              cta_keyword, variations, hook_score, polish_changes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(id)
    .bind(draft.idea_id)
    .bind(draft.owner_id)
    .bind(draft.template_id)
    .bind(draft.draft_content)
    .bind(draft.final_content)
    .bind(draft.dm_text)
    .bind(draft.cta_keyword)
    .bind(draft.variations)
    .bind(draft.hook_score)
    .bind(draft.polish_changes)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Voice profile for a speaker, if one has been configured.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_voice_profile(
    pool: &PgPool,
    owner_id: Uuid,
    speaker: &str,
) -> Result<Option<VoiceProfileRow>, DbError> {
    let row = sqlx::query_as::<_, VoiceProfileRow>(
        "SELECT owner_id, speaker, tone, style_notes, signature_phrases, banned_phrases \
         FROM voice_profiles WHERE owner_id = $1 AND LOWER(speaker) = LOWER($2)",
    )
    .bind(owner_id)
    .bind(speaker)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert or replace a voice profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_voice_profile(pool: &PgPool, profile: &VoiceProfile) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO voice_profiles \
             (owner_id, speaker, tone, style_notes, signature_phrases, banned_phrases) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (owner_id, speaker) DO UPDATE SET \
             tone = EXCLUDED.tone, \
             style_notes = EXCLUDED.style_notes, \
             signature_phrases = EXCLUDED.signature_phrases, \
             banned_phrases = EXCLUDED.banned_phrases, \
             updated_at = NOW()",
    )
    .bind(profile.owner_id)
    .bind(&profile.speaker)
    .bind(&profile.tone)
    .bind(&profile.style_notes)
    .bind(&profile.signature_phrases)
    .bind(&profile.banned_phrases)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the outcome of an edit-pattern classification.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_edit_record(
    pool: &PgPool,
    owner_id: Uuid,
    idea_id: Option<Uuid>,
    ai_text: &str,
    edited_text: &str,
    patterns: &[String],
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO edit_records (id, owner_id, idea_id, ai_text, edited_text, patterns) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(owner_id)
    .bind(idea_id)
    .bind(ai_text)
    .bind(edited_text)
    .bind(patterns)
    .execute(pool)
    .await?;
    Ok(id)
}
