//! Persistence seam for the pipeline.
//!
//! [`PgStore`] is the production implementation over `cbrain-db`;
//! [`InMemoryStore`] backs tests and dry runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use cbrain_core::{
    ContentIdea, IdeaStatus, KnowledgeEntry, NewKnowledgeEntry, PerformancePattern,
    PerformanceRecord, SourceDocument, Template, Topic, VoiceProfile,
};
use uuid::Uuid;

pub use cbrain_db::EntryFilter;
pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::BrainError;

/// A transcript to register before extraction.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub title: String,
    pub raw_text: String,
    pub speaker_hint: Option<String>,
}

/// Replacement values for the editable fields of an entry.
#[derive(Debug, Clone)]
pub struct EntryUpdate {
    pub category: String,
    pub content: String,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct NewIdea {
    pub owner_id: Uuid,
    pub source_document_id: Option<Uuid>,
    pub title: String,
    pub core_insight: String,
    pub hook: Option<String>,
    pub content_pillar: Option<String>,
    pub speaker: Option<String>,
}

/// A generated (and possibly polished) draft handed to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub idea_id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Option<Uuid>,
    pub draft_content: String,
    pub final_content: Option<String>,
    pub dm_text: Option<String>,
    pub cta_keyword: Option<String>,
    pub variations: Vec<String>,
    pub hook_score: Option<i16>,
    pub polish_changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRecord {
    pub owner_id: Uuid,
    pub idea_id: Option<Uuid>,
    pub ai_text: String,
    pub edited_text: String,
    pub patterns: Vec<String>,
}

/// Everything the pipeline reads and writes.
///
/// Counter mutations (`increment_*`, `decrement_tag`) must be atomic with
/// respect to concurrent callers.
#[async_trait]
pub trait BrainStore: Send + Sync {
    async fn insert_document(&self, document: &NewDocument) -> Result<Uuid, BrainError>;
    async fn get_document(&self, id: Uuid) -> Result<Option<SourceDocument>, BrainError>;
    async fn mark_knowledge_extracted(&self, id: Uuid) -> Result<(), BrainError>;
    async fn mark_ideas_extracted(&self, id: Uuid) -> Result<(), BrainError>;
    async fn clear_extraction_timestamps(&self, id: Uuid) -> Result<(), BrainError>;

    async fn insert_entry(&self, entry: &NewKnowledgeEntry) -> Result<Uuid, BrainError>;
    async fn get_entry(&self, id: Uuid) -> Result<Option<KnowledgeEntry>, BrainError>;
    async fn update_entry(&self, id: Uuid, update: &EntryUpdate) -> Result<(), BrainError>;
    /// Delete an entry and return its tags.
    async fn delete_entry(&self, id: Uuid) -> Result<Vec<String>, BrainError>;
    async fn entry_tags_for_document(&self, document_id: Uuid)
        -> Result<Vec<Vec<String>>, BrainError>;
    async fn delete_entries_for_document(&self, document_id: Uuid) -> Result<u64, BrainError>;
    /// Structured-filter candidates ordered by quality then recency.
    async fn search_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>, BrainError>;

    async fn list_topics(&self, owner_id: Uuid) -> Result<Vec<Topic>, BrainError>;
    /// Create-or-increment; returns the usage count afterwards.
    async fn increment_topic(
        &self,
        owner_id: Uuid,
        slug: &str,
        label: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, BrainError>;
    async fn increment_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError>;
    /// Floored at zero.
    async fn decrement_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError>;
    async fn tag_usage(&self, owner_id: Uuid, label: &str) -> Result<Option<i64>, BrainError>;

    /// Platform-shared templates plus the owner's own.
    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<Template>, BrainError>;
    async fn set_template_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), BrainError>;
    async fn record_template_use(&self, id: Uuid, engagement: Option<f64>) -> Result<(), BrainError>;

    async fn insert_idea(&self, idea: &NewIdea) -> Result<Uuid, BrainError>;
    async fn get_idea(&self, id: Uuid) -> Result<Option<ContentIdea>, BrainError>;
    async fn delete_ideas_for_document(&self, document_id: Uuid) -> Result<u64, BrainError>;
    /// Compare-and-set; `false` when the idea was not in `from`.
    async fn transition_idea(
        &self,
        id: Uuid,
        from: IdeaStatus,
        to: IdeaStatus,
    ) -> Result<bool, BrainError>;
    async fn insert_draft(&self, draft: &DraftRecord) -> Result<Uuid, BrainError>;
    async fn get_voice_profile(
        &self,
        owner_id: Uuid,
        speaker: &str,
    ) -> Result<Option<VoiceProfile>, BrainError>;
    async fn insert_edit_record(&self, record: &EditRecord) -> Result<Uuid, BrainError>;

    /// Append a snapshot; `false` when it was a duplicate.
    async fn insert_performance_record(&self, record: &PerformanceRecord)
        -> Result<bool, BrainError>;
    /// Newest snapshot per (post, platform).
    async fn latest_performance(&self, owner_id: Uuid) -> Result<Vec<PerformanceRecord>, BrainError>;
    async fn replace_patterns(
        &self,
        owner_id: Uuid,
        patterns: &[PerformancePattern],
    ) -> Result<usize, BrainError>;
    async fn list_patterns(&self, owner_id: Uuid) -> Result<Vec<PerformancePattern>, BrainError>;
}
