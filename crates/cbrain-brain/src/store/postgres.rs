use async_trait::async_trait;
use cbrain_core::{
    ContentIdea, IdeaStatus, KnowledgeEntry, NewKnowledgeEntry, PerformancePattern,
    PerformanceRecord, SourceDocument, Template, Topic, VoiceProfile,
};
use cbrain_db::{DbError, EntryFilter, NewContentDraft};
use sqlx::PgPool;
use uuid::Uuid;

use super::{BrainStore, DraftRecord, EditRecord, EntryUpdate, NewDocument, NewIdea};
use crate::BrainError;

/// [`BrainStore`] over the Postgres schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found(entity: &'static str, id: Uuid) -> impl FnOnce(DbError) -> BrainError {
    move |e| match e {
        DbError::NotFound => BrainError::not_found(entity, id),
        other => BrainError::Store(other),
    }
}

#[async_trait]
impl BrainStore for PgStore {
    async fn insert_document(&self, document: &NewDocument) -> Result<Uuid, BrainError> {
        let id = cbrain_db::insert_source_document(
            &self.pool,
            document.owner_id,
            document.team_id,
            &document.title,
            &document.raw_text,
            document.speaker_hint.as_deref(),
        )
        .await?;
        Ok(id)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<SourceDocument>, BrainError> {
        let row = cbrain_db::get_source_document(&self.pool, id).await?;
        Ok(row.map(SourceDocument::from))
    }

    async fn mark_knowledge_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        cbrain_db::mark_knowledge_extracted(&self.pool, id).await?;
        Ok(())
    }

    async fn mark_ideas_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        cbrain_db::mark_ideas_extracted(&self.pool, id).await?;
        Ok(())
    }

    async fn clear_extraction_timestamps(&self, id: Uuid) -> Result<(), BrainError> {
        cbrain_db::clear_extraction_timestamps(&self.pool, id)
            .await
            .map_err(not_found("document", id))
    }

    async fn insert_entry(&self, entry: &NewKnowledgeEntry) -> Result<Uuid, BrainError> {
        Ok(cbrain_db::insert_knowledge_entry(&self.pool, entry).await?)
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<KnowledgeEntry>, BrainError> {
        cbrain_db::get_knowledge_entry(&self.pool, id)
            .await?
            .map(KnowledgeEntry::try_from)
            .transpose()
            .map_err(BrainError::from)
    }

    async fn update_entry(&self, id: Uuid, update: &EntryUpdate) -> Result<(), BrainError> {
        cbrain_db::update_knowledge_entry(
            &self.pool,
            id,
            &update.category,
            &update.content,
            update.context.as_deref(),
            &update.tags,
            update.embedding.as_deref(),
        )
        .await
        .map_err(not_found("knowledge entry", id))
    }

    async fn delete_entry(&self, id: Uuid) -> Result<Vec<String>, BrainError> {
        cbrain_db::delete_knowledge_entry(&self.pool, id)
            .await
            .map_err(not_found("knowledge entry", id))
    }

    async fn entry_tags_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<Vec<String>>, BrainError> {
        Ok(cbrain_db::list_entry_tags_for_document(&self.pool, document_id).await?)
    }

    async fn delete_entries_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        Ok(cbrain_db::delete_entries_for_document(&self.pool, document_id).await?)
    }

    async fn search_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>, BrainError> {
        cbrain_db::search_knowledge_candidates(&self.pool, filter)
            .await?
            .into_iter()
            .map(|row| KnowledgeEntry::try_from(row).map_err(BrainError::from))
            .collect()
    }

    async fn list_topics(&self, owner_id: Uuid) -> Result<Vec<Topic>, BrainError> {
        let rows = cbrain_db::list_topics(&self.pool, owner_id).await?;
        Ok(rows.into_iter().map(Topic::from).collect())
    }

    async fn increment_topic(
        &self,
        owner_id: Uuid,
        slug: &str,
        label: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, BrainError> {
        Ok(cbrain_db::increment_topic(&self.pool, owner_id, slug, label, embedding).await?)
    }

    async fn increment_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        Ok(cbrain_db::increment_tag(&self.pool, owner_id, label, by).await?)
    }

    async fn decrement_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        cbrain_db::decrement_tag(&self.pool, owner_id, label, by)
            .await
            .map_err(|e| match e {
                DbError::NotFound => BrainError::Consistency(format!("tag '{label}' has no counter")),
                other => BrainError::Store(other),
            })
    }

    async fn tag_usage(&self, owner_id: Uuid, label: &str) -> Result<Option<i64>, BrainError> {
        Ok(cbrain_db::get_tag_usage(&self.pool, owner_id, label).await?)
    }

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<Template>, BrainError> {
        let rows = cbrain_db::list_templates_for_owner(&self.pool, owner_id).await?;
        Ok(rows.into_iter().map(Template::from).collect())
    }

    async fn set_template_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), BrainError> {
        cbrain_db::set_template_embedding(&self.pool, id, embedding).await?;
        Ok(())
    }

    async fn record_template_use(&self, id: Uuid, engagement: Option<f64>) -> Result<(), BrainError> {
        cbrain_db::record_template_use(&self.pool, id, engagement)
            .await
            .map_err(not_found("template", id))
    }

    async fn insert_idea(&self, idea: &NewIdea) -> Result<Uuid, BrainError> {
        let id = cbrain_db::insert_content_idea(
            &self.pool,
            idea.owner_id,
            idea.source_document_id,
            &idea.title,
            &idea.core_insight,
            idea.hook.as_deref(),
            idea.content_pillar.as_deref(),
            idea.speaker.as_deref(),
        )
        .await?;
        Ok(id)
    }

    async fn get_idea(&self, id: Uuid) -> Result<Option<ContentIdea>, BrainError> {
        cbrain_db::get_content_idea(&self.pool, id)
            .await?
            .map(ContentIdea::try_from)
            .transpose()
            .map_err(BrainError::from)
    }

    async fn delete_ideas_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        Ok(cbrain_db::delete_ideas_for_document(&self.pool, document_id).await?)
    }

    async fn transition_idea(
        &self,
        id: Uuid,
        from: IdeaStatus,
        to: IdeaStatus,
    ) -> Result<bool, BrainError> {
        Ok(cbrain_db::transition_idea_status(&self.pool, id, from, to).await?)
    }

    async fn insert_draft(&self, draft: &DraftRecord) -> Result<Uuid, BrainError> {
        let row = NewContentDraft {
            idea_id: draft.idea_id,
            owner_id: draft.owner_id,
            template_id: draft.template_id,
            draft_content: &draft.draft_content,
            final_content: draft.final_content.as_deref(),
            dm_text: draft.dm_text.as_deref(),
            cta_keyword: draft.cta_keyword.as_deref(),
            variations: &draft.variations,
            hook_score: draft.hook_score,
            polish_changes: &draft.polish_changes,
        };
        Ok(cbrain_db::insert_content_draft(&self.pool, &row).await?)
    }

    async fn get_voice_profile(
        &self,
        owner_id: Uuid,
        speaker: &str,
    ) -> Result<Option<VoiceProfile>, BrainError> {
        let row = cbrain_db::get_voice_profile(&self.pool, owner_id, speaker).await?;
        Ok(row.map(VoiceProfile::from))
    }

    async fn insert_edit_record(&self, record: &EditRecord) -> Result<Uuid, BrainError> {
        let id = cbrain_db::insert_edit_record(
            &self.pool,
            record.owner_id,
            record.idea_id,
            &record.ai_text,
            &record.edited_text,
            &record.patterns,
        )
        .await?;
        Ok(id)
    }

    async fn insert_performance_record(
        &self,
        record: &PerformanceRecord,
    ) -> Result<bool, BrainError> {
        Ok(cbrain_db::insert_performance_record(&self.pool, record).await?)
    }

    async fn latest_performance(&self, owner_id: Uuid) -> Result<Vec<PerformanceRecord>, BrainError> {
        let rows = cbrain_db::list_latest_performance(&self.pool, owner_id).await?;
        Ok(rows.into_iter().map(PerformanceRecord::from).collect())
    }

    async fn replace_patterns(
        &self,
        owner_id: Uuid,
        patterns: &[PerformancePattern],
    ) -> Result<usize, BrainError> {
        Ok(cbrain_db::replace_performance_patterns(&self.pool, owner_id, patterns).await?)
    }

    async fn list_patterns(&self, owner_id: Uuid) -> Result<Vec<PerformancePattern>, BrainError> {
        cbrain_db::list_performance_patterns(&self.pool, owner_id, None)
            .await?
            .into_iter()
            .map(|row| PerformancePattern::try_from(row).map_err(BrainError::from))
            .collect()
    }
}
