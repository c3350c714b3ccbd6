//! Scripted providers for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use cbrain_ai::{AiError, EmbeddingProvider, LanguageModel};
use cbrain_core::{
    ContentIdea, IdeaStatus, KnowledgeEntry, NewKnowledgeEntry, PerformancePattern,
    PerformanceRecord, SourceDocument, Template, Topic, VoiceProfile,
};
use cbrain_db::DbError;
use uuid::Uuid;

use crate::store::{
    BrainStore, DraftRecord, EditRecord, EntryFilter, EntryUpdate, InMemoryStore, NewDocument,
    NewIdea,
};
use crate::BrainError;

/// Replies from a fixed script, in order. Once the script runs out every call
/// answers `[]`. `None` entries fail with a 503.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(reply: &str) -> Self {
        Self::new([Some(reply)])
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _model: &str, _max_tokens: u32) -> Result<String, AiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(AiError::Status {
                provider: "scripted",
                status: 503,
                body: "overloaded".to_string(),
            }),
            None => Ok("[]".to_string()),
        }
    }
}

/// Bag-of-words vectors over a fixed vocabulary.
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub(crate) fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| (*w).to_string()).collect(),
        }
    }

    pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|word| {
                #[allow(clippy::cast_precision_loss)]
                let count = text.matches(word.as_str()).count() as f32;
                count
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

pub(crate) struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Err(AiError::Status {
            provider: "tei",
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

/// [`InMemoryStore`] whose knowledge, template, voice profile and pattern
/// reads fail. Everything else is delegated.
#[derive(Default)]
pub(crate) struct BriefReadsFailStore {
    pub(crate) inner: InMemoryStore,
}

fn read_failure(table: &'static str) -> BrainError {
    BrainError::Store(DbError::InvalidRow {
        table,
        reason: "unreadable".to_string(),
    })
}

#[async_trait]
impl BrainStore for BriefReadsFailStore {
    async fn insert_document(&self, document: &NewDocument) -> Result<Uuid, BrainError> {
        self.inner.insert_document(document).await
    }
    async fn get_document(&self, id: Uuid) -> Result<Option<SourceDocument>, BrainError> {
        self.inner.get_document(id).await
    }
    async fn mark_knowledge_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        self.inner.mark_knowledge_extracted(id).await
    }
    async fn mark_ideas_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        self.inner.mark_ideas_extracted(id).await
    }
    async fn clear_extraction_timestamps(&self, id: Uuid) -> Result<(), BrainError> {
        self.inner.clear_extraction_timestamps(id).await
    }
    async fn insert_entry(&self, entry: &NewKnowledgeEntry) -> Result<Uuid, BrainError> {
        self.inner.insert_entry(entry).await
    }
    async fn get_entry(&self, id: Uuid) -> Result<Option<KnowledgeEntry>, BrainError> {
        self.inner.get_entry(id).await
    }
    async fn update_entry(&self, id: Uuid, update: &EntryUpdate) -> Result<(), BrainError> {
        self.inner.update_entry(id, update).await
    }
    async fn delete_entry(&self, id: Uuid) -> Result<Vec<String>, BrainError> {
        self.inner.delete_entry(id).await
    }
    async fn entry_tags_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<Vec<String>>, BrainError> {
        self.inner.entry_tags_for_document(document_id).await
    }
    async fn delete_entries_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        self.inner.delete_entries_for_document(document_id).await
    }
    async fn search_entries(&self, _filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>, BrainError> {
        Err(read_failure("knowledge_entries"))
    }
    async fn list_topics(&self, owner_id: Uuid) -> Result<Vec<Topic>, BrainError> {
        self.inner.list_topics(owner_id).await
    }
    async fn increment_topic(
        &self,
        owner_id: Uuid,
        slug: &str,
        label: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, BrainError> {
        self.inner.increment_topic(owner_id, slug, label, embedding).await
    }
    async fn increment_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        self.inner.increment_tag(owner_id, label, by).await
    }
    async fn decrement_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        self.inner.decrement_tag(owner_id, label, by).await
    }
    async fn tag_usage(&self, owner_id: Uuid, label: &str) -> Result<Option<i64>, BrainError> {
        self.inner.tag_usage(owner_id, label).await
    }
    async fn list_templates(&self, _owner_id: Uuid) -> Result<Vec<Template>, BrainError> {
        Err(read_failure("templates"))
    }
    async fn set_template_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), BrainError> {
        self.inner.set_template_embedding(id, embedding).await
    }
    async fn record_template_use(&self, id: Uuid, engagement: Option<f64>) -> Result<(), BrainError> {
        self.inner.record_template_use(id, engagement).await
    }
    async fn insert_idea(&self, idea: &NewIdea) -> Result<Uuid, BrainError> {
        self.inner.insert_idea(idea).await
    }
    async fn get_idea(&self, id: Uuid) -> Result<Option<ContentIdea>, BrainError> {
        self.inner.get_idea(id).await
    }
    async fn delete_ideas_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        self.inner.delete_ideas_for_document(document_id).await
    }
    async fn transition_idea(
        &self,
        id: Uuid,
        from: IdeaStatus,
        to: IdeaStatus,
    ) -> Result<bool, BrainError> {
        self.inner.transition_idea(id, from, to).await
    }
    async fn insert_draft(&self, draft: &DraftRecord) -> Result<Uuid, BrainError> {
        self.inner.insert_draft(draft).await
    }
    async fn get_voice_profile(
        &self,
        _owner_id: Uuid,
        _speaker: &str,
    ) -> Result<Option<VoiceProfile>, BrainError> {
        Err(read_failure("voice_profiles"))
    }
    async fn insert_edit_record(&self, record: &EditRecord) -> Result<Uuid, BrainError> {
        self.inner.insert_edit_record(record).await
    }
    async fn insert_performance_record(
        &self,
        record: &PerformanceRecord,
    ) -> Result<bool, BrainError> {
        self.inner.insert_performance_record(record).await
    }
    async fn latest_performance(&self, owner_id: Uuid) -> Result<Vec<PerformanceRecord>, BrainError> {
        self.inner.latest_performance(owner_id).await
    }
    async fn replace_patterns(
        &self,
        owner_id: Uuid,
        patterns: &[PerformancePattern],
    ) -> Result<usize, BrainError> {
        self.inner.replace_patterns(owner_id, patterns).await
    }
    async fn list_patterns(&self, _owner_id: Uuid) -> Result<Vec<PerformancePattern>, BrainError> {
        Err(read_failure("performance_patterns"))
    }
}
