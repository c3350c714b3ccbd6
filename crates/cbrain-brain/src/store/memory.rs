use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use cbrain_core::{
    ContentIdea, IdeaStatus, KnowledgeEntry, NewKnowledgeEntry, PerformancePattern,
    PerformanceRecord, SourceDocument, Template, Topic, VoiceProfile,
};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BrainStore, DraftRecord, EditRecord, EntryFilter, EntryUpdate, NewDocument, NewIdea};
use crate::BrainError;

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, SourceDocument>,
    entries: HashMap<Uuid, KnowledgeEntry>,
    topics: BTreeMap<(Uuid, String), Topic>,
    tags: BTreeMap<(Uuid, String), i64>,
    templates: Vec<Template>,
    ideas: HashMap<Uuid, ContentIdea>,
    drafts: Vec<DraftRecord>,
    voices: Vec<VoiceProfile>,
    edits: Vec<EditRecord>,
    performance: Vec<PerformanceRecord>,
    patterns: HashMap<Uuid, Vec<PerformancePattern>>,
}

/// Process-local [`BrainStore`]. Every operation holds one lock, so counter
/// updates are atomic just as in Postgres.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_template(&self, template: Template) {
        self.state.lock().await.templates.push(template);
    }

    pub async fn add_voice_profile(&self, profile: VoiceProfile) {
        self.state.lock().await.voices.push(profile);
    }

    pub async fn drafts(&self) -> Vec<DraftRecord> {
        self.state.lock().await.drafts.clone()
    }

    pub async fn edit_records(&self) -> Vec<EditRecord> {
        self.state.lock().await.edits.clone()
    }

    pub async fn topic(&self, owner_id: Uuid, slug: &str) -> Option<Topic> {
        self.state
            .lock()
            .await
            .topics
            .get(&(owner_id, slug.to_string()))
            .cloned()
    }
}

fn matches_filter(entry: &KnowledgeEntry, filter: &EntryFilter) -> bool {
    let in_scope = entry.owner_id == filter.owner_id
        || (filter.team_id.is_some() && entry.team_id == filter.team_id);
    if !in_scope {
        return false;
    }
    if filter.category.as_ref().is_some_and(|c| *c != entry.category) {
        return false;
    }
    if filter
        .speaker
        .as_ref()
        .is_some_and(|s| entry.speaker.as_ref() != Some(s))
    {
        return false;
    }
    if filter.tag.as_ref().is_some_and(|t| !entry.tags.contains(t)) {
        return false;
    }
    if filter.topic.as_ref().is_some_and(|t| !entry.topics.contains(t)) {
        return false;
    }
    if filter
        .knowledge_type
        .is_some_and(|k| k != entry.knowledge_type)
    {
        return false;
    }
    if filter.min_quality.is_some_and(|q| entry.quality_score < q) {
        return false;
    }
    if filter.since.is_some_and(|since| entry.created_at < since) {
        return false;
    }
    filter.keywords.is_empty() || keyword_hits(entry, &filter.keywords) > 0
}

fn keyword_hits(entry: &KnowledgeEntry, keywords: &[String]) -> usize {
    let haystack = format!(
        "{} {} {}",
        entry.content,
        entry.context.as_deref().unwrap_or_default(),
        entry.category
    )
    .to_lowercase();
    keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count()
}

#[async_trait]
impl BrainStore for InMemoryStore {
    async fn insert_document(&self, document: &NewDocument) -> Result<Uuid, BrainError> {
        let id = Uuid::new_v4();
        let doc = SourceDocument {
            id,
            owner_id: document.owner_id,
            team_id: document.team_id,
            title: document.title.clone(),
            raw_text: document.raw_text.clone(),
            speaker_hint: document.speaker_hint.clone(),
            knowledge_extracted_at: None,
            ideas_extracted_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.documents.insert(id, doc);
        Ok(id)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<SourceDocument>, BrainError> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn mark_knowledge_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        if let Some(doc) = self.state.lock().await.documents.get_mut(&id) {
            doc.knowledge_extracted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_ideas_extracted(&self, id: Uuid) -> Result<(), BrainError> {
        if let Some(doc) = self.state.lock().await.documents.get_mut(&id) {
            doc.ideas_extracted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn clear_extraction_timestamps(&self, id: Uuid) -> Result<(), BrainError> {
        let mut state = self.state.lock().await;
        let doc = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| BrainError::not_found("document", id))?;
        doc.knowledge_extracted_at = None;
        doc.ideas_extracted_at = None;
        Ok(())
    }

    async fn insert_entry(&self, entry: &NewKnowledgeEntry) -> Result<Uuid, BrainError> {
        if !(1..=5).contains(&entry.quality_score) {
            return Err(BrainError::Validation(format!(
                "quality_score {} out of range",
                entry.quality_score
            )));
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        let stored = KnowledgeEntry {
            id,
            owner_id: entry.owner_id,
            team_id: entry.team_id,
            source_document_id: entry.source_document_id,
            category: entry.category.clone(),
            knowledge_type: entry.knowledge_type,
            speaker: entry.speaker.clone(),
            content: entry.content.clone(),
            context: entry.context.clone(),
            tags: entry.tags.clone(),
            topics: entry.topics.clone(),
            quality_score: entry.quality_score,
            specificity: entry.specificity,
            actionability: entry.actionability,
            embedding: entry.embedding.clone(),
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.entries.insert(id, stored);
        Ok(id)
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<KnowledgeEntry>, BrainError> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn update_entry(&self, id: Uuid, update: &EntryUpdate) -> Result<(), BrainError> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or_else(|| BrainError::not_found("knowledge entry", id))?;
        entry.category.clone_from(&update.category);
        entry.content.clone_from(&update.content);
        entry.context.clone_from(&update.context);
        entry.tags.clone_from(&update.tags);
        entry.embedding.clone_from(&update.embedding);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_entry(&self, id: Uuid) -> Result<Vec<String>, BrainError> {
        self.state
            .lock()
            .await
            .entries
            .remove(&id)
            .map(|e| e.tags)
            .ok_or_else(|| BrainError::not_found("knowledge entry", id))
    }

    async fn entry_tags_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<Vec<String>>, BrainError> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.source_document_id == Some(document_id))
            .map(|e| e.tags.clone())
            .collect())
    }

    async fn delete_entries_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| e.source_document_id != Some(document_id));
        Ok((before - state.entries.len()) as u64)
    }

    async fn search_entries(&self, filter: &EntryFilter) -> Result<Vec<KnowledgeEntry>, BrainError> {
        let state = self.state.lock().await;
        let mut rows: Vec<KnowledgeEntry> = state
            .entries
            .values()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            keyword_hits(b, &filter.keywords)
                .cmp(&keyword_hits(a, &filter.keywords))
                .then(b.quality_score.cmp(&a.quality_score))
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(rows
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(0))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .collect())
    }

    async fn list_topics(&self, owner_id: Uuid) -> Result<Vec<Topic>, BrainError> {
        let state = self.state.lock().await;
        let mut topics: Vec<Topic> = state
            .topics
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        topics.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then(a.slug.cmp(&b.slug)));
        Ok(topics)
    }

    async fn increment_topic(
        &self,
        owner_id: Uuid,
        slug: &str,
        label: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, BrainError> {
        let mut state = self.state.lock().await;
        let topic = state
            .topics
            .entry((owner_id, slug.to_string()))
            .or_insert_with(|| Topic {
                owner_id,
                slug: slug.to_string(),
                label: label.to_string(),
                usage_count: 0,
                embedding: None,
            });
        topic.usage_count += 1;
        if topic.embedding.is_none() {
            topic.embedding = embedding.map(<[f32]>::to_vec);
        }
        Ok(topic.usage_count)
    }

    async fn increment_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        let mut state = self.state.lock().await;
        let count = state.tags.entry((owner_id, label.to_string())).or_insert(0);
        *count += by;
        Ok(*count)
    }

    async fn decrement_tag(&self, owner_id: Uuid, label: &str, by: i64) -> Result<i64, BrainError> {
        let mut state = self.state.lock().await;
        let count = state
            .tags
            .get_mut(&(owner_id, label.to_string()))
            .ok_or_else(|| BrainError::Consistency(format!("tag '{label}' has no counter")))?;
        *count = (*count - by).max(0);
        Ok(*count)
    }

    async fn tag_usage(&self, owner_id: Uuid, label: &str) -> Result<Option<i64>, BrainError> {
        Ok(self
            .state
            .lock()
            .await
            .tags
            .get(&(owner_id, label.to_string()))
            .copied())
    }

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<Template>, BrainError> {
        let state = self.state.lock().await;
        let mut templates: Vec<Template> = state
            .templates
            .iter()
            .filter(|t| t.owner_id.is_none() || t.owner_id == Some(owner_id))
            .cloned()
            .collect();
        templates.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then(a.name.cmp(&b.name)));
        Ok(templates)
    }

    async fn set_template_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<(), BrainError> {
        let mut state = self.state.lock().await;
        if let Some(template) = state.templates.iter_mut().find(|t| t.id == id) {
            template.embedding = Some(embedding.to_vec());
        }
        Ok(())
    }

    async fn record_template_use(&self, id: Uuid, engagement: Option<f64>) -> Result<(), BrainError> {
        let mut state = self.state.lock().await;
        let template = state
            .templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BrainError::not_found("template", id))?;
        if let Some(score) = engagement {
            #[allow(clippy::cast_precision_loss)]
            let n = template.usage_count as f64;
            template.avg_engagement_score = (template.avg_engagement_score * n + score) / (n + 1.0);
        }
        template.usage_count += 1;
        Ok(())
    }

    async fn insert_idea(&self, idea: &NewIdea) -> Result<Uuid, BrainError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let stored = ContentIdea {
            id,
            owner_id: idea.owner_id,
            source_document_id: idea.source_document_id,
            title: idea.title.clone(),
            core_insight: idea.core_insight.clone(),
            hook: idea.hook.clone(),
            content_pillar: idea.content_pillar.clone(),
            speaker: idea.speaker.clone(),
            status: IdeaStatus::Extracted,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.ideas.insert(id, stored);
        Ok(id)
    }

    async fn get_idea(&self, id: Uuid) -> Result<Option<ContentIdea>, BrainError> {
        Ok(self.state.lock().await.ideas.get(&id).cloned())
    }

    async fn delete_ideas_for_document(&self, document_id: Uuid) -> Result<u64, BrainError> {
        let mut state = self.state.lock().await;
        let before = state.ideas.len();
        state
            .ideas
            .retain(|_, i| i.source_document_id != Some(document_id));
        Ok((before - state.ideas.len()) as u64)
    }

    async fn transition_idea(
        &self,
        id: Uuid,
        from: IdeaStatus,
        to: IdeaStatus,
    ) -> Result<bool, BrainError> {
        let mut state = self.state.lock().await;
        match state.ideas.get_mut(&id) {
            Some(idea) if idea.status == from => {
                idea.status = to;
                idea.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_draft(&self, draft: &DraftRecord) -> Result<Uuid, BrainError> {
        self.state.lock().await.drafts.push(draft.clone());
        Ok(Uuid::new_v4())
    }

    async fn get_voice_profile(
        &self,
        owner_id: Uuid,
        speaker: &str,
    ) -> Result<Option<VoiceProfile>, BrainError> {
        Ok(self
            .state
            .lock()
            .await
            .voices
            .iter()
            .find(|v| v.owner_id == owner_id && v.speaker.eq_ignore_ascii_case(speaker))
            .cloned())
    }

    async fn insert_edit_record(&self, record: &EditRecord) -> Result<Uuid, BrainError> {
        self.state.lock().await.edits.push(record.clone());
        Ok(Uuid::new_v4())
    }

    async fn insert_performance_record(
        &self,
        record: &PerformanceRecord,
    ) -> Result<bool, BrainError> {
        let mut state = self.state.lock().await;
        let duplicate = state
            .performance
            .iter()
            .any(|r| r.post_id == record.post_id && r.captured_at == record.captured_at);
        if duplicate {
            return Ok(false);
        }
        state.performance.push(record.clone());
        Ok(true)
    }

    async fn latest_performance(&self, owner_id: Uuid) -> Result<Vec<PerformanceRecord>, BrainError> {
        let state = self.state.lock().await;
        let mut latest: BTreeMap<(Uuid, String), PerformanceRecord> = BTreeMap::new();
        for record in state.performance.iter().filter(|r| r.owner_id == owner_id) {
            let key = (record.post_id, record.platform.clone());
            match latest.get(&key) {
                Some(existing) if existing.captured_at >= record.captured_at => {}
                _ => {
                    latest.insert(key, record.clone());
                }
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn replace_patterns(
        &self,
        owner_id: Uuid,
        patterns: &[PerformancePattern],
    ) -> Result<usize, BrainError> {
        self.state
            .lock()
            .await
            .patterns
            .insert(owner_id, patterns.to_vec());
        Ok(patterns.len())
    }

    async fn list_patterns(&self, owner_id: Uuid) -> Result<Vec<PerformancePattern>, BrainError> {
        Ok(self
            .state
            .lock()
            .await
            .patterns
            .get(&owner_id)
            .cloned()
            .unwrap_or_default())
    }
}
