//! Turning transcripts into classified, persisted knowledge entries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use cbrain_ai::{parse_model_json, EmbeddingProvider, LanguageModel, ModelOutput};
use cbrain_core::{
    embedding_text, normalize_tag, Actionability, KnowledgeEntry, KnowledgeType,
    NewKnowledgeEntry, Scope,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::segment::{split_segments, Segment};
use crate::store::{BrainStore, EntryUpdate};
use crate::topics::TopicNormalizer;
use crate::BrainError;

/// Quality assigned when the model's score is missing or non-numeric.
pub const DEFAULT_QUALITY_SCORE: i16 = 3;
const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Segments per model call.
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_secs(1),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4_096,
        }
    }
}

/// Outcome of [`Extractor::reprocess`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReprocessReport {
    pub entries_removed: u64,
    pub ideas_removed: u64,
    /// Tag label to the amount its usage count was decremented by.
    pub tag_decrements: BTreeMap<String, i64>,
    pub entries: Vec<KnowledgeEntry>,
}

/// Fields of an entry a human may edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub content: Option<String>,
    /// `Some(None)` clears the context.
    pub context: Option<Option<String>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub struct Extractor {
    pub(crate) store: Arc<dyn BrainStore>,
    pub(crate) llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    normalizer: TopicNormalizer,
    pub(crate) settings: ExtractorSettings,
}

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchResponse {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "entries", alias = "knowledge")]
        items: Vec<Value>,
    },
}

impl BatchResponse {
    fn into_items(self) -> Vec<Value> {
        match self {
            BatchResponse::List(items) | BatchResponse::Wrapped { items } => items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    #[serde(default)]
    segment: Option<Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "type")]
    knowledge_type: Option<String>,
    #[serde(default)]
    quality_score: Option<Value>,
    #[serde(default)]
    specificity: Option<Value>,
    #[serde(default)]
    actionability: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    topics: Option<Value>,
}

/// A model item that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidItem {
    pub category: String,
    pub knowledge_type: KnowledgeType,
    pub content: String,
    pub context: Option<String>,
    pub speaker: Option<String>,
    pub tags: Vec<String>,
    pub topic_suggestions: Vec<String>,
    pub quality_score: i16,
    pub specificity: bool,
    pub actionability: Actionability,
}

/// Round half away from zero and clamp into `1..=5`. Anything non-numeric
/// becomes [`DEFAULT_QUALITY_SCORE`].
#[must_use]
pub fn quality_score_from(value: Option<&Value>) -> i16 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        #[allow(clippy::cast_possible_truncation)]
        Some(score) if score.is_finite() => score.round().clamp(1.0, 5.0) as i16,
        _ => DEFAULT_QUALITY_SCORE,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Normalize, drop blanks and de-duplicate tags, keeping first-seen order.
pub(crate) fn clean_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Validate one model item. The segment list supplies the speaker when the
/// item does not name one.
pub(crate) fn validate_item(
    value: Value,
    segments: &[Segment],
    speaker_hint: Option<&str>,
) -> Result<ValidItem, BrainError> {
    let raw: RawItem = serde_json::from_value(value)
        .map_err(|e| BrainError::Validation(format!("item is not an object: {e}")))?;

    let content = non_blank(raw.content)
        .ok_or_else(|| BrainError::Validation("item has empty content".to_string()))?;

    let type_label = raw.knowledge_type.unwrap_or_default();
    let knowledge_type: KnowledgeType = type_label
        .parse()
        .map_err(|_| BrainError::Validation(format!("unknown knowledge_type '{type_label}'")))?;

    let segment_speaker = raw
        .segment
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| segments.get(idx))
        .and_then(|seg| seg.speaker.clone());

    let speaker = non_blank(raw.speaker)
        .or(segment_speaker)
        .or_else(|| speaker_hint.map(str::to_string));

    Ok(ValidItem {
        category: non_blank(raw.category)
            .map_or_else(|| DEFAULT_CATEGORY.to_string(), |c| c.to_lowercase()),
        knowledge_type,
        content,
        context: non_blank(raw.context),
        speaker,
        tags: clean_tags(string_list(raw.tags.as_ref())),
        topic_suggestions: string_list(raw.topics.as_ref()),
        quality_score: quality_score_from(raw.quality_score.as_ref()),
        specificity: truthy(raw.specificity.as_ref()),
        actionability: Actionability::parse_or_default(raw.actionability.as_deref()),
    })
}

fn extraction_prompt(segments: &[Segment]) -> String {
    let types = KnowledgeType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = format!(
        "You extract reusable business knowledge from a call transcript.\n\
         For every numbered segment that contains a concrete insight, return one JSON object with:\n\
         - segment: the segment number\n\
         - content: the insight restated in one or two standalone sentences\n\
         - context: optional background needed to understand it\n\
         - category: a short lowercase area such as sales, marketing, hiring, operations\n\
         - knowledge_type: one of {types}\n\
         - quality_score: 1 (generic) to 5 (specific, proven, reusable)\n\
         - specificity: true if it names concrete numbers, steps or examples\n\
         - actionability: immediately_actionable, contextual or theoretical\n\
         - speaker: who said it, if known\n\
         - tags: up to five short lowercase keywords\n\
         - topics: one to three short topic labels\n\
         Skip small talk and logistics. Respond with a JSON array only.\n\nSegments:\n"
    );
    for (idx, segment) in segments.iter().enumerate() {
        match &segment.speaker {
            Some(speaker) => prompt.push_str(&format!("[{}] ({speaker}) {}\n", idx + 1, segment.text)),
            None => prompt.push_str(&format!("[{}] {}\n", idx + 1, segment.text)),
        }
    }
    prompt
}

impl Extractor {
    #[must_use]
    pub fn new(
        store: Arc<dyn BrainStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        topic_threshold: f32,
        settings: ExtractorSettings,
    ) -> Self {
        let normalizer = TopicNormalizer::new(Arc::clone(&store), embedder.clone(), topic_threshold);
        Self {
            store,
            llm,
            embedder,
            normalizer,
            settings,
        }
    }

    /// Extract and persist knowledge from plain text.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::ExternalService`] if a model call fails; entries
    /// from earlier batches stay persisted. Store failures are returned as
    /// [`BrainError::Store`].
    pub async fn extract(&self, raw_text: &str, scope: &Scope) -> Result<Vec<KnowledgeEntry>, BrainError> {
        self.extract_text(raw_text, scope, None, None).await
    }

    /// Extract a stored document and stamp `knowledge_extracted_at`.
    ///
    /// A document that is already stamped is skipped. Entries left behind by
    /// an interrupted earlier attempt are removed first, so the call can be
    /// retried safely.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown document, otherwise as
    /// [`Extractor::extract`].
    pub async fn extract_document(&self, document_id: Uuid) -> Result<Vec<KnowledgeEntry>, BrainError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| BrainError::not_found("document", document_id))?;

        if document.knowledge_extracted_at.is_some() {
            tracing::info!(document_id = %document_id, "knowledge already extracted, skipping");
            return Ok(Vec::new());
        }

        let (leftover, _) = self
            .remove_document_entries(document_id, document.owner_id)
            .await?;
        if leftover > 0 {
            tracing::warn!(
                document_id = %document_id,
                leftover,
                "removed entries from an interrupted extraction"
            );
        }

        let scope = Scope {
            owner_id: document.owner_id,
            team_id: document.team_id,
        };
        let entries = self
            .extract_text(
                &document.raw_text,
                &scope,
                Some(document_id),
                document.speaker_hint.as_deref(),
            )
            .await?;

        self.store.mark_knowledge_extracted(document_id).await?;
        tracing::info!(
            document_id = %document_id,
            entries = entries.len(),
            "knowledge extraction complete"
        );
        Ok(entries)
    }

    /// Delete a document's derived entries and ideas, give back their tag
    /// usage, clear the extraction stamps and extract again.
    ///
    /// The delete, decrement and clear steps are not atomic with each other;
    /// failed decrements are logged and do not stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown document, otherwise as
    /// [`Extractor::extract`].
    pub async fn reprocess(&self, document_id: Uuid) -> Result<ReprocessReport, BrainError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| BrainError::not_found("document", document_id))?;

        let (entries_removed, tag_decrements) = self
            .remove_document_entries(document_id, document.owner_id)
            .await?;
        let ideas_removed = self.store.delete_ideas_for_document(document_id).await?;
        self.store.clear_extraction_timestamps(document_id).await?;

        tracing::info!(
            document_id = %document_id,
            entries_removed,
            ideas_removed,
            "cleared document for reprocessing"
        );

        let entries = self.extract_document(document_id).await?;
        Ok(ReprocessReport {
            entries_removed,
            ideas_removed,
            tag_decrements,
            entries,
        })
    }

    /// Apply a manual edit. Content or context changes re-embed the entry;
    /// tag changes adjust usage counts.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown entry or
    /// [`BrainError::Validation`] if the new content is blank.
    pub async fn update_entry(&self, id: Uuid, patch: EntryPatch) -> Result<KnowledgeEntry, BrainError> {
        let mut entry = self
            .store
            .get_entry(id)
            .await?
            .ok_or_else(|| BrainError::not_found("knowledge entry", id))?;

        let old_tags = entry.tags.clone();
        let mut text_changed = false;

        if let Some(content) = patch.content {
            let content = content.trim().to_string();
            if content.is_empty() {
                return Err(BrainError::Validation("content must not be empty".to_string()));
            }
            text_changed |= content != entry.content;
            entry.content = content;
        }
        if let Some(context) = patch.context {
            let context = non_blank(context);
            text_changed |= context != entry.context;
            entry.context = context;
        }
        if let Some(category) = patch.category {
            if let Some(category) = non_blank(Some(category)) {
                entry.category = category.to_lowercase();
            }
        }
        if let Some(tags) = patch.tags {
            entry.tags = clean_tags(tags);
        }

        if text_changed {
            entry.embedding = self.embed_one(&entry.embedding_text()).await;
        }

        self.store
            .update_entry(
                id,
                &EntryUpdate {
                    category: entry.category.clone(),
                    content: entry.content.clone(),
                    context: entry.context.clone(),
                    tags: entry.tags.clone(),
                    embedding: entry.embedding.clone(),
                },
            )
            .await?;

        for tag in entry.tags.iter().filter(|t| !old_tags.contains(t)) {
            if let Err(e) = self.store.increment_tag(entry.owner_id, tag, 1).await {
                tracing::warn!(tag = %tag, error = %e, "tag increment failed");
            }
        }
        for tag in old_tags.iter().filter(|t| !entry.tags.contains(t)) {
            if let Err(e) = self.store.decrement_tag(entry.owner_id, tag, 1).await {
                tracing::warn!(tag = %tag, error = %e, "tag decrement failed");
            }
        }

        entry.updated_at = Utc::now();
        Ok(entry)
    }

    /// Delete one entry and give back its tag usage.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown entry.
    pub async fn delete_entry(&self, id: Uuid) -> Result<(), BrainError> {
        let entry = self
            .store
            .get_entry(id)
            .await?
            .ok_or_else(|| BrainError::not_found("knowledge entry", id))?;
        let tags = self.store.delete_entry(id).await?;
        for tag in &tags {
            if let Err(e) = self.store.decrement_tag(entry.owner_id, tag, 1).await {
                tracing::warn!(tag = %tag, error = %e, "tag decrement failed");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn extract_text(
        &self,
        raw_text: &str,
        scope: &Scope,
        source_document_id: Option<Uuid>,
        speaker_hint: Option<&str>,
    ) -> Result<Vec<KnowledgeEntry>, BrainError> {
        let segments = split_segments(raw_text);
        if segments.is_empty() {
            tracing::info!(owner_id = %scope.owner_id, "no extractable segments in text");
            return Ok(Vec::new());
        }

        let batch_size = self.settings.batch_size.max(1);
        let mut entries = Vec::new();
        for (batch_idx, batch) in segments.chunks(batch_size).enumerate() {
            if batch_idx > 0 && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
            }
            let items = self.classify_batch(batch, speaker_hint).await?;
            tracing::debug!(batch = batch_idx, valid = items.len(), "classified batch");
            let persisted = self
                .persist_items(items, scope, source_document_id)
                .await?;
            entries.extend(persisted);
        }
        Ok(entries)
    }

    async fn classify_batch(
        &self,
        segments: &[Segment],
        speaker_hint: Option<&str>,
    ) -> Result<Vec<ValidItem>, BrainError> {
        let prompt = extraction_prompt(segments);
        let completion = self
            .llm
            .complete(&prompt, &self.settings.model, self.settings.max_tokens)
            .await?;

        let items = match parse_model_json::<BatchResponse>(&completion) {
            ModelOutput::Parsed(response) => response.into_items(),
            ModelOutput::Unparseable { reason } => {
                tracing::warn!(reason = %reason, "unparseable extraction batch, skipping");
                return Ok(Vec::new());
            }
        };

        Ok(items
            .into_iter()
            .filter_map(|item| match validate_item(item, segments, speaker_hint) {
                Ok(valid) => Some(valid),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping extracted item");
                    None
                }
            })
            .collect())
    }

    async fn persist_items(
        &self,
        items: Vec<ValidItem>,
        scope: &Scope,
        source_document_id: Option<Uuid>,
    ) -> Result<Vec<KnowledgeEntry>, BrainError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = items
            .iter()
            .map(|i| embedding_text(&i.content, i.context.as_deref()))
            .collect();
        let mut embeddings = self.embed_many(&texts).await.into_iter();

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let embedding = embeddings.next().flatten();
            let topics = self
                .normalizer
                .normalize(&item.topic_suggestions, &item.content, scope.owner_id)
                .await?;

            let new_entry = NewKnowledgeEntry {
                owner_id: scope.owner_id,
                team_id: scope.team_id,
                source_document_id,
                category: item.category,
                knowledge_type: item.knowledge_type,
                speaker: item.speaker,
                content: item.content,
                context: item.context,
                tags: item.tags,
                topics,
                quality_score: item.quality_score,
                specificity: item.specificity,
                actionability: item.actionability,
                embedding,
            };
            let id = self.store.insert_entry(&new_entry).await?;

            for tag in &new_entry.tags {
                if let Err(e) = self.store.increment_tag(scope.owner_id, tag, 1).await {
                    tracing::warn!(tag = %tag, error = %e, "tag increment failed");
                }
            }

            let now = Utc::now();
            entries.push(KnowledgeEntry {
                id,
                owner_id: new_entry.owner_id,
                team_id: new_entry.team_id,
                source_document_id: new_entry.source_document_id,
                category: new_entry.category,
                knowledge_type: new_entry.knowledge_type,
                speaker: new_entry.speaker,
                content: new_entry.content,
                context: new_entry.context,
                tags: new_entry.tags,
                topics: new_entry.topics,
                quality_score: new_entry.quality_score,
                specificity: new_entry.specificity,
                actionability: new_entry.actionability,
                embedding: new_entry.embedding,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(entries)
    }

    /// Delete a document's entries and decrement each tag by its multiplicity.
    async fn remove_document_entries(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
    ) -> Result<(u64, BTreeMap<String, i64>), BrainError> {
        let tag_lists = self.store.entry_tags_for_document(document_id).await?;
        let removed = self.store.delete_entries_for_document(document_id).await?;

        let mut decrements: BTreeMap<String, i64> = BTreeMap::new();
        for tag in tag_lists.into_iter().flatten() {
            *decrements.entry(tag).or_insert(0) += 1;
        }
        for (tag, by) in &decrements {
            if let Err(e) = self.store.decrement_tag(owner_id, tag, *by).await {
                tracing::warn!(tag = %tag, by, error = %e, "tag decrement failed");
            }
        }
        Ok((removed, decrements))
    }

    /// One embedding per text, or all `None` when embeddings are unavailable.
    async fn embed_many(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let Some(embedder) = &self.embedder else {
            return vec![None; texts.len()];
        };
        match embedder.embed(texts).await {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, persisting without vectors");
                vec![None; texts.len()]
            }
        }
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_many(&[text.to_string()]).await.pop().flatten()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn quality_rounds_half_away_from_zero_and_clamps() {
        assert_eq!(quality_score_from(Some(&json!(3.7))), 4);
        assert_eq!(quality_score_from(Some(&json!(2.5))), 3);
        assert_eq!(quality_score_from(Some(&json!(7))), 5);
        assert_eq!(quality_score_from(Some(&json!(0))), 1);
        assert_eq!(quality_score_from(Some(&json!(-3))), 1);
        assert_eq!(quality_score_from(Some(&json!("4.2"))), 4);
    }

    #[test]
    fn non_numeric_quality_defaults_to_three() {
        assert_eq!(quality_score_from(Some(&json!("high"))), 3);
        assert_eq!(quality_score_from(Some(&json!(null))), 3);
        assert_eq!(quality_score_from(None), 3);
    }

    #[test]
    fn item_with_unknown_type_is_rejected() {
        let item = json!({"content": "x", "knowledge_type": "rumour"});
        assert!(matches!(
            validate_item(item, &[], None),
            Err(BrainError::Validation(_))
        ));
    }

    #[test]
    fn item_with_empty_content_is_rejected() {
        let item = json!({"content": "   ", "knowledge_type": "insight"});
        assert!(validate_item(item, &[], None).is_err());
    }

    #[test]
    fn item_defaults_actionability_and_takes_segment_speaker() {
        let segments = vec![Segment {
            speaker: Some("Dana".to_string()),
            text: "Anchor high on every first call with a new buyer.".to_string(),
        }];
        let item = json!({
            "segment": 1,
            "content": "Anchor high on the first call.",
            "knowledge_type": "How-To",
            "actionability": "sometimes",
            "tags": ["Pricing", "pricing ", ""],
            "topics": "pricing, negotiation",
            "specificity": "yes"
        });
        let valid = validate_item(item, &segments, Some("Host")).unwrap();
        assert_eq!(valid.knowledge_type, KnowledgeType::HowTo);
        assert_eq!(valid.actionability, Actionability::Contextual);
        assert_eq!(valid.speaker.as_deref(), Some("Dana"));
        assert_eq!(valid.tags, vec!["pricing"]);
        assert_eq!(valid.topic_suggestions.len(), 2);
        assert!(valid.specificity);
        assert_eq!(valid.category, "general");
        assert_eq!(valid.quality_score, DEFAULT_QUALITY_SCORE);
    }

    #[test]
    fn prompt_numbers_segments_and_lists_types() {
        let segments = vec![Segment {
            speaker: None,
            text: "We doubled reply rates by cutting the email to three lines.".to_string(),
        }];
        let prompt = extraction_prompt(&segments);
        assert!(prompt.contains("[1] We doubled"));
        assert!(prompt.contains("market_intel"));
    }
}
