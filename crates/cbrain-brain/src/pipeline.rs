//! Wiring of the pipeline components and the post-writing orchestration.

use std::sync::Arc;
use std::time::Duration;

use cbrain_ai::{AiError, AnthropicClient, EmbeddingProvider, LanguageModel, TeiEmbedder};
use cbrain_core::{AppConfig, ContentIdea, IdeaStatus, Scope};
use serde::Serialize;
use uuid::Uuid;

use crate::analyzer::PerformanceAnalyzer;
use crate::briefing::{BriefingAgent, BriefingSettings};
use crate::cache::EmbeddingCache;
use crate::edits::EditClassifier;
use crate::extractor::{Extractor, ExtractorSettings};
use crate::ideas::transition_idea;
use crate::matcher::TemplateMatcher;
use crate::retrieval::Retriever;
use crate::store::{BrainStore, DraftRecord, PgStore};
use crate::topics::DEFAULT_TOPIC_SIMILARITY_THRESHOLD;
use crate::writer::PostWriter;
use crate::BrainError;

/// Tunables for [`ContentBrain`].
#[derive(Debug, Clone)]
pub struct BrainSettings {
    pub extractor: ExtractorSettings,
    pub briefing: BriefingSettings,
    pub topic_similarity_threshold: f32,
    pub template_cache_ttl: Duration,
    pub template_cache_capacity: usize,
    /// Model for cheap calls: edit classification and insights.
    pub fast_model: String,
    pub writer_max_tokens: u32,
}

impl Default for BrainSettings {
    fn default() -> Self {
        Self {
            extractor: ExtractorSettings::default(),
            briefing: BriefingSettings::default(),
            topic_similarity_threshold: DEFAULT_TOPIC_SIMILARITY_THRESHOLD,
            template_cache_ttl: Duration::from_secs(3_600),
            template_cache_capacity: 256,
            fast_model: "claude-haiku-4-5".to_string(),
            writer_max_tokens: 2_048,
        }
    }
}

impl BrainSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            extractor: ExtractorSettings {
                batch_size: config.extract_batch_size,
                inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
                model: config.llm_model.clone(),
                ..defaults.extractor
            },
            briefing: BriefingSettings {
                context_budget: config.context_budget_chars,
                template_min_similarity: config.template_min_similarity,
                ..defaults.briefing
            },
            topic_similarity_threshold: config.topic_similarity_threshold,
            template_cache_ttl: Duration::from_secs(config.template_cache_ttl_secs),
            template_cache_capacity: config.template_cache_capacity,
            fast_model: config.llm_fast_model.clone(),
            writer_max_tokens: defaults.writer_max_tokens,
        }
    }
}

/// The TEI client when embeddings are configured and enabled, else `None`.
///
/// # Errors
///
/// Returns [`BrainError::ExternalService`] if the HTTP client cannot be built.
pub fn embedder_from_app_config(
    config: &AppConfig,
) -> Result<Option<Arc<dyn EmbeddingProvider>>, BrainError> {
    let Some(url) = config.tei_url.as_deref().filter(|_| config.embeddings_active()) else {
        tracing::info!("embeddings disabled; retrieval uses keyword search");
        return Ok(None);
    };
    let embedder = TeiEmbedder::new(
        url,
        config.request_timeout_secs,
        config.provider_max_retries,
        config.provider_backoff_base_ms,
    )?;
    Ok(Some(Arc::new(embedder)))
}

/// Result of [`ContentBrain::write_post`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WritePostOutcome {
    pub idea_id: Uuid,
    pub draft_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub hook_score: Option<i16>,
    /// Stages that were skipped without failing the run.
    pub skipped_stages: Vec<String>,
}

/// Every pipeline component, sharing one store and one set of providers.
pub struct ContentBrain {
    store: Arc<dyn BrainStore>,
    extractor: Extractor,
    retriever: Arc<Retriever>,
    matcher: Arc<TemplateMatcher>,
    cache: Arc<EmbeddingCache>,
    briefing: BriefingAgent,
    writer: PostWriter,
    classifier: EditClassifier,
    analyzer: PerformanceAnalyzer,
}

impl ContentBrain {
    /// Postgres-backed pipeline with the Anthropic client and, when
    /// configured, the TEI embedder.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::ExternalService`] if `CBRAIN_LLM_API_KEY` is not
    /// set or a provider client cannot be built.
    pub fn from_app_config(pool: sqlx::PgPool, config: &AppConfig) -> Result<Self, BrainError> {
        let api_key = config
            .llm_api_key
            .as_deref()
            .ok_or_else(|| AiError::Config("CBRAIN_LLM_API_KEY is not set".to_string()))?;
        let llm = AnthropicClient::with_base_url(
            api_key,
            config.request_timeout_secs,
            config.provider_max_retries,
            config.provider_backoff_base_ms,
            &config.llm_base_url,
        )?;
        Ok(Self::new(
            Arc::new(PgStore::new(pool)),
            Arc::new(llm),
            embedder_from_app_config(config)?,
            BrainSettings::from_app_config(config),
        ))
    }

    /// `embedder` is `None` when embeddings are disabled; every component
    /// then takes its non-semantic path.
    #[must_use]
    pub fn new(
        store: Arc<dyn BrainStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        settings: BrainSettings,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(Arc::clone(&store), embedder.clone()));
        let matcher = Arc::new(TemplateMatcher::new(Arc::clone(&store), embedder.clone()));
        let cache = Arc::new(EmbeddingCache::new(
            settings.template_cache_ttl,
            settings.template_cache_capacity,
        ));
        let briefing = BriefingAgent::new(
            Arc::clone(&store),
            Arc::clone(&retriever),
            Arc::clone(&matcher),
            Arc::clone(&cache),
            settings.briefing,
        );
        let writer = PostWriter::new(
            Arc::clone(&llm),
            settings.extractor.model.clone(),
            settings.writer_max_tokens,
        );
        let classifier = EditClassifier::new(
            Arc::clone(&store),
            Arc::clone(&llm),
            settings.fast_model.clone(),
        );
        let analyzer = PerformanceAnalyzer::new(
            Arc::clone(&store),
            Some(Arc::clone(&llm)),
            settings.fast_model,
        );
        let extractor = Extractor::new(
            Arc::clone(&store),
            llm,
            embedder,
            settings.topic_similarity_threshold,
            settings.extractor,
        );

        Self {
            store,
            extractor,
            retriever,
            matcher,
            cache,
            briefing,
            writer,
            classifier,
            analyzer,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BrainStore> {
        &self.store
    }

    #[must_use]
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[must_use]
    pub fn matcher(&self) -> &TemplateMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn template_cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    #[must_use]
    pub fn briefing(&self) -> &BriefingAgent {
        &self.briefing
    }

    #[must_use]
    pub fn writer(&self) -> &PostWriter {
        &self.writer
    }

    #[must_use]
    pub fn classifier(&self) -> &EditClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn analyzer(&self) -> &PerformanceAnalyzer {
        &self.analyzer
    }

    /// Brief, draft, polish and store a post for an idea.
    ///
    /// The idea must be `selected`. It is moved to `writing` before
    /// generation and back to `selected` if anything before the draft is
    /// stored fails. Brief inputs that cannot be read and a failed polish
    /// are recorded in `skipped_stages`; the draft is still written. An idea
    /// already `written` is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown idea,
    /// [`BrainError::Core`] if the idea cannot move to `writing`, or the
    /// error of the failed stage.
    pub async fn write_post(&self, idea_id: Uuid) -> Result<WritePostOutcome, BrainError> {
        let idea = self
            .store
            .get_idea(idea_id)
            .await?
            .ok_or_else(|| BrainError::not_found("content idea", idea_id))?;

        if idea.status == IdeaStatus::Written {
            tracing::info!(idea_id = %idea_id, "idea already written, skipping");
            return Ok(WritePostOutcome {
                idea_id,
                draft_id: None,
                template_id: None,
                hook_score: None,
                skipped_stages: vec!["already_written".to_string()],
            });
        }

        // A crashed earlier attempt can leave the idea in `writing`; resume it.
        // `writing` is only ever entered from `selected`.
        if idea.status != IdeaStatus::Writing {
            transition_idea(self.store.as_ref(), idea_id, IdeaStatus::Writing).await?;
        }

        match self.generate(&idea).await {
            Ok(outcome) => {
                if !self
                    .store
                    .transition_idea(idea_id, IdeaStatus::Writing, IdeaStatus::Written)
                    .await?
                {
                    return Err(BrainError::Consistency(format!(
                        "idea {idea_id} left writing while its draft was generated"
                    )));
                }
                tracing::info!(
                    idea_id = %idea_id,
                    skipped = outcome.skipped_stages.len(),
                    "post written"
                );
                Ok(outcome)
            }
            Err(e) => {
                match self
                    .store
                    .transition_idea(idea_id, IdeaStatus::Writing, IdeaStatus::Selected)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(idea_id = %idea_id, "idea moved during failed write"),
                    Err(revert_err) => {
                        tracing::warn!(idea_id = %idea_id, error = %revert_err, "could not revert idea status");
                    }
                }
                Err(e)
            }
        }
    }

    async fn generate(&self, idea: &ContentIdea) -> Result<WritePostOutcome, BrainError> {
        let scope = Scope::owner(idea.owner_id);
        let brief = self.briefing.build_brief(idea, &scope).await;
        let mut skipped_stages = brief.skipped_stages.clone();
        let draft = self.writer.write(&brief).await?;

        let polished = match self.writer.polish(&draft.content).await {
            Ok(polished) => Some(polished),
            Err(e) => {
                tracing::warn!(idea_id = %idea.id, error = %e, "polish failed, keeping draft");
                skipped_stages.push("polish".to_string());
                None
            }
        };

        let record = DraftRecord {
            idea_id: idea.id,
            owner_id: idea.owner_id,
            template_id: draft.template_id,
            draft_content: draft.content.clone(),
            final_content: polished.as_ref().map(|p| p.text.clone()),
            dm_text: draft.dm_text.clone(),
            cta_keyword: draft.cta_keyword.clone(),
            variations: draft.variations.clone(),
            hook_score: polished.as_ref().map(|p| p.hook_score),
            polish_changes: polished.as_ref().map(|p| p.changes.clone()).unwrap_or_default(),
        };
        let draft_id = self.store.insert_draft(&record).await?;

        Ok(WritePostOutcome {
            idea_id: idea.id,
            draft_id: Some(draft_id),
            template_id: record.template_id,
            hook_score: record.hook_score,
            skipped_stages,
        })
    }
}
