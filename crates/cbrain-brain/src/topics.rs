//! Mapping free-text topic suggestions onto an owner's canonical taxonomy.

use std::collections::HashSet;
use std::sync::Arc;

use cbrain_ai::EmbeddingProvider;
use cbrain_core::{is_stop_word, normalize_label, slugify, Topic};
use uuid::Uuid;

use crate::similarity::{cosine, jaccard};
use crate::store::BrainStore;
use crate::BrainError;

pub const DEFAULT_TOPIC_SIMILARITY_THRESHOLD: f32 = 0.8;

pub struct TopicNormalizer {
    store: Arc<dyn BrainStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    threshold: f32,
}

struct Suggestion {
    label: String,
    slug: String,
    tokens: Vec<String>,
    /// Every word was a stop-word, so the tokens are the raw words.
    lexically_empty: bool,
    embedding: Option<Vec<f32>>,
}

impl TopicNormalizer {
    #[must_use]
    pub fn new(
        store: Arc<dyn BrainStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        threshold: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            threshold,
        }
    }

    /// Resolve suggestions to canonical slugs, creating topics as needed and
    /// incrementing each resolved topic's usage exactly once per call.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if topics cannot be listed or incremented.
    pub async fn normalize(
        &self,
        suggestions: &[String],
        entry_content: &str,
        owner_id: Uuid,
    ) -> Result<Vec<String>, BrainError> {
        let mut parsed = parse_suggestions(suggestions);
        if parsed.is_empty() {
            return Ok(Vec::new());
        }
        self.attach_embeddings(&mut parsed).await;

        let mut topics = self.store.list_topics(owner_id).await?;
        let content_tokens = normalize_label(entry_content);
        let mut resolved: Vec<String> = Vec::new();

        for suggestion in &parsed {
            let best = best_match(suggestion, &topics, &content_tokens);
            let (slug, label, embedding) = match best {
                Some((topic, score)) if score >= self.threshold => {
                    tracing::debug!(
                        suggestion = %suggestion.label,
                        topic = %topic.slug,
                        score,
                        "topic suggestion matched existing topic"
                    );
                    (topic.slug.clone(), topic.label.clone(), None)
                }
                _ => (
                    suggestion.slug.clone(),
                    suggestion.label.clone(),
                    suggestion.embedding.clone(),
                ),
            };

            if resolved.contains(&slug) {
                continue;
            }
            let usage = self
                .store
                .increment_topic(owner_id, &slug, &label, embedding.as_deref())
                .await?;
            if usage == 1 {
                tracing::info!(owner_id = %owner_id, topic = %slug, "created topic");
            }
            if !topics.iter().any(|t| t.slug == slug) {
                topics.push(Topic {
                    owner_id,
                    slug: slug.clone(),
                    label,
                    usage_count: usage,
                    embedding,
                });
            }
            resolved.push(slug);
        }

        Ok(resolved)
    }

    async fn attach_embeddings(&self, suggestions: &mut [Suggestion]) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let labels: Vec<String> = suggestions.iter().map(|s| s.label.clone()).collect();
        match embedder.embed(&labels).await {
            Ok(vectors) => {
                for (suggestion, vector) in suggestions.iter_mut().zip(vectors) {
                    suggestion.embedding = Some(vector);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "topic embedding failed, matching lexically");
            }
        }
    }
}

fn parse_suggestions(suggestions: &[String]) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    let mut parsed = Vec::new();
    for raw in suggestions {
        let label = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let slug = slugify(&label);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        let tokens = normalize_label(&label);
        let lexically_empty = tokens.iter().all(|t| is_stop_word(t));
        parsed.push(Suggestion {
            label,
            slug,
            tokens,
            lexically_empty,
            embedding: None,
        });
    }
    parsed
}

/// The best-scoring existing topic. Exact slug match scores 1.0; otherwise
/// the max of token Jaccard and embedding cosine. Ties prefer, in order,
/// content overlap (only for stop-word-only suggestions), usage, then slug.
fn best_match<'a>(
    suggestion: &Suggestion,
    topics: &'a [Topic],
    content_tokens: &[String],
) -> Option<(&'a Topic, f32)> {
    let mut best: Option<(&Topic, f32, f32)> = None;
    for topic in topics {
        let score = if topic.slug == suggestion.slug {
            1.0
        } else {
            let lexical = jaccard(&suggestion.tokens, &normalize_label(&topic.label));
            let semantic = match (&suggestion.embedding, &topic.embedding) {
                (Some(a), Some(b)) => cosine(a, b).unwrap_or(0.0),
                _ => 0.0,
            };
            lexical.max(semantic)
        };
        let hint = if suggestion.lexically_empty {
            jaccard(content_tokens, &normalize_label(&topic.label))
        } else {
            0.0
        };

        let better = match best {
            None => true,
            Some((current, current_score, current_hint)) => {
                if (score - current_score).abs() > f32::EPSILON {
                    score > current_score
                } else if (hint - current_hint).abs() > f32::EPSILON {
                    hint > current_hint
                } else if topic.usage_count != current.usage_count {
                    topic.usage_count > current.usage_count
                } else {
                    topic.slug < current.slug
                }
            }
        };
        if better {
            best = Some((topic, score, hint));
        }
    }
    best.map(|(topic, score, _)| (topic, score))
}
