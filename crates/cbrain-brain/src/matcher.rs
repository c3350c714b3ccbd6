//! Picking post templates for an idea by embedding similarity.

use std::cmp::Ordering;
use std::sync::Arc;

use cbrain_ai::EmbeddingProvider;
use cbrain_core::{Scope, Template};
use serde::Serialize;

use crate::cache::EmbeddingCache;
use crate::similarity::cosine;
use crate::store::BrainStore;
use crate::BrainError;

/// Similarities closer than this are ranked by engagement and usage instead.
pub const SIMILARITY_TIE_EPSILON: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMatch {
    pub template: Template,
    pub similarity: Option<f32>,
    /// Set when nothing cleared the similarity floor and the most used
    /// template was returned instead.
    pub fallback: bool,
}

pub struct TemplateMatcher {
    store: Arc<dyn BrainStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl TemplateMatcher {
    #[must_use]
    pub fn new(store: Arc<dyn BrainStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    /// Up to `top_k` templates visible to the scope's owner, best first.
    ///
    /// When no template reaches `min_similarity`, including when embeddings
    /// are unavailable, exactly one template is returned: the most used one.
    /// The result is empty only when no templates exist.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if templates cannot be listed.
    pub async fn match_templates(
        &self,
        idea_text: &str,
        scope: &Scope,
        top_k: usize,
        min_similarity: f32,
        cache: &EmbeddingCache,
    ) -> Result<Vec<TemplateMatch>, BrainError> {
        let templates = self.store.list_templates(scope.owner_id).await?;
        if templates.is_empty() {
            tracing::warn!(owner_id = %scope.owner_id, "no templates available");
            return Ok(Vec::new());
        }

        let similarities = self.similarities(idea_text, &templates, cache).await;

        let mut scored: Vec<(Template, f32)> = templates
            .iter()
            .zip(similarities.iter().copied())
            .filter_map(|(t, sim)| sim.filter(|s| *s >= min_similarity).map(|s| (t.clone(), s)))
            .collect();

        if scored.is_empty() {
            let (idx, best) = templates
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| by_popularity(a, b))
                .ok_or_else(|| BrainError::Consistency("template list emptied".to_string()))?;
            tracing::info!(
                owner_id = %scope.owner_id,
                template = %best.name,
                "no template cleared the similarity floor, using most used"
            );
            return Ok(vec![TemplateMatch {
                template: best.clone(),
                similarity: similarities[idx],
                fallback: true,
            }]);
        }

        rank_with_ties(&mut scored);
        scored.truncate(top_k.max(1));
        Ok(scored
            .into_iter()
            .map(|(template, sim)| TemplateMatch {
                template,
                similarity: Some(sim),
                fallback: false,
            })
            .collect())
    }

    /// Similarity of each template to the idea, `None` where no vector could be had.
    async fn similarities(
        &self,
        idea_text: &str,
        templates: &[Template],
        cache: &EmbeddingCache,
    ) -> Vec<Option<f32>> {
        let none = vec![None; templates.len()];
        let Some(embedder) = &self.embedder else {
            return none;
        };
        let idea_vector = match embedder.embed(&[idea_text.to_string()]).await {
            Ok(mut v) => match v.pop() {
                Some(vector) => vector,
                None => return none,
            },
            Err(e) => {
                tracing::warn!(error = %e, "idea embedding failed, falling back to usage");
                return none;
            }
        };

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(templates.len());
        let mut missing = Vec::new();
        for (idx, template) in templates.iter().enumerate() {
            let vector = match &template.embedding {
                Some(stored) => Some(stored.clone()),
                None => cache.get(&template.embedding_text()).await,
            };
            if vector.is_none() {
                missing.push(idx);
            }
            vectors.push(vector);
        }

        if !missing.is_empty() {
            let texts: Vec<String> = missing
                .iter()
                .map(|&idx| templates[idx].embedding_text())
                .collect();
            match embedder.embed(&texts).await {
                Ok(fresh) => {
                    for ((&idx, text), vector) in missing.iter().zip(&texts).zip(fresh) {
                        cache.insert(text, vector.clone()).await;
                        if let Err(e) = self.store.set_template_embedding(templates[idx].id, &vector).await {
                            tracing::warn!(template_id = %templates[idx].id, error = %e, "could not store template embedding");
                        }
                        vectors[idx] = Some(vector);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, missing = missing.len(), "template embedding failed");
                }
            }
        }

        vectors
            .iter()
            .map(|v| v.as_deref().and_then(|v| cosine(&idea_vector, v)))
            .collect()
    }
}

/// Most used first, then higher engagement, then name.
fn by_popularity(a: &Template, b: &Template) -> Ordering {
    b.usage_count
        .cmp(&a.usage_count)
        .then(
            b.avg_engagement_score
                .partial_cmp(&a.avg_engagement_score)
                .unwrap_or(Ordering::Equal),
        )
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort by similarity, then re-rank runs of near-equal similarity by
/// engagement and usage.
fn rank_with_ties(scored: &mut [(Template, f32)]) {
    scored.sort_by(|(ta, a), (tb, b)| {
        b.partial_cmp(a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| ta.name.cmp(&tb.name))
    });

    let mut start = 0;
    while start < scored.len() {
        let lead = scored[start].1;
        let mut end = start + 1;
        while end < scored.len() && lead - scored[end].1 <= SIMILARITY_TIE_EPSILON {
            end += 1;
        }
        scored[start..end].sort_by(|(a, sa), (b, sb)| {
            b.avg_engagement_score
                .partial_cmp(&a.avg_engagement_score)
                .unwrap_or(Ordering::Equal)
                .then(b.usage_count.cmp(&a.usage_count))
                .then(sb.partial_cmp(sa).unwrap_or(Ordering::Equal))
                .then_with(|| a.name.cmp(&b.name))
        });
        start = end;
    }
}
