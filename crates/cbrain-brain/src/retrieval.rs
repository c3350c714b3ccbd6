//! Ranked search over the knowledge base and context compilation for briefs.

use std::cmp::Ordering;
use std::sync::Arc;

use cbrain_ai::EmbeddingProvider;
use cbrain_core::{is_stop_word, KnowledgeEntry, KnowledgeType, Scope};
use chrono::{Duration, Utc};
use serde::Serialize;

use crate::similarity::cosine;
use crate::store::{BrainStore, EntryFilter};
use crate::BrainError;

/// Candidates fetched per store round trip on the semantic path.
pub const DEFAULT_PAGE_SIZE: i64 = 500;

/// Query words too common to count as keyword hits.
const QUERY_STOP_WORDS: &[&str] = &[
    "is", "are", "was", "were", "be", "it", "its", "this", "that", "we", "our", "us", "you",
    "i", "my", "me", "they", "at", "as", "or", "not", "from", "so", "do", "but", "if", "than",
    "what", "why", "when",
];

/// Structured filters for [`Retriever::search`].
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub speaker: Option<String>,
    pub tag: Option<String>,
    pub topic: Option<String>,
    pub knowledge_type: Option<KnowledgeType>,
    pub min_quality: Option<i16>,
    pub recency_days: Option<u32>,
    pub limit: usize,
    /// Semantic results below this cosine similarity are dropped.
    pub min_similarity: f32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            category: None,
            speaker: None,
            tag: None,
            topic: None,
            knowledge_type: None,
            min_quality: None,
            recency_days: None,
            limit: 20,
            min_similarity: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
    /// Cosine similarity; `None` when the entry was matched by keywords.
    pub similarity: Option<f32>,
    /// Ranking score: the similarity, or the share of query terms matched.
    pub relevance: f32,
}

pub struct Retriever {
    store: Arc<dyn BrainStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    page_size: i64,
}

impl Retriever {
    #[must_use]
    pub fn new(store: Arc<dyn BrainStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            store,
            embedder,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rank entries visible in `scope` against `query`.
    ///
    /// With a query embedding every candidate in scope is scored: embedded
    /// entries by cosine similarity (non-positive scores dropped), entries
    /// without an embedding by the share of query terms they contain. Without
    /// one (embeddings disabled or the provider failed) entries containing
    /// any query term are ranked by hits, then quality. Provider failures
    /// never reach the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if the store query fails.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        scope: &Scope,
    ) -> Result<Vec<ScoredEntry>, BrainError> {
        if filters.limit == 0 {
            return Ok(Vec::new());
        }
        let terms = keywords(query);

        if let Some(query_vector) = self.embed_query(query).await {
            return self
                .semantic_search(&query_vector, &terms, filters, scope)
                .await;
        }

        let mut filter = base_filter(filters, scope);
        filter.keywords.clone_from(&terms);
        filter.limit = i64::try_from(filters.limit).unwrap_or(i64::MAX);
        let rows = self.store.search_entries(&filter).await?;
        tracing::debug!(results = rows.len(), "keyword search");
        Ok(rows
            .into_iter()
            .map(|entry| ScoredEntry {
                relevance: term_share(&entry, &terms),
                entry,
                similarity: None,
            })
            .collect())
    }

    async fn semantic_search(
        &self,
        query_vector: &[f32],
        terms: &[String],
        filters: &SearchFilters,
        scope: &Scope,
    ) -> Result<Vec<ScoredEntry>, BrainError> {
        let mut filter = base_filter(filters, scope);
        filter.limit = self.page_size;

        let mut scored = Vec::new();
        let mut scanned = 0usize;
        loop {
            let page = self.store.search_entries(&filter).await?;
            let fetched = page.len();
            scanned += fetched;
            scored.extend(page.into_iter().filter_map(|entry| {
                score_candidate(entry, query_vector, terms, filters.min_similarity)
            }));
            if i64::try_from(fetched).unwrap_or(i64::MAX) < self.page_size {
                break;
            }
            filter.offset += self.page_size;
        }

        scored.sort_by(compare_relevance);
        scored.truncate(filters.limit);
        tracing::debug!(scanned, results = scored.len(), "semantic search");
        Ok(scored)
    }

    /// Compile `[category] content` lines for the best matches, within
    /// `budget` characters.
    ///
    /// With a non-zero `quality_boost` the relevance is scaled by
    /// `1 + quality_boost * (quality - 3) / 2`. The line that would overflow
    /// the budget is cut short and ends with `…`.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if the store query fails.
    pub async fn compile_context(
        &self,
        query: &str,
        scope: &Scope,
        budget: usize,
        quality_boost: f32,
    ) -> Result<String, BrainError> {
        if budget == 0 {
            return Ok(String::new());
        }
        let filters = SearchFilters {
            limit: 50,
            ..SearchFilters::default()
        };
        let mut results = self.search(query, &filters, scope).await?;

        if quality_boost != 0.0 {
            results.sort_by(|a, b| {
                boosted(b, quality_boost)
                    .partial_cmp(&boosted(a, quality_boost))
                    .unwrap_or(Ordering::Equal)
            });
        }

        let lines = results
            .iter()
            .map(|r| format!("[{}] {}", r.entry.category, r.entry.content.replace('\n', " ")));
        Ok(pack_lines(lines, budget))
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        if query.trim().is_empty() {
            return None;
        }
        match embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, using keyword search");
                None
            }
        }
    }
}

fn base_filter(filters: &SearchFilters, scope: &Scope) -> EntryFilter {
    EntryFilter {
        owner_id: scope.owner_id,
        team_id: scope.team_id,
        category: filters.category.clone(),
        speaker: filters.speaker.clone(),
        tag: filters.tag.clone(),
        topic: filters.topic.clone(),
        knowledge_type: filters.knowledge_type,
        min_quality: filters.min_quality,
        since: filters
            .recency_days
            .map(|days| Utc::now() - Duration::days(i64::from(days))),
        keywords: Vec::new(),
        limit: 0,
        offset: 0,
    }
}

/// Distinct lowercase query terms without stop-words. A query made only of
/// stop-words keeps all of them.
fn keywords(query: &str) -> Vec<String> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let meaningful = words
        .iter()
        .filter(|w| {
            w.chars().count() > 1
                && !is_stop_word(w.as_str())
                && !QUERY_STOP_WORDS.contains(&w.as_str())
        });

    let mut terms: Vec<String> = Vec::new();
    for word in meaningful {
        if !terms.contains(word) {
            terms.push(word.clone());
        }
    }
    if terms.is_empty() {
        for word in words {
            if !terms.contains(&word) {
                terms.push(word);
            }
        }
    }
    terms
}

/// Share of `terms` found in the entry's content, context or category.
#[allow(clippy::cast_precision_loss)]
fn term_share(entry: &KnowledgeEntry, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {} {}",
        entry.content,
        entry.context.as_deref().unwrap_or_default(),
        entry.category
    )
    .to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}

fn score_candidate(
    entry: KnowledgeEntry,
    query_vector: &[f32],
    terms: &[String],
    min_similarity: f32,
) -> Option<ScoredEntry> {
    match entry.embedding.as_deref().and_then(|e| cosine(query_vector, e)) {
        Some(sim) => (sim > 0.0 && sim >= min_similarity).then_some(ScoredEntry {
            entry,
            similarity: Some(sim),
            relevance: sim,
        }),
        None => {
            let share = term_share(&entry, terms);
            (share > 0.0).then_some(ScoredEntry {
                entry,
                similarity: None,
                relevance: share,
            })
        }
    }
}

fn compare_relevance(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.relevance
        .partial_cmp(&a.relevance)
        .unwrap_or(Ordering::Equal)
        .then(b.entry.quality_score.cmp(&a.entry.quality_score))
        .then(b.entry.created_at.cmp(&a.entry.created_at))
        .then(a.entry.id.cmp(&b.entry.id))
}

fn boosted(result: &ScoredEntry, quality_boost: f32) -> f32 {
    result.relevance * (1.0 + quality_boost * (f32::from(result.entry.quality_score) - 3.0) / 2.0)
}

/// Join lines greedily until `budget` characters are used. The overflowing
/// line is truncated on a char boundary and marked with `…`.
pub(crate) fn pack_lines<I>(lines: I, budget: usize) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut out = String::new();
    let mut used = 0usize;
    for line in lines {
        let separator = usize::from(!out.is_empty());
        let len = line.chars().count();
        if used + separator + len <= budget {
            if separator == 1 {
                out.push('\n');
            }
            out.push_str(&line);
            used += separator + len;
            continue;
        }
        let room = budget.saturating_sub(used + separator);
        if room > 1 {
            if separator == 1 {
                out.push('\n');
            }
            out.extend(line.chars().take(room - 1));
            out.push('…');
        }
        break;
    }
    out
}
