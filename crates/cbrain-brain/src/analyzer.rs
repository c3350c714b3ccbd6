//! Mining performance snapshots into per-attribute engagement patterns.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use cbrain_ai::LanguageModel;
use cbrain_core::{PatternType, PerformancePattern, PerformanceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::BrainStore;
use crate::BrainError;

/// Sample size at which a pattern reaches full confidence.
pub const FULL_CONFIDENCE_SAMPLES: f64 = 10.0;

/// `min(1, n / 10)`.
#[must_use]
pub fn confidence(sample_count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = sample_count as f64;
    (n / FULL_CONFIDENCE_SAMPLES).min(1.0)
}

#[derive(Debug, Default)]
struct Accumulator {
    engagement: f64,
    views: f64,
    likes: f64,
    comments: f64,
    count: usize,
}

impl Accumulator {
    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, record: &PerformanceRecord) {
        self.engagement += record.engagement_rate;
        self.views += record.views as f64;
        self.likes += record.likes as f64;
        self.comments += record.comments as f64;
        self.count += 1;
    }
}

/// Group snapshots by every attribute dimension and average each group.
///
/// Output order is by pattern type then value, so identical input always
/// produces identical output apart from `last_updated`.
#[must_use]
pub fn compute_patterns(
    owner_id: Uuid,
    records: &[PerformanceRecord],
    now: DateTime<Utc>,
) -> Vec<PerformancePattern> {
    let mut groups: BTreeMap<(PatternType, String), Accumulator> = BTreeMap::new();
    for record in records {
        for pattern_type in PatternType::ALL {
            if let Some(value) = record.attribute(pattern_type) {
                groups.entry((pattern_type, value)).or_default().add(record);
            }
        }
    }

    groups
        .into_iter()
        .map(|((pattern_type, pattern_value), acc)| {
            #[allow(clippy::cast_precision_loss)]
            let n = acc.count as f64;
            PerformancePattern {
                owner_id,
                pattern_type,
                pattern_value,
                avg_engagement_rate: acc.engagement / n,
                avg_views: acc.views / n,
                avg_likes: acc.likes / n,
                avg_comments: acc.comments / n,
                sample_count: i32::try_from(acc.count).unwrap_or(i32::MAX),
                confidence: confidence(acc.count),
                last_updated: now,
            }
        })
        .collect()
}

/// Order by confidence-weighted engagement, then sample count, then type and value.
pub fn rank_patterns(patterns: &mut [PerformancePattern]) {
    patterns.sort_by(|a, b| {
        b.weighted_score()
            .partial_cmp(&a.weighted_score())
            .unwrap_or(Ordering::Equal)
            .then(b.sample_count.cmp(&a.sample_count))
            .then(a.pattern_type.as_str().cmp(b.pattern_type.as_str()))
            .then_with(|| a.pattern_value.cmp(&b.pattern_value))
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub owner_id: Uuid,
    pub records_analyzed: usize,
    pub patterns: Vec<PerformancePattern>,
    /// Model-written summary; `None` when not requested or the call failed.
    pub insight: Option<String>,
}

pub struct PerformanceAnalyzer {
    store: Arc<dyn BrainStore>,
    llm: Option<Arc<dyn LanguageModel>>,
    model: String,
}

impl PerformanceAnalyzer {
    #[must_use]
    pub fn new(store: Arc<dyn BrainStore>, llm: Option<Arc<dyn LanguageModel>>, model: String) -> Self {
        Self { store, llm, model }
    }

    /// Recompute and replace every pattern for an owner from the latest
    /// snapshot of each (post, platform).
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if reading snapshots or replacing
    /// patterns fails; the previous patterns stay in place in that case.
    pub async fn analyze(&self, owner_id: Uuid) -> Result<Vec<PerformancePattern>, BrainError> {
        Ok(self.run(owner_id).await?.1)
    }

    /// [`PerformanceAnalyzer::analyze`] plus a best-effort narrative insight.
    ///
    /// # Errors
    ///
    /// As [`PerformanceAnalyzer::analyze`]. A failed insight call is logged only.
    pub async fn analyze_with_insight(&self, owner_id: Uuid) -> Result<AnalysisReport, BrainError> {
        let (records_analyzed, patterns) = self.run(owner_id).await?;
        let insight = self.narrative_insight(&patterns).await;
        Ok(AnalysisReport {
            owner_id,
            records_analyzed,
            patterns,
            insight,
        })
    }

    /// The strongest stored patterns at or above `min_confidence`.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if the patterns cannot be read.
    pub async fn top_attributes(
        &self,
        owner_id: Uuid,
        limit: usize,
        min_confidence: f64,
    ) -> Result<Vec<PerformancePattern>, BrainError> {
        top_attributes(self.store.as_ref(), owner_id, limit, min_confidence).await
    }

    async fn run(&self, owner_id: Uuid) -> Result<(usize, Vec<PerformancePattern>), BrainError> {
        let records = self.store.latest_performance(owner_id).await?;
        let patterns = compute_patterns(owner_id, &records, Utc::now());
        let written = self.store.replace_patterns(owner_id, &patterns).await?;
        tracing::info!(
            owner_id = %owner_id,
            records = records.len(),
            patterns = written,
            "performance analysis complete"
        );
        Ok((records.len(), patterns))
    }

    async fn narrative_insight(&self, patterns: &[PerformancePattern]) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let mut ranked = patterns.to_vec();
        rank_patterns(&mut ranked);
        ranked.truncate(15);
        if ranked.is_empty() {
            return None;
        }

        let mut prompt = String::from(
            "Summarize in three short sentences what these engagement patterns say about which posts work \
             best, and what to try next. Mention confidence where samples are small.\n\n",
        );
        for p in &ranked {
            prompt.push_str(&format!(
                "- {}={}: engagement {:.4}, views {:.0}, samples {}, confidence {:.2}\n",
                p.pattern_type, p.pattern_value, p.avg_engagement_rate, p.avg_views, p.sample_count, p.confidence
            ));
        }

        match llm.complete(&prompt, &self.model, 400).await {
            Ok(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "insight generation failed");
                None
            }
        }
    }
}

/// See [`PerformanceAnalyzer::top_attributes`].
///
/// # Errors
///
/// Returns [`BrainError::Store`] if the patterns cannot be read.
pub async fn top_attributes(
    store: &dyn BrainStore,
    owner_id: Uuid,
    limit: usize,
    min_confidence: f64,
) -> Result<Vec<PerformancePattern>, BrainError> {
    let mut patterns: Vec<PerformancePattern> = store
        .list_patterns(owner_id)
        .await?
        .into_iter()
        .filter(|p| p.confidence >= min_confidence)
        .collect();
    rank_patterns(&mut patterns);
    patterns.truncate(limit);
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::ScriptedModel;

    fn snapshot(owner: Uuid, post: Uuid, hours_after: i64, rate: f64, views: i64, hook: &str) -> PerformanceRecord {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        PerformanceRecord {
            id: Uuid::new_v4(),
            owner_id: owner,
            post_id: post,
            platform: "linkedin".to_string(),
            captured_at: base + Duration::hours(hours_after),
            views,
            likes: views / 10,
            comments: views / 100,
            shares: 0,
            saves: 0,
            clicks: 0,
            impressions: views * 2,
            engagement_rate: rate,
            archetype: Some("Story".to_string()),
            hook_type: Some(hook.to_string()),
            format: None,
            topic: Some("pricing".to_string()),
            content_pillar: None,
            published_at: Some(base),
            word_count: Some(180),
        }
    }

    #[test]
    fn confidence_saturates_at_ten_samples() {
        assert!((confidence(1) - 0.1).abs() < f64::EPSILON);
        assert!((confidence(10) - 1.0).abs() < f64::EPSILON);
        assert!((confidence(40) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn groups_by_every_known_dimension() {
        let owner = Uuid::new_v4();
        let records = vec![
            snapshot(owner, Uuid::new_v4(), 1, 0.04, 1_000, "question"),
            snapshot(owner, Uuid::new_v4(), 1, 0.02, 3_000, "statistic"),
        ];
        let patterns = compute_patterns(owner, &records, Utc::now());

        let story = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::Archetype)
            .unwrap();
        assert_eq!(story.pattern_value, "story");
        assert_eq!(story.sample_count, 2);
        assert!((story.avg_engagement_rate - 0.03).abs() < 1e-12);
        assert!((story.avg_views - 2_000.0).abs() < 1e-9);

        let morning = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::TimeOfDay)
            .unwrap();
        assert_eq!(morning.pattern_value, "morning");
        let length = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::LengthBucket)
            .unwrap();
        assert_eq!(length.pattern_value, "medium");
        assert!(!patterns.iter().any(|p| p.pattern_type == PatternType::Format));
        assert_eq!(
            patterns
                .iter()
                .filter(|p| p.pattern_type == PatternType::HookType)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn only_latest_snapshot_per_post_counts() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let post = Uuid::new_v4();
        store.insert_performance_record(&snapshot(owner, post, 1, 0.01, 100, "question")).await.unwrap();
        store.insert_performance_record(&snapshot(owner, post, 48, 0.05, 900, "question")).await.unwrap();

        let analyzer = PerformanceAnalyzer::new(store, None, "model".to_string());
        let patterns = analyzer.analyze(owner).await.unwrap();
        let hook = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::HookType)
            .unwrap();
        assert_eq!(hook.sample_count, 1);
        assert!((hook.avg_engagement_rate - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn analyzing_twice_is_deterministic() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        for i in 0..5 {
            let hook = if i % 2 == 0 { "question" } else { "statistic" };
            store
                .insert_performance_record(&snapshot(owner, Uuid::new_v4(), 2, 0.01 * f64::from(i + 1), 100 * i64::from(i + 1), hook))
                .await
                .unwrap();
        }
        let analyzer = PerformanceAnalyzer::new(store.clone(), None, "model".to_string());

        let strip = |patterns: Vec<PerformancePattern>| {
            patterns
                .into_iter()
                .map(|p| (p.pattern_type, p.pattern_value, p.sample_count, p.avg_engagement_rate, p.avg_views, p.confidence))
                .collect::<Vec<_>>()
        };
        let first = strip(analyzer.analyze(owner).await.unwrap());
        let second = strip(analyzer.analyze(owner).await.unwrap());
        assert_eq!(first, second);
        assert_eq!(store.list_patterns(owner).await.unwrap().len(), first.len());
    }

    #[tokio::test]
    async fn top_attributes_filters_and_orders() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let pattern = |value: &str, rate: f64, samples: i32| PerformancePattern {
            owner_id: owner,
            pattern_type: PatternType::HookType,
            pattern_value: value.to_string(),
            avg_engagement_rate: rate,
            avg_views: 0.0,
            avg_likes: 0.0,
            avg_comments: 0.0,
            sample_count: samples,
            confidence: confidence(usize::try_from(samples).unwrap()),
            last_updated: Utc::now(),
        };
        store
            .replace_patterns(
                owner,
                &[pattern("rare", 0.50, 1), pattern("steady", 0.06, 10), pattern("ok", 0.05, 10)],
            )
            .await
            .unwrap();

        let top = top_attributes(store.as_ref(), owner, 5, 0.5).await.unwrap();
        let values: Vec<&str> = top.iter().map(|p| p.pattern_value.as_str()).collect();
        assert_eq!(values, vec!["steady", "ok"]);

        let all = top_attributes(store.as_ref(), owner, 1, 0.0).await.unwrap();
        assert_eq!(all[0].pattern_value, "steady");
    }

    #[tokio::test]
    async fn failed_insight_still_returns_patterns() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        store.insert_performance_record(&snapshot(owner, Uuid::new_v4(), 1, 0.02, 100, "question")).await.unwrap();
        let llm = Arc::new(ScriptedModel::new([None::<&str>]));
        let analyzer = PerformanceAnalyzer::new(store, Some(llm), "model".to_string());

        let report = analyzer.analyze_with_insight(owner).await.unwrap();
        assert!(report.insight.is_none());
        assert!(!report.patterns.is_empty());
        assert_eq!(report.records_analyzed, 1);
    }
}
