//! Content commands: template matching, performance analysis and drafting.

use std::sync::Arc;
use std::time::Duration;

use cbrain_brain::{
    embedder_from_app_config, ContentBrain, EmbeddingCache, JobType, PerformanceAnalyzer, PgStore,
    TemplateMatcher,
};
use cbrain_core::Scope;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::{enqueue_and_report, truncate};

/// Sub-commands available under `templates`.
#[derive(Debug, Subcommand)]
pub enum TemplateCommands {
    /// Rank templates for an idea
    Match {
        /// Idea text to match against template structures
        idea: String,
        #[arg(long)]
        owner: Uuid,
        #[arg(long, default_value = "3")]
        top_k: usize,
        /// Similarity floor (defaults to `CBRAIN_TEMPLATE_MIN_SIMILARITY`)
        #[arg(long)]
        min_similarity: Option<f32>,
    },
}

pub(crate) async fn run_templates(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    command: TemplateCommands,
) -> anyhow::Result<()> {
    match command {
        TemplateCommands::Match {
            idea,
            owner,
            top_k,
            min_similarity,
        } => {
            let matcher = TemplateMatcher::new(
                Arc::new(PgStore::new(pool.clone())),
                embedder_from_app_config(config)?,
            );
            let cache = EmbeddingCache::new(
                Duration::from_secs(config.template_cache_ttl_secs),
                config.template_cache_capacity,
            );
            let matches = matcher
                .match_templates(
                    &idea,
                    &Scope::owner(owner),
                    top_k,
                    min_similarity.unwrap_or(config.template_min_similarity),
                    &cache,
                )
                .await?;

            if matches.is_empty() {
                println!("no templates available; run `db seed-templates` first");
                return Ok(());
            }
            if matches.iter().any(|m| m.fallback) {
                println!("nothing cleared the similarity floor; showing most used");
            }
            println!("{:<8}{:<8}{:<28}CATEGORY", "SIM", "USES", "TEMPLATE");
            for m in &matches {
                let sim = m
                    .similarity
                    .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
                println!(
                    "{:<8}{:<8}{:<28}{}",
                    sim,
                    m.template.usage_count,
                    truncate(&m.template.name, 25),
                    m.template.category
                );
            }
        }
    }
    Ok(())
}

pub(crate) async fn run_analyze(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    owner: Uuid,
    insight: bool,
) -> anyhow::Result<()> {
    let report = if insight {
        ContentBrain::from_app_config(pool.clone(), config)?
            .analyzer()
            .analyze_with_insight(owner)
            .await?
    } else {
        let analyzer = PerformanceAnalyzer::new(
            Arc::new(PgStore::new(pool.clone())),
            None,
            config.llm_fast_model.clone(),
        );
        analyzer.analyze_with_insight(owner).await?
    };

    if report.patterns.is_empty() {
        println!("no performance data for owner {owner}");
        return Ok(());
    }

    println!(
        "{} records, {} patterns",
        report.records_analyzed,
        report.patterns.len()
    );
    println!(
        "{:<14}{:<24}{:<12}{:<9}CONFIDENCE",
        "TYPE", "VALUE", "ENGAGEMENT", "SAMPLES"
    );
    for pattern in &report.patterns {
        println!(
            "{:<14}{:<24}{:<12.4}{:<9}{:.2}",
            pattern.pattern_type.as_str(),
            truncate(&pattern.pattern_value, 21),
            pattern.avg_engagement_rate,
            pattern.sample_count,
            pattern.confidence
        );
    }
    if let Some(text) = report.insight {
        println!();
        println!("{text}");
    }
    Ok(())
}

pub(crate) async fn run_write(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    idea_id: Uuid,
    now: bool,
) -> anyhow::Result<()> {
    if !now {
        return enqueue_and_report(pool, JobType::WritePost, &json!({ "idea_id": idea_id })).await;
    }

    let outcome = ContentBrain::from_app_config(pool.clone(), config)?
        .write_post(idea_id)
        .await?;
    match outcome.draft_id {
        Some(draft_id) => println!("draft {draft_id} written for idea {idea_id}"),
        None => println!("idea {idea_id} was already written"),
    }
    if let Some(score) = outcome.hook_score {
        println!("hook score: {score}");
    }
    if !outcome.skipped_stages.is_empty() {
        println!("skipped: {}", outcome.skipped_stages.join(", "));
    }
    Ok(())
}
