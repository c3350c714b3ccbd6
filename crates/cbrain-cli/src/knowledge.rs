//! Knowledge commands: ingest, reprocess, search and context.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use cbrain_brain::{
    embedder_from_app_config, BrainStore, ContentBrain, JobType, NewDocument, PgStore, Retriever,
    SearchFilters,
};
use cbrain_core::{KnowledgeType, Scope};
use serde_json::json;
use uuid::Uuid;

use crate::{enqueue_and_report, truncate};

/// Arguments of `ingest` other than the run mode.
#[derive(Debug)]
pub(crate) struct IngestRequest {
    pub owner: Uuid,
    pub team: Option<Uuid>,
    pub file: PathBuf,
    pub title: Option<String>,
    pub speaker: Option<String>,
}

/// Title for a document read from `file`: the explicit title, else the file stem.
pub(crate) fn document_title(title: Option<String>, file: &std::path::Path) -> String {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            file.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Untitled transcript".to_string())
}

/// Store the transcript, then extract knowledge and ideas either in-process
/// or through the job queue.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    request: IngestRequest,
    now: bool,
) -> anyhow::Result<()> {
    let raw_text = std::fs::read_to_string(&request.file)
        .with_context(|| format!("failed to read {}", request.file.display()))?;
    if raw_text.trim().is_empty() {
        anyhow::bail!("{} is empty", request.file.display());
    }

    let store = PgStore::new(pool.clone());
    let document_id = store
        .insert_document(&NewDocument {
            owner_id: request.owner,
            team_id: request.team,
            title: document_title(request.title, &request.file),
            raw_text,
            speaker_hint: request.speaker,
        })
        .await?;
    println!("stored document {document_id}");

    let payload = json!({ "document_id": document_id });
    if !now {
        enqueue_and_report(pool, JobType::ExtractKnowledge, &payload).await?;
        enqueue_and_report(pool, JobType::ExtractIdeas, &payload).await?;
        return Ok(());
    }

    let brain = ContentBrain::from_app_config(pool.clone(), config)?;
    let entries = brain.extractor().extract_document(document_id).await?;
    println!("extracted {} knowledge entries", entries.len());
    match brain.extractor().extract_ideas(document_id).await {
        Ok(ideas) => println!("extracted {} content ideas", ideas.len()),
        Err(e) => {
            tracing::warn!(document_id = %document_id, error = %e, "idea extraction failed");
            println!("idea extraction failed: {e}");
        }
    }
    Ok(())
}

pub(crate) async fn run_reprocess(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    document_id: Uuid,
    now: bool,
) -> anyhow::Result<()> {
    if !now {
        return enqueue_and_report(
            pool,
            JobType::ReprocessDocument,
            &json!({ "document_id": document_id }),
        )
        .await;
    }

    let brain = ContentBrain::from_app_config(pool.clone(), config)?;
    let report = brain.extractor().reprocess(document_id).await?;
    println!(
        "removed {} entries and {} ideas; extracted {} entries",
        report.entries_removed,
        report.ideas_removed,
        report.entries.len()
    );
    for (tag, by) in &report.tag_decrements {
        println!("  tag {tag}: -{by}");
    }
    Ok(())
}

/// Assemble search filters from command-line values.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_filters(
    category: Option<String>,
    speaker: Option<String>,
    tag: Option<String>,
    topic: Option<String>,
    knowledge_type: Option<&str>,
    min_quality: Option<i16>,
    recency_days: Option<u32>,
    limit: usize,
) -> anyhow::Result<SearchFilters> {
    let knowledge_type = knowledge_type
        .map(str::parse::<KnowledgeType>)
        .transpose()?;
    if let Some(q) = min_quality {
        if !(1..=5).contains(&q) {
            anyhow::bail!("--min-quality must be between 1 and 5, got {q}");
        }
    }
    Ok(SearchFilters {
        category: category.map(|c| c.to_lowercase()),
        speaker,
        tag: tag.map(|t| t.to_lowercase()),
        topic,
        knowledge_type,
        min_quality,
        recency_days,
        limit,
        ..SearchFilters::default()
    })
}

fn retriever(pool: &sqlx::PgPool, config: &cbrain_core::AppConfig) -> anyhow::Result<Retriever> {
    Ok(Retriever::new(
        Arc::new(PgStore::new(pool.clone())),
        embedder_from_app_config(config)?,
    ))
}

pub(crate) async fn run_search(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    query: &str,
    filters: &SearchFilters,
    scope: &Scope,
    as_json: bool,
) -> anyhow::Result<()> {
    let results = retriever(pool, config)?.search(query, filters, scope).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("no knowledge entries matched '{query}'");
        return Ok(());
    }

    println!("{:<7}{:<4}{:<15}{:<14}CONTENT", "SIM", "Q", "TYPE", "CATEGORY");
    for scored in &results {
        let sim = scored
            .similarity
            .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
        println!(
            "{:<7}{:<4}{:<15}{:<14}{}",
            sim,
            scored.entry.quality_score,
            scored.entry.knowledge_type.as_str(),
            truncate(&scored.entry.category, 12),
            truncate(&scored.entry.content, 80)
        );
    }
    Ok(())
}

pub(crate) async fn run_context(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    query: &str,
    scope: &Scope,
    budget: usize,
    quality_boost: f32,
) -> anyhow::Result<()> {
    let context = retriever(pool, config)?
        .compile_context(query, scope, budget, quality_boost)
        .await?;
    if context.is_empty() {
        println!("no knowledge available for '{query}'");
    } else {
        println!("{context}");
    }
    Ok(())
}
