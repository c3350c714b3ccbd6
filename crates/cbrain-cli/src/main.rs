mod content;
mod db;
mod jobs;
mod knowledge;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::content::TemplateCommands;
use crate::db::DbCommands;
use crate::jobs::JobCommands;

#[derive(Debug, Parser)]
#[command(name = "cbrain-cli")]
#[command(about = "Content Brain operator interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Store a transcript and extract knowledge and ideas from it
    Ingest {
        /// Owner of the document
        #[arg(long)]
        owner: Uuid,
        /// Team sharing the document
        #[arg(long)]
        team: Option<Uuid>,
        /// Plain-text transcript file
        #[arg(long)]
        file: PathBuf,
        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
        /// Speaker credited when a segment names none
        #[arg(long)]
        speaker: Option<String>,
        /// Run extraction in-process instead of enqueueing jobs
        #[arg(long)]
        now: bool,
    },
    /// Drop a document's derived knowledge and extract it again
    Reprocess {
        document_id: Uuid,
        /// Run in-process instead of enqueueing a job
        #[arg(long)]
        now: bool,
    },
    /// Search knowledge entries
    Search {
        query: String,
        #[arg(long)]
        owner: Uuid,
        #[arg(long)]
        team: Option<Uuid>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        speaker: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        /// Knowledge type, e.g. `how_to` or `mistake`
        #[arg(long = "type")]
        knowledge_type: Option<String>,
        #[arg(long)]
        min_quality: Option<i16>,
        /// Only entries created within this many days
        #[arg(long)]
        recency_days: Option<u32>,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Compile a knowledge context block for a prompt
    Context {
        query: String,
        #[arg(long)]
        owner: Uuid,
        #[arg(long)]
        team: Option<Uuid>,
        /// Character budget (defaults to `CBRAIN_CONTEXT_BUDGET_CHARS`)
        #[arg(long)]
        budget: Option<usize>,
        #[arg(long, default_value = "0.5")]
        quality_boost: f32,
    },
    /// Template matching
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Recompute performance patterns for an owner
    Analyze {
        #[arg(long)]
        owner: Uuid,
        /// Also ask the model for a short written insight
        #[arg(long)]
        insight: bool,
    },
    /// Generate a draft for a selected content idea
    Write {
        idea_id: Uuid,
        /// Run in-process instead of enqueueing a job
        #[arg(long)]
        now: bool,
    },
    /// Inspect and enqueue background jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("cbrain-cli: no command given; run with --help");
        return Ok(());
    };

    let config = cbrain_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = cbrain_db::PoolConfig::from_app_config(&config);
    let pool = cbrain_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => db::run_db(&pool, &config, command).await,
        Commands::Ingest {
            owner,
            team,
            file,
            title,
            speaker,
            now,
        } => {
            let request = knowledge::IngestRequest {
                owner,
                team,
                file,
                title,
                speaker,
            };
            knowledge::run_ingest(&pool, &config, request, now).await
        }
        Commands::Reprocess { document_id, now } => {
            knowledge::run_reprocess(&pool, &config, document_id, now).await
        }
        Commands::Search {
            query,
            owner,
            team,
            category,
            speaker,
            tag,
            topic,
            knowledge_type,
            min_quality,
            recency_days,
            limit,
            json,
        } => {
            let filters = knowledge::build_filters(
                category,
                speaker,
                tag,
                topic,
                knowledge_type.as_deref(),
                min_quality,
                recency_days,
                limit,
            )?;
            let scope = scope_of(owner, team);
            knowledge::run_search(&pool, &config, &query, &filters, &scope, json).await
        }
        Commands::Context {
            query,
            owner,
            team,
            budget,
            quality_boost,
        } => {
            let budget = budget.unwrap_or(config.context_budget_chars);
            let scope = scope_of(owner, team);
            knowledge::run_context(&pool, &config, &query, &scope, budget, quality_boost).await
        }
        Commands::Templates { command } => content::run_templates(&pool, &config, command).await,
        Commands::Analyze { owner, insight } => {
            content::run_analyze(&pool, &config, owner, insight).await
        }
        Commands::Write { idea_id, now } => content::run_write(&pool, &config, idea_id, now).await,
        Commands::Jobs { command } => jobs::run_jobs(&pool, command).await,
    }
}

fn scope_of(owner: Uuid, team: Option<Uuid>) -> cbrain_core::Scope {
    match team {
        Some(team) => cbrain_core::Scope::team(owner, team),
        None => cbrain_core::Scope::owner(owner),
    }
}

/// Enqueue one job and print its public id.
pub(crate) async fn enqueue_and_report(
    pool: &sqlx::PgPool,
    job_type: cbrain_brain::JobType,
    payload: &serde_json::Value,
) -> anyhow::Result<()> {
    job_type.validate_payload(payload)?;
    let job = cbrain_db::enqueue_job(pool, job_type.as_str(), payload).await?;
    println!("queued {job_type} job {}", job.public_id);
    Ok(())
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests;
