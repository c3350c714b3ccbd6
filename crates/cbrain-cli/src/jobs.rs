//! Job queue commands.

use cbrain_brain::JobType;
use clap::Subcommand;
use uuid::Uuid;

use crate::{enqueue_and_report, truncate};

/// Sub-commands available under `jobs`.
#[derive(Debug, Subcommand)]
pub enum JobCommands {
    /// Enqueue a job
    Enqueue {
        /// One of: extract_knowledge, extract_ideas, reprocess_document,
        /// write_post, analyze_performance, classify_edit
        job_type: String,
        /// JSON payload, e.g. '{"document_id": "..."}'
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Show one job with its result or error
    Status { job_id: Uuid },
    /// List recent jobs
    List {
        /// Filter by status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run_jobs(pool: &sqlx::PgPool, command: JobCommands) -> anyhow::Result<()> {
    match command {
        JobCommands::Enqueue { job_type, payload } => {
            let job_type: JobType = job_type.parse()?;
            let payload: serde_json::Value = serde_json::from_str(&payload)
                .map_err(|e| anyhow::anyhow!("--payload is not valid JSON: {e}"))?;
            enqueue_and_report(pool, job_type, &payload).await
        }
        JobCommands::Status { job_id } => {
            let job = match cbrain_db::get_job_by_public_id(pool, job_id).await {
                Ok(job) => job,
                Err(cbrain_db::DbError::NotFound) => anyhow::bail!("job {job_id} not found"),
                Err(e) => return Err(e.into()),
            };
            println!("job:       {}", job.public_id);
            println!("type:      {}", job.job_type);
            println!("status:    {}", job.status);
            println!("attempts:  {}", job.attempts);
            println!("run after: {}", job.run_after.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(error) = &job.error_message {
                println!("error:     {error}");
            }
            if let Some(result) = &job.result {
                println!("result:    {}", serde_json::to_string_pretty(result)?);
            }
            Ok(())
        }
        JobCommands::List { status, limit } => {
            let jobs = cbrain_db::list_jobs(pool, status.as_deref(), limit.clamp(1, 200)).await?;
            if jobs.is_empty() {
                println!("no jobs found");
                return Ok(());
            }
            println!(
                "{:<38}{:<21}{:<12}{:<5}ERROR",
                "JOB", "TYPE", "STATUS", "TRY"
            );
            for job in &jobs {
                println!(
                    "{:<38}{:<21}{:<12}{:<5}{}",
                    job.public_id,
                    job.job_type,
                    job.status,
                    job.attempts,
                    job.error_message
                        .as_deref()
                        .map(|e| truncate(e, 50))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}
