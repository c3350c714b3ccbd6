//! Background job scheduler.
//!
//! Registers the recurring performance-analysis run. The cron job only
//! enqueues `analyze_performance` jobs; the worker does the work, so a
//! failed analysis is retried like any other job.

use std::sync::Arc;

use cbrain_brain::JobType;
use serde_json::json;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// `analysis_cron` is not a valid schedule, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    analysis_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_analysis_job(&scheduler, pool, analysis_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the nightly analysis run (default `0 0 4 * * *`, 04:00 UTC).
async fn register_analysis_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            tracing::info!("scheduler: enqueueing performance analysis");
            let queued = enqueue_analysis_jobs(&pool).await;
            tracing::info!(queued, "scheduler: performance analysis enqueued");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: performance analysis registered");
    Ok(())
}

/// Enqueue one `analyze_performance` job per owner with performance data.
/// Returns the number of jobs enqueued.
pub(crate) async fn enqueue_analysis_jobs(pool: &PgPool) -> usize {
    let owners = match cbrain_db::list_performance_owners(pool).await {
        Ok(owners) => owners,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to load owners with performance data");
            return 0;
        }
    };

    if owners.is_empty() {
        tracing::info!("scheduler: no performance data yet; skipping");
        return 0;
    }

    let mut queued = 0usize;
    for owner_id in owners {
        let payload = json!({ "owner_id": owner_id });
        match cbrain_db::enqueue_job(pool, JobType::AnalyzePerformance.as_str(), &payload).await {
            Ok(job) => {
                tracing::debug!(owner_id = %owner_id, job_id = %job.public_id, "analysis job queued");
                queued += 1;
            }
            Err(e) => {
                tracing::warn!(owner_id = %owner_id, error = %e, "scheduler: failed to enqueue analysis");
            }
        }
    }
    queued
}
