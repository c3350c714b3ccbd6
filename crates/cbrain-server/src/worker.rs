//! Job worker: claims due jobs from the `jobs` table and runs them through
//! the pipeline.
//!
//! One job is processed at a time. Retriable failures go back to `pending`
//! with an exponential delay; everything else ends in `failed`.

use std::sync::Arc;
use std::time::Duration;

use cbrain_brain::{retry_delay, BrainError, ContentBrain, JobType};
use cbrain_db::{DbError, JobRow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::watch;

/// Poll and retry settings for the worker loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub max_attempts: i32,
    pub backoff_base: Duration,
}

impl WorkerSettings {
    #[must_use]
    pub fn from_app_config(config: &cbrain_core::AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.job_poll_interval_ms),
            max_attempts: config.job_max_attempts,
            backoff_base: Duration::from_secs(config.job_backoff_base_secs),
        }
    }
}

/// What to do with a job after one attempt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settlement {
    Complete(Value),
    Retry {
        run_after: DateTime<Utc>,
        message: String,
    },
    Fail(String),
}

/// Decide how a finished attempt is recorded.
///
/// `attempts` is the counter after the claim, so the first run sees 1.
pub(crate) fn settle(
    outcome: Result<Value, BrainError>,
    attempts: i32,
    settings: &WorkerSettings,
    now: DateTime<Utc>,
) -> Settlement {
    match outcome {
        Ok(result) => Settlement::Complete(result),
        Err(e) if e.is_retriable() && attempts < settings.max_attempts => {
            let attempt = u32::try_from(attempts.max(1)).unwrap_or(1);
            let delay = retry_delay(settings.backoff_base, attempt);
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(1));
            Settlement::Retry {
                run_after: now + delay,
                message: e.to_string(),
            }
        }
        Err(e) if e.is_retriable() => {
            Settlement::Fail(format!("giving up after {attempts} attempts: {e}"))
        }
        Err(e) => Settlement::Fail(e.to_string()),
    }
}

/// Run the worker until `shutdown` flips to `true`.
pub async fn run(
    pool: PgPool,
    brain: Arc<ContentBrain>,
    settings: WorkerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        poll_interval_ms = settings.poll_interval.as_millis(),
        max_attempts = settings.max_attempts,
        "job worker started"
    );

    while !*shutdown.borrow() {
        let idle = match process_next(&pool, &brain, &settings).await {
            Ok(processed) => !processed,
            Err(e) => {
                tracing::error!(error = %e, "job worker: queue operation failed");
                true
            }
        };

        if idle {
            tokio::select! {
                () = tokio::time::sleep(settings.poll_interval) => {},
                _ = shutdown.changed() => {},
            }
        }
    }
}

/// Claim and run one job. Returns `false` when nothing was due.
///
/// # Errors
///
/// Returns [`DbError`] if the claim or the status update fails.
pub(crate) async fn process_next(
    pool: &PgPool,
    brain: &ContentBrain,
    settings: &WorkerSettings,
) -> Result<bool, DbError> {
    let Some(job) = cbrain_db::claim_next_job(pool).await? else {
        return Ok(false);
    };

    tracing::info!(
        job_id = %job.public_id,
        job_type = %job.job_type,
        attempt = job.attempts,
        "job claimed"
    );

    let outcome = match job.job_type.parse::<JobType>() {
        Ok(job_type) => brain.dispatch(job_type, &job.payload).await,
        Err(e) => Err(e),
    };

    record(pool, &job, settle(outcome, job.attempts, settings, Utc::now())).await?;
    Ok(true)
}

async fn record(pool: &PgPool, job: &JobRow, settlement: Settlement) -> Result<(), DbError> {
    match settlement {
        Settlement::Complete(result) => {
            cbrain_db::complete_job(pool, job.id, &result).await?;
            tracing::info!(job_id = %job.public_id, job_type = %job.job_type, "job completed");
        }
        Settlement::Retry { run_after, message } => {
            cbrain_db::reschedule_job(pool, job.id, run_after, &message).await?;
            tracing::warn!(
                job_id = %job.public_id,
                job_type = %job.job_type,
                attempt = job.attempts,
                run_after = %run_after,
                error = %message,
                "job failed, retry scheduled"
            );
        }
        Settlement::Fail(message) => {
            cbrain_db::fail_job(pool, job.id, &message).await?;
            tracing::error!(
                job_id = %job.public_id,
                job_type = %job.job_type,
                error = %message,
                "job failed permanently"
            );
        }
    }
    Ok(())
}
