//! Database operations for the `jobs` queue table.
//!
//! Lifecycle: `pending` -> `processing` -> `completed` | `failed`, with
//! `processing` -> `pending` when a retriable failure is rescheduled.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    /// The schema defines this as `INTEGER NOT NULL DEFAULT 0`.
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const RETURNING_COLUMNS: &str = "id, public_id, job_type, payload, status, attempts, run_after, \
     result, error_message, started_at, completed_at, created_at";

/// Enqueue a job that becomes claimable immediately.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_job(
    pool: &PgPool,
    job_type: &str,
    payload: &serde_json::Value,
) -> Result<JobRow, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "INSERT INTO jobs (public_id, job_type, payload) VALUES ($1, $2, $3) \
         RETURNING {RETURNING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(job_type)
    .bind(payload)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Claim the oldest due `pending` job, moving it to `processing` and bumping
/// its attempt counter. Concurrent workers never claim the same row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the claim fails.
pub async fn claim_next_job(pool: &PgPool) -> Result<Option<JobRow>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "UPDATE jobs SET status = 'processing', attempts = attempts + 1, \
             started_at = NOW(), updated_at = NOW() \
         WHERE id = ( \
             SELECT id FROM jobs \
             WHERE status = 'pending' AND run_after <= NOW() \
             ORDER BY run_after, id \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1) \
         RETURNING {RETURNING_COLUMNS}"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Mark a `processing` job `completed` with its result payload.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job(pool: &PgPool, id: i64, result: &serde_json::Value) -> Result<(), DbError> {
    let outcome = sqlx::query(
        "UPDATE jobs SET status = 'completed', result = $1, error_message = NULL, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND status = 'processing'",
    )
    .bind(result)
    .bind(id)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }
    Ok(())
}

/// Mark a `processing` job permanently `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let outcome = sqlx::query(
        "UPDATE jobs SET status = 'failed', error_message = $1, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $2 AND status = 'processing'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }
    Ok(())
}

/// Put a `processing` job back to `pending`, claimable again at `run_after`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `processing`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn reschedule_job(
    pool: &PgPool,
    id: i64,
    run_after: DateTime<Utc>,
    error_message: &str,
) -> Result<(), DbError> {
    let outcome = sqlx::query(
        "UPDATE jobs SET status = 'pending', run_after = $1, error_message = $2, \
             updated_at = NOW() \
         WHERE id = $3 AND status = 'processing'",
    )
    .bind(run_after)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if outcome.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }
    Ok(())
}

/// Fetch a job by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no job has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_job_by_public_id(pool: &PgPool, public_id: Uuid) -> Result<JobRow, DbError> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {RETURNING_COLUMNS} FROM jobs WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// The most recent `limit` jobs, optionally restricted to one status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs(
    pool: &PgPool,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {RETURNING_COLUMNS} FROM jobs \
         WHERE ($1::TEXT IS NULL OR status = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
