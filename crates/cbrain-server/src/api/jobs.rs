//! Job queue endpoints.
//!
//! - `POST /api/v1/jobs`           enqueue `{job_type, payload}`
//! - `GET  /api/v1/jobs`           recent jobs, optional `status` filter
//! - `GET  /api/v1/jobs/{job_id}`  one job with its result or error

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use cbrain_brain::JobType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

const JOB_STATUSES: [&str; 4] = ["pending", "processing", "completed", "failed"];

#[derive(Debug, Deserialize)]
pub(super) struct EnqueueJobRequest {
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobItem {
    job_id: Uuid,
    job_type: String,
    status: String,
    attempts: i32,
    payload: Value,
    result: Option<Value>,
    error_message: Option<String>,
    run_after: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<cbrain_db::JobRow> for JobItem {
    fn from(row: cbrain_db::JobRow) -> Self {
        Self {
            job_id: row.public_id,
            job_type: row.job_type,
            status: row.status,
            attempts: row.attempts,
            payload: row.payload,
            result: row.result,
            error_message: row.error_message,
            run_after: row.run_after,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn enqueue_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<EnqueueJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<JobItem>>), ApiError> {
    let job_type: JobType = body
        .job_type
        .trim()
        .parse()
        .map_err(|e: cbrain_brain::BrainError| {
            ApiError::new(req_id.0.clone(), "validation_error", e.to_string())
        })?;
    job_type
        .validate_payload(&body.payload)
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let row = cbrain_db::enqueue_job(&state.pool, job_type.as_str(), &body.payload)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(job_id = %row.public_id, job_type = %job_type, "job enqueued");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: JobItem::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobItem>>, ApiError> {
    let row = cbrain_db::get_job_by_public_id(&state.pool, job_id)
        .await
        .map_err(|e| match e {
            cbrain_db::DbError::NotFound => {
                ApiError::new(req_id.0.clone(), "not_found", format!("job {job_id} not found"))
            }
            other => map_db_error(req_id.0.clone(), &other),
        })?;

    Ok(Json(ApiResponse {
        data: JobItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<ApiResponse<Vec<JobItem>>>, ApiError> {
    if let Some(status) = query.status.as_deref() {
        if !JOB_STATUSES.contains(&status) {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("status must be one of {}", JOB_STATUSES.join(", ")),
            ));
        }
    }

    let rows = cbrain_db::list_jobs(
        &state.pool,
        query.status.as_deref(),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(JobItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
