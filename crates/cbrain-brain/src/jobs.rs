//! Background job types, payloads and dispatch onto the pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::pipeline::ContentBrain;
use crate::BrainError;

/// Longest wait between attempts of a retried job.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ExtractKnowledge,
    ExtractIdeas,
    ReprocessDocument,
    WritePost,
    AnalyzePerformance,
    ClassifyEdit,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::ExtractKnowledge,
        JobType::ExtractIdeas,
        JobType::ReprocessDocument,
        JobType::WritePost,
        JobType::AnalyzePerformance,
        JobType::ClassifyEdit,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ExtractKnowledge => "extract_knowledge",
            JobType::ExtractIdeas => "extract_ideas",
            JobType::ReprocessDocument => "reprocess_document",
            JobType::WritePost => "write_post",
            JobType::AnalyzePerformance => "analyze_performance",
            JobType::ClassifyEdit => "classify_edit",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrainError::Validation(format!("unknown job type '{s}'")))
    }
}

/// Payload of `extract_knowledge`, `extract_ideas` and `reprocess_document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJob {
    pub document_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritePostJob {
    pub idea_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzePerformanceJob {
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyEditJob {
    pub owner_id: Uuid,
    #[serde(default)]
    pub idea_id: Option<Uuid>,
    pub ai_text: String,
    pub edited_text: String,
}

fn parse_payload<T: DeserializeOwned>(job_type: JobType, payload: &Value) -> Result<T, BrainError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| BrainError::Validation(format!("invalid {job_type} payload: {e}")))
}

impl JobType {
    /// Check that `payload` has the shape this job type expects, so a bad
    /// request is rejected at enqueue time rather than by the worker.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Validation`] naming the first missing or
    /// mistyped field.
    pub fn validate_payload(self, payload: &Value) -> Result<(), BrainError> {
        match self {
            JobType::ExtractKnowledge | JobType::ExtractIdeas | JobType::ReprocessDocument => {
                parse_payload::<DocumentJob>(self, payload).map(drop)
            }
            JobType::WritePost => parse_payload::<WritePostJob>(self, payload).map(drop),
            JobType::AnalyzePerformance => {
                parse_payload::<AnalyzePerformanceJob>(self, payload).map(drop)
            }
            JobType::ClassifyEdit => parse_payload::<ClassifyEditJob>(self, payload).map(drop),
        }
    }
}

/// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`]. Attempt numbers
/// start at 1.
#[must_use]
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY))
}

impl ContentBrain {
    /// Run one job and return its result payload.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Validation`] for a malformed payload, otherwise
    /// the error of the underlying operation. [`BrainError::is_retriable`]
    /// tells the queue whether to try again.
    pub async fn dispatch(&self, job_type: JobType, payload: &Value) -> Result<Value, BrainError> {
        tracing::debug!(job_type = %job_type, "dispatching job");
        match job_type {
            JobType::ExtractKnowledge => {
                let job: DocumentJob = parse_payload(job_type, payload)?;
                let entries = self.extractor().extract_document(job.document_id).await?;
                Ok(json!({
                    "document_id": job.document_id,
                    "entries": entries.len(),
                }))
            }
            JobType::ExtractIdeas => {
                let job: DocumentJob = parse_payload(job_type, payload)?;
                let ideas = self.extractor().extract_ideas(job.document_id).await?;
                Ok(json!({
                    "document_id": job.document_id,
                    "ideas": ideas,
                }))
            }
            JobType::ReprocessDocument => {
                let job: DocumentJob = parse_payload(job_type, payload)?;
                let report = self.extractor().reprocess(job.document_id).await?;

                let mut skipped_stages = Vec::new();
                let ideas = match self.extractor().extract_ideas(job.document_id).await {
                    Ok(ids) => ids.len(),
                    Err(e) => {
                        tracing::warn!(
                            document_id = %job.document_id,
                            error = %e,
                            "idea extraction after reprocess failed"
                        );
                        skipped_stages.push("extract_ideas");
                        0
                    }
                };
                Ok(json!({
                    "document_id": job.document_id,
                    "entries_removed": report.entries_removed,
                    "ideas_removed": report.ideas_removed,
                    "tag_decrements": report.tag_decrements,
                    "entries": report.entries.len(),
                    "ideas": ideas,
                    "skipped_stages": skipped_stages,
                }))
            }
            JobType::WritePost => {
                let job: WritePostJob = parse_payload(job_type, payload)?;
                let outcome = self.write_post(job.idea_id).await?;
                Ok(json!(outcome))
            }
            JobType::AnalyzePerformance => {
                let job: AnalyzePerformanceJob = parse_payload(job_type, payload)?;
                let report = self.analyzer().analyze_with_insight(job.owner_id).await?;
                Ok(json!({
                    "owner_id": report.owner_id,
                    "records_analyzed": report.records_analyzed,
                    "patterns": report.patterns.len(),
                    "insight": report.insight,
                }))
            }
            JobType::ClassifyEdit => {
                let job: ClassifyEditJob = parse_payload(job_type, payload)?;
                let (patterns, record_id) = self
                    .classifier()
                    .record(job.owner_id, job.idea_id, &job.ai_text, &job.edited_text)
                    .await?;
                Ok(json!({
                    "record_id": record_id,
                    "patterns": patterns,
                }))
            }
        }
    }
}
