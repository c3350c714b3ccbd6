use cbrain_ai::AiError;
use cbrain_core::CoreError;
use cbrain_db::DbError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum BrainError {
    /// One item failed validation; callers skip it and carry on.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Provider failure after the client's own retries. Only transient
    /// provider errors are worth another job attempt.
    #[error("external service failed: {0}")]
    ExternalService(#[from] AiError),

    /// A best-effort side effect did not apply, or a compare-and-set lost a race.
    #[error("consistency: {0}")]
    Consistency(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("store error: {0}")]
    Store(#[from] DbError),
}

impl BrainError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        BrainError::NotFound { entity, id }
    }

    /// Whether the job queue should try again later.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            BrainError::ExternalService(e) => e.is_transient(),
            BrainError::Store(e) => e.is_transient(),
            BrainError::Validation(_)
            | BrainError::NotFound { .. }
            | BrainError::Consistency(_)
            | BrainError::Core(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_outage_is_retriable_but_bad_credentials_are_not() {
        let outage = BrainError::from(AiError::Status {
            provider: "anthropic",
            status: 503,
            body: String::new(),
        });
        assert!(outage.is_retriable());

        let unauthorized = BrainError::from(AiError::Status {
            provider: "anthropic",
            status: 401,
            body: "invalid x-api-key".to_string(),
        });
        assert!(!unauthorized.is_retriable());
        assert!(!BrainError::from(AiError::Config("missing key".to_string())).is_retriable());
    }

    #[test]
    fn not_found_is_not_retriable() {
        assert!(!BrainError::not_found("document", Uuid::nil()).is_retriable());
        assert!(!BrainError::Validation("bad".to_string()).is_retriable());
    }
}
