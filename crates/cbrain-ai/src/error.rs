use thiserror::Error;

/// Errors returned by the provider clients.
#[derive(Debug, Error)]
pub enum AiError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The provider answered but the payload was unusable (empty, wrong length).
    #[error("{provider} returned an unusable response: {reason}")]
    InvalidResponse {
        provider: &'static str,
        reason: String,
    },

    /// The client was built with invalid settings.
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl AiError {
    /// `true` for failures worth retrying after a delay: network-level errors,
    /// rate limiting and 5xx/overload statuses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            AiError::Status { status, .. } => is_retriable_status(*status),
            AiError::Deserialize { .. } | AiError::InvalidResponse { .. } | AiError::Config(_) => {
                false
            }
        }
    }
}

/// HTTP statuses a provider uses for transient conditions.
pub(crate) fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}
