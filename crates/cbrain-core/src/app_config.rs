use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub templates_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of the TEI-compatible embedding server. `None` disables embeddings.
    pub tei_url: Option<String>,
    pub embeddings_enabled: bool,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_fast_model: String,
    pub request_timeout_secs: u64,
    pub provider_max_retries: u32,
    pub provider_backoff_base_ms: u64,
    pub extract_batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub topic_similarity_threshold: f32,
    pub template_min_similarity: f32,
    pub template_cache_ttl_secs: u64,
    pub template_cache_capacity: usize,
    pub context_budget_chars: usize,
    pub job_poll_interval_ms: u64,
    pub job_max_attempts: i32,
    pub job_backoff_base_secs: u64,
    pub analysis_cron: String,
}

impl AppConfig {
    /// Embeddings are used only when the flag is on and a provider URL is configured.
    #[must_use]
    pub fn embeddings_active(&self) -> bool {
        self.embeddings_enabled && self.tei_url.is_some()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("templates_path", &self.templates_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("tei_url", &self.tei_url)
            .field("embeddings_enabled", &self.embeddings_enabled)
            .field("llm_base_url", &self.llm_base_url)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("llm_model", &self.llm_model)
            .field("llm_fast_model", &self.llm_fast_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("provider_max_retries", &self.provider_max_retries)
            .field("provider_backoff_base_ms", &self.provider_backoff_base_ms)
            .field("extract_batch_size", &self.extract_batch_size)
            .field("inter_batch_delay_ms", &self.inter_batch_delay_ms)
            .field(
                "topic_similarity_threshold",
                &self.topic_similarity_threshold,
            )
            .field("template_min_similarity", &self.template_min_similarity)
            .field("template_cache_ttl_secs", &self.template_cache_ttl_secs)
            .field("template_cache_capacity", &self.template_cache_capacity)
            .field("context_budget_chars", &self.context_budget_chars)
            .field("job_poll_interval_ms", &self.job_poll_interval_ms)
            .field("job_max_attempts", &self.job_max_attempts)
            .field("job_backoff_base_secs", &self.job_backoff_base_secs)
            .field("analysis_cron", &self.analysis_cron)
            .finish()
    }
}
