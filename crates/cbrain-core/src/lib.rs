//! Domain types and configuration shared by every Content Brain crate.

pub mod app_config;
pub mod config;
pub mod knowledge;
pub mod performance;
pub mod slug;
pub mod templates;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use knowledge::{
    embedding_text, Actionability, ContentIdea, IdeaStatus, KnowledgeEntry, KnowledgeType,
    NewKnowledgeEntry, Scope, SourceDocument, Template, Topic, VoiceProfile,
};
pub use performance::{PatternType, PerformancePattern, PerformanceRecord};
pub use slug::{is_stop_word, normalize_label, normalize_tag, slugify};
pub use templates::{load_templates, TemplateConfig, TemplatesFile};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid knowledge type: {0}")]
    InvalidKnowledgeType(String),

    #[error("invalid actionability: {0}")]
    InvalidActionability(String),

    #[error("invalid idea status: {0}")]
    InvalidIdeaStatus(String),

    #[error("invalid pattern type: {0}")]
    InvalidPatternType(String),

    #[error("illegal idea status transition {from} -> {to}")]
    IllegalTransition { from: IdeaStatus, to: IdeaStatus },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read templates file {path}: {source}")]
    TemplatesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse templates file: {0}")]
    TemplatesFileParse(#[from] serde_yaml::Error),

    #[error("templates validation failed: {0}")]
    Validation(String),
}
