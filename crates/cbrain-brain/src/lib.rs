//! The Content Brain pipeline.
//!
//! Turns transcripts into classified knowledge entries, normalizes their
//! topics, retrieves knowledge and templates to brief a post writer, and
//! mines published-post performance into patterns that feed back into
//! briefs. Persistence goes through [`store::BrainStore`]; model and
//! embedding providers come from `cbrain-ai`.

pub mod analyzer;
pub mod briefing;
pub mod cache;
pub mod edits;
pub mod error;
pub mod extractor;
pub mod ideas;
pub mod jobs;
pub mod matcher;
pub mod pipeline;
pub mod retrieval;
pub mod segment;
pub mod similarity;
pub mod store;
pub mod topics;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{compute_patterns, confidence, AnalysisReport, PerformanceAnalyzer};
pub use briefing::{Brief, BriefingAgent, BriefingSettings};
pub use cache::EmbeddingCache;
pub use edits::{EditClassifier, EditPattern};
pub use error::BrainError;
pub use extractor::{EntryPatch, Extractor, ExtractorSettings, ReprocessReport};
pub use ideas::transition_idea;
pub use jobs::{retry_delay, JobType};
pub use matcher::{TemplateMatch, TemplateMatcher};
pub use pipeline::{embedder_from_app_config, BrainSettings, ContentBrain, WritePostOutcome};
pub use retrieval::{Retriever, ScoredEntry, SearchFilters};
pub use store::{BrainStore, InMemoryStore, NewDocument, PgStore};
pub use topics::TopicNormalizer;
pub use writer::{Draft, Polished, PostWriter};
