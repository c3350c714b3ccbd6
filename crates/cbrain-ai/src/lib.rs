//! Clients for the external embedding and language-model providers.
//!
//! Both providers sit behind traits ([`EmbeddingProvider`], [`LanguageModel`])
//! so the pipeline can be driven by scripted fakes in tests.

pub mod embeddings;
pub mod error;
pub mod json;
pub mod llm;
pub(crate) mod retry;

pub use embeddings::{EmbeddingProvider, TeiEmbedder};
pub use error::AiError;
pub use json::{parse_model_json, strip_code_fences, ModelOutput};
pub use llm::{AnthropicClient, LanguageModel};
