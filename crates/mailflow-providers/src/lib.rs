//! # Mailflow Providers
//!
//! The summarization capability over OpenAI-compatible chat APIs. Works
//! against local Ollama (the default endpoint) and any hosted service
//! speaking the same protocol; they differ only by URL and API key.

pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleSummarizer;

use std::sync::Arc;

use mailflow_core::config::AiConfig;
use mailflow_core::traits::Summarizer;

/// Build the configured summarizer, resolving the model name against the
/// endpoint's advertised list.
pub async fn create_summarizer(config: &AiConfig) -> Arc<dyn Summarizer> {
    let mut summarizer = OpenAiCompatibleSummarizer::new(config);
    summarizer.resolve_model().await;
    Arc::new(summarizer)
}
