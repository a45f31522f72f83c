pub mod openai;
pub mod provider;

use crate::config::LlmSettings;
use provider::{LlmProvider, OpenAIProvider};
use std::sync::Arc;

/// Factory: build the active provider from engine settings.
pub fn build_provider(settings: &LlmSettings) -> Arc<dyn LlmProvider> {
    let api_key = settings.resolve_api_key().unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("No LLM API key configured; upstream calls will fail");
    }
    Arc::new(OpenAIProvider::new(
        api_key,
        settings.base_url.clone(),
        settings.model.clone(),
    ))
}
