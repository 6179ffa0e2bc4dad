//! Construction of the hosted completion provider.

use crate::error::FocusyncError;
use autoagents_llm::LLMProvider;
use autoagents_llm::backends::openai::OpenAI;
use autoagents_llm::builder::LLMBuilder;
use focusync_config::ChatConfig;
use log::info;
use std::sync::Arc;

/// Build an OpenAI-backed provider with the configured model and sampling.
pub fn build_openai_provider(
    config: &ChatConfig,
    api_key: impl Into<String>,
) -> Result<Arc<dyn LLMProvider>, FocusyncError> {
    let api_key = api_key.into();
    if api_key.trim().is_empty() {
        return Err(FocusyncError::Invalid("api key is empty".to_string()));
    }
    let llm: Arc<dyn LLMProvider> = LLMBuilder::<OpenAI>::new()
        .api_key(api_key)
        .model(config.model.clone())
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
        .build()
        .map_err(|err| FocusyncError::Llm(err.to_string()))?;
    info!(
        "built companion chat provider (model={}, temperature={}, max_tokens={})",
        config.model, config.temperature, config.max_tokens
    );
    Ok(llm)
}
