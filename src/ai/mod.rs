//! AI Provider Module
//!
//! This module provides a multi-provider chat abstraction.
//! Supports OpenAI-compatible APIs (OpenAI, DeepSeek, OpenRouter), Ollama,
//! Anthropic and Gemini, all with streaming. OpenAI-compatible providers can
//! also call a web search tool mid-turn.

mod anthropic;
mod gemini;
mod ollama;
mod openai_compat;
mod provider;
mod search;
mod settings;
mod stream;

// Provider implementations
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;

// Common provider types
pub use provider::{ChatModel, TextStream};

// Web search tool
pub use search::{DuckDuckGoSearch, SearchResult, SearchTool, SEARCH_TOOL_NAME};

// Settings
pub use settings::{AiProviderType, AiSettings};

use std::sync::Arc;

use crate::models::error::Result;

/// Create a chat model based on settings
pub fn create_provider(settings: &AiSettings) -> Result<Arc<dyn ChatModel>> {
    settings.validate()?;

    let provider: Arc<dyn ChatModel> = match settings.provider {
        AiProviderType::OpenAi | AiProviderType::DeepSeek | AiProviderType::OpenRouter => {
            let mut provider = OpenAiCompatProvider::new(settings)?;
            if settings.web_search {
                provider = provider.with_search_tool(Arc::new(DuckDuckGoSearch::new()?));
            }
            Arc::new(provider)
        }
        AiProviderType::Ollama => Arc::new(OllamaProvider::new(settings)?),
        AiProviderType::Anthropic => Arc::new(AnthropicProvider::new(settings)?),
        AiProviderType::Gemini => Arc::new(GeminiProvider::new(settings)?),
    };

    tracing::debug!(
        "Created {} provider with model {} (web search: {})",
        provider.provider_type(),
        provider.model_name(),
        settings.web_search && supports_web_search(settings.provider)
    );

    Ok(provider)
}

/// Providers whose client can call the search tool
pub fn supports_web_search(provider: AiProviderType) -> bool {
    matches!(
        provider,
        AiProviderType::OpenAi | AiProviderType::DeepSeek | AiProviderType::OpenRouter
    )
}
