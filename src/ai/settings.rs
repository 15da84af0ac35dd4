use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::error::{AgentError, Result};

/// AI provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderType {
    #[default]
    OpenAi,
    Gemini,
    Anthropic,
    DeepSeek,
    Ollama,
    OpenRouter,
}

impl AiProviderType {
    pub const ALL: [AiProviderType; 6] = [
        Self::OpenAi,
        Self::Gemini,
        Self::Anthropic,
        Self::DeepSeek,
        Self::Ollama,
        Self::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Hosted providers need an API key; a local Ollama server does not
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Provider-specific environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Anthropic => "https://api.anthropic.com",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Ollama => "http://localhost:11434",
            Self::OpenRouter => "https://openrouter.ai/api",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::DeepSeek => "deepseek-chat",
            Self::Ollama => "llama3.2",
            Self::OpenRouter => "openai/gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for AiProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AiProviderType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == name)
            .ok_or_else(|| AgentError::InvalidConfiguration(format!("unsupported provider: {}", s)))
    }
}

/// Provider and runtime settings, assembled from the environment and CLI flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    pub provider: AiProviderType,
    pub api_key: Option<String>,
    pub model_name: String,
    pub endpoint_url: String,
    pub temperature: f32,
    pub max_tokens: i32,
    /// Connect timeout for provider requests
    pub request_timeout_secs: u64,
    /// Upper bound on a single shell command; none means wait indefinitely
    pub command_timeout_secs: Option<u64>,
    /// Let the model call the web search tool, where the provider supports it
    pub web_search: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self::for_provider(AiProviderType::default())
    }
}

impl AiSettings {
    /// Defaults for a provider, without an API key
    pub fn for_provider(provider: AiProviderType) -> Self {
        Self {
            provider,
            api_key: None,
            model_name: provider.default_model().to_string(),
            endpoint_url: provider.default_endpoint().to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            request_timeout_secs: 30,
            command_timeout_secs: None,
            web_search: true,
        }
    }

    /// Load settings from `HOWAI_*` variables.
    ///
    /// An explicit `provider` wins over `HOWAI_PROVIDER`. The key falls back to
    /// the provider's own variable, e.g. `OPENAI_API_KEY`.
    pub fn from_env(provider: Option<AiProviderType>) -> Result<Self> {
        Self::from_lookup(provider, |name| std::env::var(name).ok())
    }

    fn from_lookup<F>(provider: Option<AiProviderType>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let provider = match provider {
            Some(provider) => provider,
            None => var("HOWAI_PROVIDER")
                .map(|name| name.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        let mut settings = Self::for_provider(provider);

        if let Some(model) = var("HOWAI_MODEL") {
            settings.model_name = model;
        }
        if let Some(base_url) = var("HOWAI_BASE_URL") {
            settings.endpoint_url = base_url;
        }

        settings.api_key = var("HOWAI_API_KEY").or_else(|| provider.api_key_env().and_then(&var));

        if let Some(secs) = var("HOWAI_COMMAND_TIMEOUT") {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                AgentError::InvalidConfiguration(format!(
                    "HOWAI_COMMAND_TIMEOUT must be a number of seconds, got {:?}",
                    secs
                ))
            })?;
            settings.command_timeout_secs = Some(secs).filter(|s| *s > 0);
        }

        if let Some(flag) = var("HOWAI_WEB_SEARCH") {
            settings.web_search = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(AgentError::InvalidConfiguration(format!(
                        "HOWAI_WEB_SEARCH must be true or false, got {:?}",
                        flag
                    )))
                }
            };
        }

        Ok(settings)
    }

    /// Check that the selected provider has everything it needs
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(format!(
                "{} model is required",
                self.provider
            )));
        }

        if self.provider.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            let hint = self
                .provider
                .api_key_env()
                .map(|env| format!(" (set HOWAI_API_KEY or {})", env))
                .unwrap_or_default();
            return Err(AgentError::InvalidConfiguration(format!(
                "{} api key is required{}",
                self.provider, hint
            )));
        }

        if self.endpoint_url.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(format!(
                "{} base url is required",
                self.provider
            )));
        }

        Ok(())
    }

    /// Endpoint without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint_url.trim_end_matches('/')
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}
