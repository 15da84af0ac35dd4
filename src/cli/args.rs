use clap::Parser;

use crate::ai::{AiProviderType, AiSettings};
use crate::models::error::Result;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "howai")]
#[command(version, about = "Terminal coding assistant that suggests shell commands and runs them on request", long_about = None)]
pub struct Args {
    /// Model provider: openai, gemini, anthropic, deepseek, ollama or openrouter
    #[arg(short, long, env = "HOWAI_PROVIDER")]
    pub provider: Option<AiProviderType>,

    /// Model name, overriding the provider default
    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider endpoint, e.g. a remote Ollama server
    #[arg(long)]
    pub base_url: Option<String>,

    /// Kill commands that run longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Do not let the model search the web
    #[arg(long)]
    pub no_search: bool,

    /// First question to ask before entering the prompt
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,
}

impl Args {
    /// Settings from the environment with flags applied on top
    pub fn settings(&self) -> Result<AiSettings> {
        let settings = AiSettings::from_env(self.provider)?;
        Ok(self.apply(settings))
    }

    fn apply(&self, mut settings: AiSettings) -> AiSettings {
        if let Some(model) = &self.model {
            settings.model_name = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            settings.endpoint_url = base_url.clone();
        }
        if let Some(secs) = self.command_timeout {
            settings.command_timeout_secs = Some(secs).filter(|s| *s > 0);
        }
        if self.no_search {
            settings.web_search = false;
        }
        settings
    }

    pub fn initial_query(&self) -> Option<String> {
        let query = self.query.join(" ");
        let query = query.trim();
        if query.is_empty() {
            None
        } else {
            Some(query.to_string())
        }
    }
}
