use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::provider::{check_status, http_client, parse_error, request_error, ChatModel, TextStream};
use super::settings::{AiProviderType, AiSettings};
use super::stream::{line_stream, text_stream};
use crate::models::error::{AgentError, Result};
use crate::models::Message;

/// Ollama API provider
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(settings: &AiSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(settings)?,
            base_url: settings.base_url().to_string(),
            model: settings.model_name.clone(),
            temperature: settings.temperature,
        })
    }

    fn chat_request(&self, messages: &[Message], stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream,
            options: OllamaOptions {
                temperature: Some(self.temperature),
            },
        }
    }

    async fn send(&self, request: &OllamaChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(AiProviderType::Ollama, e))?;

        check_status(AiProviderType::Ollama, response).await
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// One line of `/api/chat` output; the non-streaming reply has the same shape
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaChatResponse {
    fn into_text(self) -> Option<Result<String>> {
        if let Some(error) = self.error {
            return Some(Err(AgentError::Provider(format!("ollama: {}", error))));
        }
        self.message
            .map(|m| m.content)
            .filter(|content| !content.is_empty())
            .map(Ok)
    }
}

fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaChatResponse>(line) {
        Ok(chunk) => chunk.into_text(),
        Err(e) => Some(Err(parse_error(AiProviderType::Ollama, e))),
    }
}

#[async_trait]
impl ChatModel for OllamaProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::Ollama
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        info!("Sending completion request to Ollama ({})", self.model);

        let response = self.send(&self.chat_request(messages, false)).await?;
        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| parse_error(AiProviderType::Ollama, e))?;

        chat_response.into_text().unwrap_or_else(|| Ok(String::new()))
    }

    async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream> {
        info!("Streaming completion from Ollama ({})", self.model);

        let response = self.send(&self.chat_request(messages, true)).await?;
        Ok(text_stream(line_stream(response.bytes_stream()), parse_stream_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serialization() {
        let provider = OllamaProvider::new(&AiSettings::for_provider(AiProviderType::Ollama)).unwrap();
        let request = provider.chat_request(&[Message::user("hi")], true);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json["options"]["temperature"].is_number());
    }

    #[test]
    fn test_parse_ndjson_line() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"ls"},"done":false}"#;
        assert_eq!(parse_stream_line(line).unwrap().unwrap(), "ls");
    }

    #[test]
    fn test_parse_done_line_has_no_text() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert!(parse_stream_line(line).is_none());
        assert!(parse_stream_line("   ").is_none());
    }

    #[test]
    fn test_parse_error_line() {
        let line = r#"{"error":"model 'llama9' not found"}"#;
        let result = parse_stream_line(line).unwrap();
        assert!(matches!(result, Err(AgentError::Provider(msg)) if msg.contains("not found")));
    }
}
