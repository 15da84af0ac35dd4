use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::provider::{check_status, http_client, parse_error, request_error, ChatModel, TextStream};
use super::settings::{AiProviderType, AiSettings};
use super::stream::{line_stream, sse_data, text_stream};
use crate::models::error::{AgentError, Result};
use crate::models::{Message, MessageRole};

/// Anthropic API provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint_url: String,
    temperature: f32,
    max_tokens: i32,
}

impl AnthropicProvider {
    pub fn new(settings: &AiSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(settings)?,
            api_key: settings.api_key().to_string(),
            model: settings.model_name.clone(),
            endpoint_url: settings.base_url().to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Get the API version header
    fn api_version(&self) -> &str {
        "2023-06-01"
    }

    /// System messages go in the top-level `system` field, not in `messages`
    fn messages_request(&self, messages: &[Message], stream: bool) -> AnthropicRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
            .collect();

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages: messages
                .iter()
                .filter(|m| !m.is_system())
                .map(|m| AnthropicMessage {
                    role: match m.role {
                        MessageRole::Assistant => "assistant".to_string(),
                        _ => "user".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(self.temperature),
            stream,
        }
    }

    async fn send(&self, request: &AnthropicRequest) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.endpoint_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", self.api_version())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(AiProviderType::Anthropic, e))?;

        check_status(AiProviderType::Anthropic, response).await
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Streaming event; only `content_block_delta` and `error` carry anything we use
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;

    let event = match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => event,
        Err(e) => return Some(Err(parse_error(AiProviderType::Anthropic, e))),
    };

    match event.event_type.as_str() {
        "content_block_delta" => event.delta.and_then(|d| d.text).map(Ok),
        "error" => {
            let message = event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string());
            Some(Err(AgentError::Provider(format!("anthropic: {}", message))))
        }
        _ => None,
    }
}

#[async_trait]
impl ChatModel for AnthropicProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        info!("Sending completion request to Anthropic ({})", self.model);

        let response = self.send(&self.messages_request(messages, false)).await?;
        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| parse_error(AiProviderType::Anthropic, e))?;

        Ok(response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream> {
        info!("Streaming completion from Anthropic ({})", self.model);

        let response = self.send(&self.messages_request(messages, true)).await?;
        Ok(text_stream(line_stream(response.bytes_stream()), parse_stream_line))
    }
}
