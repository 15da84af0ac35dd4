use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::provider::{check_status, http_client, parse_error, request_error, ChatModel, TextStream};
use super::settings::{AiProviderType, AiSettings};
use super::stream::{line_stream, sse_data, text_stream};
use crate::models::error::{AgentError, Result};
use crate::models::{Message, MessageRole};

/// Google Gemini API provider.
///
/// Uses the Gemini REST API which differs from OpenAI:
/// - Auth via `?key=` query parameter
/// - Assistant turns use the `model` role
/// - System prompt via `systemInstruction`
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint_url: String,
    temperature: f32,
    max_tokens: i32,
}

impl GeminiProvider {
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

    fn gemini_request(&self, messages: &[Message]) -> GeminiRequest {
        let system: Vec<GeminiPart> = messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| GeminiPart {
                text: m.content.clone(),
            })
            .collect();

        GeminiRequest {
            contents: messages
                .iter()
                .filter(|m| !m.is_system())
                .map(|m| GeminiContent {
                    role: Some(
                        match m.role {
                            MessageRole::Assistant => "model",
                            _ => "user",
                        }
                        .to_string(),
                    ),
                    parts: vec![GeminiPart {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            system_instruction: if system.is_empty() {
                None
            } else {
                Some(GeminiContent {
                    role: None,
                    parts: system,
                })
            },
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: Some(self.max_tokens),
            }),
        }
    }

    async fn send(&self, method: &str, messages: &[Message]) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1beta/models/{}:{}key={}",
            self.endpoint_url, self.model, method, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.gemini_request(messages))
            .send()
            .await
            .map_err(|e| request_error(AiProviderType::Gemini, e))?;

        check_status(AiProviderType::Gemini, response).await
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Text of the first candidate, with its parts joined
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;

    match serde_json::from_str::<GeminiResponse>(data) {
        Ok(response) => Some(response.text()).filter(|t| !t.is_empty()).map(Ok),
        Err(e) => Some(Err(parse_error(AiProviderType::Gemini, e))),
    }
}

#[async_trait]
impl ChatModel for GeminiProvider {
    fn provider_type(&self) -> AiProviderType {
        AiProviderType::Gemini
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        info!("Sending completion request to Gemini ({})", self.model);

        let response = self.send("generateContent?", messages).await?;
        let response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| parse_error(AiProviderType::Gemini, e))?;

        let text = response.text();
        if text.is_empty() {
            return Err(AgentError::Provider("gemini returned no candidates".to_string()));
        }
        Ok(text)
    }

    async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream> {
        info!("Streaming completion from Gemini ({})", self.model);

        let response = self
            .send("streamGenerateContent?alt=sse&", messages)
            .await?;
        Ok(text_stream(line_stream(response.bytes_stream()), parse_stream_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        let settings = AiSettings {
            api_key: Some("g-key".to_string()),
            ..AiSettings::for_provider(AiProviderType::Gemini)
        };
        GeminiProvider::new(&settings).unwrap()
    }

    #[test]
    fn test_request_roles_and_system_instruction() {
        let request = provider().gemini_request(&[
            Message::system("You are howai"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are howai");
        assert_eq!(json["contents"].as_array().unwrap().len(), 2);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert!(json["generationConfig"]["maxOutputTokens"].is_number());
    }

    #[test]
    fn test_parse_stream_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Run "},{"text":"ls"}],"role":"model"}}]}"#;
        assert_eq!(parse_stream_line(line).unwrap().unwrap(), "Run ls");
    }

    #[test]
    fn test_parse_stream_line_without_text() {
        let usage_only = r#"data: {"usageMetadata":{"totalTokenCount":12}}"#;
        assert!(parse_stream_line(usage_only).is_none());
        assert!(parse_stream_line("").is_none());
    }

    #[test]
    fn test_parse_stream_line_malformed() {
        let result = parse_stream_line("data: [oops").unwrap();
        assert!(matches!(result, Err(AgentError::ParseError(_))));
    }
}
