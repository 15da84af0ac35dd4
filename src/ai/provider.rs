use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::{Client, Response};
use std::time::Duration;

use super::settings::{AiProviderType, AiSettings};
use crate::models::error::{AgentError, Result};
use crate::models::Message;

/// Text fragments of a streamed completion, in provider order
pub type TextStream = BoxStream<'static, Result<String>>;

/// Capability every model provider implements.
///
/// The session only ever talks to a `dyn ChatModel`; wire formats stay inside
/// the implementations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> AiProviderType;

    /// Model identifier sent to the provider
    fn model_name(&self) -> &str;

    /// Complete the conversation in one response
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Complete the conversation as a stream of text fragments
    async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream>;
}

/// Build the HTTP client shared by a provider's requests
pub(crate) fn http_client(settings: &AiSettings) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status to the matching error
pub(crate) fn status_error(provider: AiProviderType, status: u16, body: &str) -> AgentError {
    let message = format!("{} returned error {}: {}", provider, status, body.trim());
    match status {
        401 | 403 => AgentError::Authentication(message),
        429 => AgentError::RateLimited(message),
        _ => AgentError::Provider(message),
    }
}

/// Pass successful responses through; turn the rest into errors
pub(crate) async fn check_status(provider: AiProviderType, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!("{} request failed with {}", provider, status);
    Err(status_error(provider, status.as_u16(), &body))
}

pub(crate) fn request_error(provider: AiProviderType, err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(format!("Request to {} timed out: {}", provider, err))
    } else {
        AgentError::Provider(format!("Failed to send request to {}: {}", provider, err))
    }
}

pub(crate) fn parse_error(provider: AiProviderType, err: impl std::fmt::Display) -> AgentError {
    AgentError::ParseError(format!("Failed to parse {} response: {}", provider, err))
}
