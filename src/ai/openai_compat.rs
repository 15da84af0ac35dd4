use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::provider::{check_status, http_client, parse_error, request_error, ChatModel, TextStream};
use super::search::{answer_tool_call, query_parameters, SearchTool};
use super::settings::{AiProviderType, AiSettings};
use super::stream::{line_stream, sse_data, text_stream};
use crate::models::error::{AgentError, Result};
use crate::models::Message;

/// Tool-call rounds per turn before the model must answer in text
const MAX_TOOL_ROUNDS: usize = 3;

/// Parallel tool calls accepted in one round
const MAX_TOOL_CALLS: usize = 8;

/// Generic OpenAI-compatible API provider.
/// Used for OpenAI, DeepSeek, OpenRouter and any other provider that implements
/// the OpenAI `/v1/chat/completions` API format.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint_url: String,
    provider_type: AiProviderType,
    temperature: f32,
    max_tokens: i32,
    search: Option<Arc<dyn SearchTool>>,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &AiSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(settings)?,
            api_key: settings.api_key().to_string(),
            model: settings.model_name.clone(),
            endpoint_url: settings.base_url().to_string(),
            provider_type: settings.provider,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            search: None,
        })
    }

    /// Offer the model a web search tool it may call before answering
    pub fn with_search_tool(mut self, search: Arc<dyn SearchTool>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn has_search_tool(&self) -> bool {
        self.search.is_some()
    }

    fn chat_request(&self, messages: Vec<ChatMessage>, stream: bool, with_tools: bool) -> ChatRequest {
        let tools = match &self.search {
            Some(search) if with_tools => vec![ToolSpec::for_search(search.as_ref())],
            _ => Vec::new(),
        };

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stream,
            tools,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.endpoint_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(self.provider_type, e))?;

        check_status(self.provider_type, response).await
    }

    /// Open one streamed request and frame its body into lines
    async fn open_stream(&self, messages: Vec<ChatMessage>, with_tools: bool) -> Result<LineStream> {
        let response = self.send(&self.chat_request(messages, true, with_tools)).await?;
        Ok(line_stream(response.bytes_stream()))
    }
}

// --- OpenAI-compatible API types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn from_messages(messages: &[Message]) -> Vec<Self> {
        messages
            .iter()
            .map(|m| Self {
                role: m.role.to_string(),
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            })
            .collect()
    }

    fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }

    fn requested_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

impl ToolSpec {
    fn for_search(search: &dyn SearchTool) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: search.name().to_string(),
                description: search.description().to_string(),
                parameters: query_parameters(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

impl ToolCall {
    fn pending() -> Self {
        Self {
            id: String::new(),
            kind: function_kind(),
            function: FunctionCall::default(),
        }
    }
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Piece of a tool call; arguments arrive split across events
#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Delta carried by one SSE line of a streamed completion
fn parse_stream_delta(provider: AiProviderType, line: &str) -> Option<Result<StreamDelta>> {
    let data = sse_data(line)?;
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .map(|choice| Ok(choice.delta)),
        Err(e) => Some(Err(parse_error(provider, e))),
    }
}

/// Text carried by one SSE line of a streamed completion
fn parse_stream_line(provider: AiProviderType, line: &str) -> Option<Result<String>> {
    match parse_stream_delta(provider, line)? {
        Ok(delta) => delta.content.map(Ok),
        Err(e) => Some(Err(e)),
    }
}

/// Fold streamed tool-call pieces into whole calls, keyed by index
fn merge_tool_deltas(calls: &mut Vec<ToolCall>, deltas: Vec<ToolCallDelta>) {
    for delta in deltas {
        if delta.index >= MAX_TOOL_CALLS {
            tracing::warn!("Ignoring tool call at index {}", delta.index);
            continue;
        }
        if calls.len() <= delta.index {
            calls.resize_with(delta.index + 1, ToolCall::pending);
        }

        let call = &mut calls[delta.index];
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.function.name = name;
            }
            if let Some(arguments) = function.arguments {
                call.function.arguments.push_str(&arguments);
            }
        }
    }
}

/// Run each call and build the `tool` messages answering them
async fn answer_tool_calls(search: &dyn SearchTool, calls: &mut [ToolCall]) -> Vec<ChatMessage> {
    let mut answers = Vec::with_capacity(calls.len());

    for (i, call) in calls.iter_mut().enumerate() {
        if call.id.is_empty() {
            call.id = format!("call_{}", i);
        }
        let output = answer_tool_call(search, &call.function.name, &call.function.arguments).await;
        answers.push(ChatMessage::tool_result(&call.id, output));
    }

    answers
}

type LineStream = BoxStream<'static, Result<String>>;

/// Opens a streamed request for the given messages, with or without tools
type OpenStream =
    Box<dyn Fn(Vec<ChatMessage>, bool) -> BoxFuture<'static, Result<LineStream>> + Send + Sync>;

struct ToolTurn {
    open: OpenStream,
    search: Arc<dyn SearchTool>,
    provider: AiProviderType,
    messages: Vec<ChatMessage>,
    lines: Option<LineStream>,
    calls: Vec<ToolCall>,
    rounds: usize,
    done: bool,
}

/// Stream a turn in which the model may call the search tool.
///
/// Text is forwarded as it arrives. When a response ends with tool calls, the
/// calls are answered and a follow-up request continues the same stream. After
/// `MAX_TOOL_ROUNDS` the tools are withheld so the model has to answer.
fn tool_stream(
    open: OpenStream,
    search: Arc<dyn SearchTool>,
    provider: AiProviderType,
    messages: Vec<ChatMessage>,
) -> TextStream {
    let turn = ToolTurn {
        open,
        search,
        provider,
        messages,
        lines: None,
        calls: Vec::new(),
        rounds: 0,
        done: false,
    };

    stream::unfold(turn, |mut turn| async move {
        loop {
            if turn.done {
                return None;
            }

            let next = match turn.lines.as_mut() {
                Some(lines) => lines.next().await,
                None => {
                    let with_tools = turn.rounds < MAX_TOOL_ROUNDS;
                    let opening = (turn.open)(turn.messages.clone(), with_tools);
                    match opening.await {
                        Ok(lines) => turn.lines = Some(lines),
                        Err(e) => {
                            turn.done = true;
                            return Some((Err(e), turn));
                        }
                    }
                    continue;
                }
            };

            match next {
                Some(Ok(line)) => match parse_stream_delta(turn.provider, &line) {
                    Some(Ok(delta)) => {
                        if let Some(deltas) = delta.tool_calls {
                            merge_tool_deltas(&mut turn.calls, deltas);
                        }
                        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                            return Some((Ok(text), turn));
                        }
                    }
                    Some(Err(e)) => {
                        turn.done = true;
                        return Some((Err(e), turn));
                    }
                    None => {}
                },
                Some(Err(e)) => {
                    turn.done = true;
                    return Some((Err(e), turn));
                }
                None => {
                    turn.lines = None;
                    if turn.calls.is_empty() {
                        return None;
                    }

                    let mut calls = std::mem::take(&mut turn.calls);
                    turn.rounds += 1;
                    info!("{} requested {} tool call(s)", turn.provider, calls.len());

                    let answers = answer_tool_calls(turn.search.as_ref(), &mut calls).await;
                    turn.messages.push(ChatMessage::tool_calls(calls));
                    turn.messages.extend(answers);
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatModel for OpenAiCompatProvider {
    fn provider_type(&self) -> AiProviderType {
        self.provider_type
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        info!("Sending completion request to {}", self.provider_type);

        let mut request_messages = ChatMessage::from_messages(messages);
        let mut rounds = 0;

        loop {
            let search = self.search.as_ref().filter(|_| rounds < MAX_TOOL_ROUNDS);
            let request = self.chat_request(request_messages.clone(), false, search.is_some());

            let response = self.send(&request).await?;
            let chat_response: ChatResponse = response
                .json()
                .await
                .map_err(|e| parse_error(self.provider_type, e))?;

            let message = chat_response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message)
                .ok_or_else(|| AgentError::Provider(format!("{} returned no choices", self.provider_type)))?;

            match search {
                Some(search) if !message.requested_calls().is_empty() => {
                    rounds += 1;
                    let mut calls = message.requested_calls().to_vec();
                    info!("{} requested {} tool call(s)", self.provider_type, calls.len());

                    let answers = answer_tool_calls(search.as_ref(), &mut calls).await;
                    request_messages.push(ChatMessage::tool_calls(calls));
                    request_messages.extend(answers);
                }
                _ => return Ok(message.content.unwrap_or_default()),
            }
        }
    }

    async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream> {
        info!("Streaming completion from {} ({})", self.provider_type, self.model);

        let request_messages = ChatMessage::from_messages(messages);
        let provider = self.provider_type;

        let Some(search) = self.search.clone() else {
            let lines = self.open_stream(request_messages, false).await?;
            return Ok(text_stream(lines, move |line| parse_stream_line(provider, line)));
        };

        let client = self.clone();
        let open: OpenStream = Box::new(move |messages: Vec<ChatMessage>, with_tools: bool| {
            let client = client.clone();
            async move { client.open_stream(messages, with_tools).await }.boxed()
        });

        Ok(tool_stream(open, search, provider, request_messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::search::{SearchResult, SEARCH_TOOL_NAME};
    use std::sync::Mutex;

    struct FakeSearch {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchTool for FakeSearch {
        async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![SearchResult {
                title: "Release notes".to_string(),
                url: "https://example.com/notes".to_string(),
                snippet: "Version 2 ships today".to_string(),
            }])
        }
    }

    fn fake_search() -> Arc<FakeSearch> {
        Arc::new(FakeSearch {
            queries: Mutex::new(Vec::new()),
        })
    }

    fn provider() -> OpenAiCompatProvider {
        let settings = AiSettings {
            api_key: Some("sk-test".to_string()),
            ..AiSettings::for_provider(AiProviderType::OpenAi)
        };
        OpenAiCompatProvider::new(&settings).unwrap()
    }

    /// Opens canned SSE bodies, one per request, and records each request
    fn scripted_open(
        bodies: Vec<Vec<&'static str>>,
        requests: Arc<Mutex<Vec<(Vec<ChatMessage>, bool)>>>,
    ) -> OpenStream {
        let bodies = Mutex::new(bodies.into_iter());
        Box::new(move |messages: Vec<ChatMessage>, with_tools: bool| {
            requests.lock().unwrap().push((messages, with_tools));
            let body = bodies.lock().unwrap().next().unwrap_or_default();
            let lines: Vec<Result<String>> = body.into_iter().map(|l| Ok(l.to_string())).collect();
            futures_util::future::ready(Ok(stream::iter(lines).boxed())).boxed()
        })
    }

    #[test]
    fn test_chat_request_serialization() {
        let provider = provider();
        let request = provider.chat_request(
            ChatMessage::from_messages(&[Message::system("be brief"), Message::user("list files")]),
            true,
            true,
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "list files");
        assert!(json["messages"][1].get("tool_calls").is_none());
        // No search tool configured
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_chat_request_offers_search_tool() {
        let provider = provider().with_search_tool(fake_search());
        assert!(provider.has_search_tool());

        let json = serde_json::to_value(provider.chat_request(Vec::new(), true, true)).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], SEARCH_TOOL_NAME);
        assert_eq!(json["tools"][0]["function"]["parameters"]["required"][0], "query");

        let json = serde_json::to_value(provider.chat_request(Vec::new(), true, false)).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_tool_messages_serialization() {
        let call = ToolCall {
            id: "call_1".to_string(),
            kind: function_kind(),
            function: FunctionCall {
                name: SEARCH_TOOL_NAME.to_string(),
                arguments: r#"{"query":"rust"}"#.to_string(),
            },
        };

        let json = serde_json::to_value(ChatMessage::tool_calls(vec![call])).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], r#"{"query":"rust"}"#);

        let json = serde_json::to_value(ChatMessage::tool_result("call_1", "found".to_string())).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "found");
    }

    #[test]
    fn test_response_with_tool_calls() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_9","type":"function",
            "function":{"name":"search_on_web","arguments":"{\"query\":\"tokio\"}"}}]}}]}"#;

        let response: ChatResponse = serde_json::from_str(body).unwrap();
        let message = &response.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.requested_calls()[0].id, "call_9");
        assert_eq!(message.requested_calls()[0].function.name, SEARCH_TOOL_NAME);
    }

    #[test]
    fn test_parse_stream_line_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"index":0}]}"#;
        let text = parse_stream_line(AiProviderType::OpenAi, line).unwrap().unwrap();
        assert_eq!(text, "Hel");
    }

    #[test]
    fn test_parse_stream_line_without_text() {
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_stream_line(AiProviderType::DeepSeek, role_only).is_none());
        assert!(parse_stream_line(AiProviderType::DeepSeek, "data: [DONE]").is_none());
        assert!(parse_stream_line(AiProviderType::DeepSeek, "").is_none());
        assert!(parse_stream_line(AiProviderType::OpenRouter, ": OPENROUTER PROCESSING").is_none());
    }

    #[test]
    fn test_parse_stream_line_malformed() {
        let result = parse_stream_line(AiProviderType::OpenAi, "data: {not json").unwrap();
        assert!(matches!(result, Err(AgentError::ParseError(_))));
    }

    #[test]
    fn test_merge_tool_deltas() {
        let lines = [
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"search_on_web","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust 2024\"}"}}]}}]}"#,
        ];

        let mut calls = Vec::new();
        for line in lines {
            let delta = parse_stream_delta(AiProviderType::OpenAi, line).unwrap().unwrap();
            merge_tool_deltas(&mut calls, delta.tool_calls.unwrap());
        }

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, SEARCH_TOOL_NAME);
        assert_eq!(calls[0].function.arguments, r#"{"query":"rust 2024"}"#);
    }

    #[tokio::test]
    async fn test_tool_stream_answers_search_then_streams_reply() {
        let search = fake_search();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let open = scripted_open(
            vec![
                vec![
                    r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search_on_web","arguments":"{\"query\":"}}]}}]}"#,
                    r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"v2 release\"}"}}]}}]}"#,
                    "data: [DONE]",
                ],
                vec![
                    r#"data: {"choices":[{"delta":{"content":"Version 2 "}}]}"#,
                    r#"data: {"choices":[{"delta":{"content":"ships today."}}]}"#,
                    "data: [DONE]",
                ],
            ],
            requests.clone(),
        );

        let text: Vec<String> = tool_stream(
            open,
            search.clone(),
            AiProviderType::OpenAi,
            ChatMessage::from_messages(&[Message::user("when is v2 out?")]),
        )
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;

        assert_eq!(text.concat(), "Version 2 ships today.");
        assert_eq!(*search.queries.lock().unwrap(), vec!["v2 release".to_string()]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].1);

        let follow_up = &requests[1].0;
        assert_eq!(follow_up.len(), 3);
        assert_eq!(follow_up[1].requested_calls()[0].id, "call_1");
        assert_eq!(follow_up[2].role, "tool");
        assert_eq!(follow_up[2].tool_call_id.as_deref(), Some("call_1"));
        assert!(follow_up[2].content.as_deref().unwrap().contains("https://example.com/notes"));
    }

    #[tokio::test]
    async fn test_tool_stream_without_calls_is_one_request() {
        let search = fake_search();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let open = scripted_open(
            vec![vec![r#"data: {"choices":[{"delta":{"content":"ls -la"}}]}"#, "data: [DONE]"]],
            requests.clone(),
        );

        let text: Vec<String> = tool_stream(open, search.clone(), AiProviderType::DeepSeek, Vec::new())
            .map(|fragment| fragment.unwrap())
            .collect()
            .await;

        assert_eq!(text, vec!["ls -la".to_string()]);
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_stream_withholds_tools_after_max_rounds() {
        let call = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"search_on_web","arguments":"{\"query\":\"again\"}"}}]}}]}"#;
        let mut bodies = vec![vec![call]; MAX_TOOL_ROUNDS];
        bodies.push(vec![r#"data: {"choices":[{"delta":{"content":"done"}}]}"#]);

        let requests = Arc::new(Mutex::new(Vec::new()));
        let text: Vec<String> = tool_stream(
            scripted_open(bodies, requests.clone()),
            fake_search(),
            AiProviderType::OpenAi,
            Vec::new(),
        )
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;

        assert_eq!(text, vec!["done".to_string()]);
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), MAX_TOOL_ROUNDS + 1);
        assert!(requests[..MAX_TOOL_ROUNDS].iter().all(|(_, with_tools)| *with_tools));
        assert!(!requests[MAX_TOOL_ROUNDS].1);
    }

    #[tokio::test]
    async fn test_tool_stream_open_error_ends_stream() {
        let open: OpenStream = Box::new(|_: Vec<ChatMessage>, _: bool| {
            futures_util::future::ready(Err(AgentError::RateLimited("slow down".to_string()))).boxed()
        });

        let items: Vec<Result<String>> =
            tool_stream(open, fake_search(), AiProviderType::OpenAi, Vec::new())
                .collect()
                .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AgentError::RateLimited(_))));
    }
}
