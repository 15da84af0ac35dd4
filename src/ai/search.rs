//! Web Search Tool
//!
//! The one tool a model may call mid-turn. Results go back to the model as
//! plain text; they never reach the conversation history.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::error::{AgentError, Result};

/// Name the model uses to call the search tool
pub const SEARCH_TOOL_NAME: &str = "search_on_web";

/// Results handed back to the model per search
pub const DEFAULT_MAX_RESULTS: usize = 3;

const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]+class="result__a"[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("Invalid result link regex")
});

static RESULT_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]+class="result__snippet"[^>]*>(.*?)</a>"#)
        .expect("Invalid result snippet regex")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

/// One hit from a web search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Capability behind the `search_on_web` tool
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information, documentation or error messages. Returns titles, URLs and snippets."
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// JSON schema of the tool's arguments
pub fn query_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Run one tool call and describe the outcome for the model.
///
/// Failures are reported as text so the model can carry on without them.
pub async fn answer_tool_call(tool: &dyn SearchTool, name: &str, arguments: &str) -> String {
    if name != tool.name() {
        tracing::warn!("Model called unknown tool {}", name);
        return format!("Unknown tool: {}", name);
    }

    let args: SearchArgs = match serde_json::from_str(arguments) {
        Ok(args) => args,
        Err(e) => return format!("Invalid arguments for {}: {}", name, e),
    };

    if args.query.trim().is_empty() {
        return "Query cannot be empty".to_string();
    }

    tracing::info!("Searching the web for {:?}", args.query);

    match tool.search(&args.query).await {
        Ok(results) => format_results(&results),
        Err(e) => {
            tracing::warn!("Web search failed: {}", e);
            format!("Search failed: {}", e)
        }
    }
}

/// Numbered listing of results
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found".to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n   URL: {}\n   {}", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// DuckDuckGo's HTML endpoint; needs no API key
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("howai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl SearchTool for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("Web search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Provider(format!(
                "Web search returned error {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to read search results: {}", e)))?;

        let results = parse_results(&html, self.max_results);
        tracing::debug!("Web search for {:?} found {} results", query, results.len());
        Ok(results)
    }
}

/// Pull result links and snippets out of a DuckDuckGo HTML page
fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let snippets: Vec<String> = RESULT_SNIPPET
        .captures_iter(html)
        .map(|cap| clean_text(&cap[1]))
        .collect();

    RESULT_LINK
        .captures_iter(html)
        .take(max_results)
        .enumerate()
        .map(|(i, cap)| SearchResult {
            title: clean_text(&cap[2]),
            url: resolve_link(&cap[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<target>`
fn resolve_link(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.clone()
    };

    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, target)| target.into_owned())
        })
        .unwrap_or(href)
}

fn clean_text(fragment: &str) -> String {
    let text = decode_entities(&TAG.replace_all(fragment, ""));
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
