//! Web search backed by a Serper-compatible JSON API.

use crate::config::SearchSettings;
use crate::tools::{Tool, ToolError, required_str, schemas};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::time::Duration;

/// Single organic search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title.
    pub title: String,
    /// Short excerpt from the page.
    pub snippet: String,
    /// Page location.
    pub url: String,
}

/// Stateless search adapter.
pub struct WebSearchTool {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    result_limit: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl WebSearchTool {
    /// Build a search adapter from configuration.
    pub fn new(settings: &SearchSettings) -> Result<Self, ToolError> {
        let http = Client::builder()
            .user_agent("fin-analyzer/search")
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|error| {
                ToolError::ServiceUnavailable(format!("failed to construct HTTP client: {error}"))
            })?;
        if settings.api_key.is_none() {
            tracing::warn!("SEARCH_API_KEY not set; web searches will fail");
        }
        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            result_limit: settings.result_limit,
        })
    }

    /// Run a query and return at most `result_limit` hits in provider order.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ToolError::ServiceUnavailable("search provider is not configured".into())
        })?;

        let response = self
            .http
            .post(&self.api_url)
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query, "num": self.result_limit }))
            .send()
            .await
            .map_err(|error| {
                ToolError::ServiceUnavailable(format!("search provider unreachable: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "Search provider returned an error");
            return Err(ToolError::ServiceUnavailable(format!(
                "search provider returned {status}"
            )));
        }

        let payload: SerperResponse = response.json().await.map_err(|error| {
            ToolError::ServiceUnavailable(format!("malformed search response: {error}"))
        })?;
        let results: Vec<SearchResult> = payload
            .organic
            .into_iter()
            .take(self.result_limit)
            .map(|hit| SearchResult {
                title: hit.title,
                snippet: hit.snippet,
                url: hit.link,
            })
            .collect();
        tracing::debug!(query, results = results.len(), "Search completed");
        Ok(results)
    }
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No search results for \"{query}\".");
    }
    let mut out = format!("Search results for \"{query}\":\n");
    for (index, result) in results.iter().enumerate() {
        let _ = write!(
            out,
            "\n{}. {}\n   {}\n   {}\n",
            index + 1,
            result.title,
            result.url,
            result.snippet
        );
    }
    out
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current market conditions, news, and public information."
    }

    fn parameters_schema(&self) -> Value {
        schemas::object_schema(&[("query", schemas::string_schema("Search query text"))])
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str(&args, "query")?;
        let results = self.search(query).await?;
        Ok(format_results(query, &results))
    }
}
