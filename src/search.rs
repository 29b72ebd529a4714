use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::ProviderError;

/// Appended when a snippet is cut to the configured ceiling.
pub const SNIPPET_MARKER: &str = "...";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Raw web-search capability. Implementations may fail; the adapter below is
/// what agents consume and it never raises.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError>;
}

/// DuckDuckGo HTML search. No API key required; results are scraped from the
/// html.duckduckgo.com endpoint.
pub struct DuckDuckGoClient {
    client: reqwest::Client,
}

impl DuckDuckGoClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/120.0.0.0 Safari/537.36",
            )
            .build()
            .unwrap_or_default();
        DuckDuckGoClient { client }
    }

    fn parse_html(html: &str, max_results: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();
        let mut seen_urls = HashSet::new();

        // Result links carry the target URL percent-encoded in a `uddg`
        // redirect parameter; the snippet (when present) follows in a
        // result__snippet element.
        for segment in html.split("uddg=").skip(1) {
            if results.len() >= max_results {
                break;
            }

            let Some(end) = segment.find(|c| c == '&' || c == '"' || c == '\'') else {
                continue;
            };
            let Ok(url) = urlencoding::decode(&segment[..end]) else {
                continue;
            };
            let url = url.to_string();
            if !url.starts_with("http")
                || url.contains("duckduckgo.com")
                || seen_urls.contains(&url)
            {
                continue;
            }
            seen_urls.insert(url.clone());

            let title = extract_between(segment, ">", "</a>")
                .map(|t| strip_tags(t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| extract_domain(&url));
            let snippet = extract_between(segment, "result__snippet", "</a>")
                .and_then(|s| s.split_once('>').map(|(_, rest)| strip_tags(rest)))
                .unwrap_or_default();

            results.push(SearchResult {
                title,
                url,
                snippet,
            });
        }

        results
    }
}

impl Default for DuckDuckGoClient {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("Result")
        .to_string()
}

#[async_trait]
impl SearchProvider for DuckDuckGoClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );
        debug!(url = %url, "fetching search results");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimit(
                "rate limited by search provider".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "search request failed: HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(Self::parse_html(&body, max_results))
    }
}

/// What the research agent actually calls. Caps snippet length, formats
/// results as readable text, and converts both empty results and provider
/// errors into descriptive strings — this adapter never raises.
#[derive(Clone)]
pub struct SearchAdapter {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
    snippet_max_chars: usize,
}

impl SearchAdapter {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        SearchAdapter {
            provider,
            max_results: config.max_results,
            snippet_max_chars: config.snippet_max_chars,
        }
    }

    pub async fn search_formatted(&self, query: &str) -> String {
        let results = match self.provider.search(query, self.max_results).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query = %query, error = %e, "search failed");
                return format!("Search error: {e}");
            }
        };

        if results.is_empty() {
            return format!("No results found for query: {query}");
        }

        let mut text = format!("Search results for: {query}\n\n");
        for (i, result) in results.iter().enumerate() {
            let snippet = cap_snippet(&result.snippet, self.snippet_max_chars);
            text.push_str(&format!("[{}] {}\n", i + 1, result.title));
            text.push_str(&format!("   URL: {}\n", result.url));
            text.push_str(&format!("   Info: {snippet}\n\n"));
        }
        text
    }
}

fn cap_snippet(snippet: &str, max_chars: usize) -> String {
    if snippet.chars().count() <= max_chars {
        return snippet.to_string();
    }
    let prefix: String = snippet.chars().take(max_chars).collect();
    format!("{prefix}{SNIPPET_MARKER}")
}
