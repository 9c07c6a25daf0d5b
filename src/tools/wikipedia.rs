//! Wikipedia search via the MediaWiki action API, plus the REST summary of
//! the best hit.

use crate::tools::registry::Tool;
use crate::tools::send_checked;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use scraper::Html;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    pageid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: String,
}

pub struct WikipediaTool {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl WikipediaTool {
    pub fn new(client: Client, base_url: impl Into<String>, max_results: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_results: max_results.clamp(1, MAX_RESULTS),
        }
    }

    fn page_url(&self, title: &str) -> String {
        format!("{}/wiki/{}", self.base_url, title.replace(' ', "_"))
    }

    /// Search snippets come back with `<span class="searchmatch">` markup.
    fn strip_markup(snippet: &str) -> String {
        let fragment = Html::parse_fragment(snippet);
        let text: String = fragment.root_element().text().collect();
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let limit = limit.to_string();
        let request = self
            .client
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
                ("utf8", "1"),
            ]);
        let response: SearchResponse = send_checked(request, "Wikipedia search")
            .await?
            .json()
            .await?;
        Ok(response.query.map(|q| q.search).unwrap_or_default())
    }

    /// `None` when the page has no summary (404).
    async fn summary(&self, title: &str) -> Result<Option<PageSummary>> {
        let mut url = Url::parse(&format!("{}/api/rest_v1/page/summary/", self.base_url))
            .map_err(|e| AppError::Configuration(format!("Invalid Wikipedia base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration("Wikipedia base URL cannot have a path".into()))?
            .pop_if_empty()
            .push(&title.replace(' ', "_"));

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                message: format!("Wikipedia summary returned HTTP {}", status),
                transient: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            });
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Search Wikipedia for encyclopedia articles and definitions"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search terms, e.g. \"recurrent neural network\""
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of articles (at most 10)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| AppError::InvalidInput("Missing 'query' parameter".to_string()))?;

        let limit = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| (n as usize).clamp(1, MAX_RESULTS))
            .unwrap_or(self.max_results);

        let hits = self.search(query, limit).await?;

        let summary = match hits.first() {
            Some(top) => self.summary(&top.title).await?,
            None => None,
        };

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "title": hit.title,
                    "url": self.page_url(&hit.title),
                    "snippet": Self::strip_markup(&hit.snippet),
                    "page_id": hit.pageid,
                })
            })
            .collect();

        let summary = summary.map(|s| {
            json!({
                "title": s.title,
                "description": s.description,
                "extract": s.extract,
                "url": self.page_url(&s.title),
            })
        });

        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results,
            "summary": summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let snippet = "A <span class=\"searchmatch\">recurrent</span> neural   network";
        assert_eq!(
            WikipediaTool::strip_markup(snippet),
            "A recurrent neural network"
        );
    }

    #[test]
    fn test_max_results_capped() {
        let tool = WikipediaTool::new(Client::new(), "https://en.wikipedia.org/", 50);
        assert_eq!(tool.max_results, MAX_RESULTS);
        assert_eq!(
            tool.page_url("Long short-term memory"),
            "https://en.wikipedia.org/wiki/Long_short-term_memory"
        );
    }

    #[tokio::test]
    async fn test_missing_query() {
        let tool = WikipediaTool::new(Client::new(), "http://localhost", 5);
        assert!(matches!(
            tool.execute(json!({"query": "  "})).await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
