//! Web search through daedra (DuckDuckGo backend).
//!
//! `search_type = "news"` narrows a search to the past week and biases the
//! query toward news coverage.

use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Kind of web search to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Search,
    News,
}

impl SearchType {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "search" => Ok(Self::Search),
            "news" => Ok(Self::News),
            other => Err(AppError::InvalidInput(format!(
                "Unsupported search_type '{}' (expected 'search' or 'news')",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::News => "news",
        }
    }
}

/// Web search tool powered by daedra
#[derive(Debug, Default)]
pub struct SearchTool;

impl SearchTool {
    pub fn new() -> Self {
        Self
    }

    /// Build the daedra request for `query`.
    pub fn search_args(
        query: &str,
        num_results: usize,
        search_type: SearchType,
    ) -> daedra::SearchArgs {
        let (query, time_range) = match search_type {
            SearchType::Search => (query.to_string(), None),
            SearchType::News => {
                let query = if query.to_lowercase().split_whitespace().any(|w| w == "news") {
                    query.to_string()
                } else {
                    format!("{} news", query)
                };
                (query, Some("w".to_string()))
            }
        };
        daedra::SearchArgs {
            query,
            options: Some(daedra::SearchOptions {
                num_results,
                time_range,
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for recent news and general information using DuckDuckGo"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": 5
                },
                "search_type": {
                    "type": "string",
                    "enum": ["search", "news"],
                    "description": "Use 'news' for recent news coverage",
                    "default": "search"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'query' parameter".to_string()))?;

        let num_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(5);

        let search_type = match args.get("search_type").and_then(|v| v.as_str()) {
            Some(value) => SearchType::parse(value)?,
            None => SearchType::Search,
        };

        let search_args = Self::search_args(query, num_results, search_type);
        tracing::debug!(
            query = %search_args.query,
            search_type = search_type.as_str(),
            "Web search"
        );

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| AppError::Upstream {
                message: format!("Web search failed: {}", e),
                transient: true,
            })?;

        let results: Vec<Value> = response
            .data
            .iter()
            .map(|r| {
                json!({
                    "title": r.title,
                    "url": r.url,
                    "snippet": r.description
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "search_type": search_type.as_str(),
            "count": results.len(),
            "results": results
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tool_definition() {
        let tool = SearchTool::new();
        assert_eq!(tool.name(), "web_search");
        assert!(tool.parameters_schema().get("properties").is_some());
    }

    #[test]
    fn test_news_search_is_recent_and_news_biased() {
        let args = SearchTool::search_args("GPU prices", 3, SearchType::News);
        assert_eq!(args.query, "GPU prices news");
        let options = args.options.unwrap();
        assert_eq!(options.time_range.as_deref(), Some("w"));
        assert_eq!(options.num_results, 3);

        let args = SearchTool::search_args("chip news", 3, SearchType::News);
        assert_eq!(args.query, "chip news");

        let args = SearchTool::search_args("GPU prices", 3, SearchType::Search);
        assert_eq!(args.query, "GPU prices");
        assert!(args.options.unwrap().time_range.is_none());
    }

    #[tokio::test]
    async fn test_unknown_search_type_rejected() {
        let tool = SearchTool::new();
        let result = tool
            .execute(json!({"query": "gpus", "search_type": "images"}))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert_eq!(SearchType::parse("News").unwrap(), SearchType::News);
    }

    #[tokio::test]
    async fn test_search_missing_query() {
        let tool = SearchTool::new();
        let result = tool.execute(json!({})).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
