//! External tools used by the tool-use agent.
//!
//! # Available Tools
//!
//! - [`search`](crate::tools::search) - `web_search` over DuckDuckGo via daedra
//! - [`wikipedia`](crate::tools::wikipedia) - `wikipedia_search`, MediaWiki search plus page summary
//! - [`arxiv`](crate::tools::arxiv) - `arxiv_search` over the arXiv Atom API
//! - [`fetch`](crate::tools::fetch) - `fetch_page`, readable text of a web page (URL ingestion)
//!
//! Every tool takes JSON arguments and returns a JSON object with a
//! `results` array of `{title, url, snippet}` entries, so the tool-use agent
//! can turn any of them into a `ToolOutput` the same way.

/// arXiv paper search.
pub mod arxiv;
/// Web page fetching and text extraction.
pub mod fetch;
/// Tool trait and registry.
pub mod registry;
/// Web search tool using DuckDuckGo.
pub mod search;
/// Wikipedia search and summaries.
pub mod wikipedia;

pub use registry::{Tool, ToolDefinition, ToolRegistry};

use crate::types::{AppError, Result};
use crate::utils::toml_config::ToolsConfig;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// HTTP client shared by the HTTP-backed tools.
pub fn http_client(config: &ToolsConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request and turn non-success statuses into upstream errors.
/// 5xx and 429 are transient, other statuses are not.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    service: &str,
) -> Result<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(AppError::Upstream {
        message: format!("{} returned HTTP {}", service, status),
        transient: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
    })
}

/// Registry with every built-in tool wired to `config`.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let client = http_client(config)?;
    let mut registry = ToolRegistry::new();

    if config.web_search {
        registry.register(Arc::new(search::SearchTool::new()));
    }
    registry.register(Arc::new(wikipedia::WikipediaTool::new(
        client.clone(),
        config.wikipedia_base_url.clone(),
        config.max_results,
    )));
    registry.register(Arc::new(arxiv::ArxivTool::new(
        client.clone(),
        config.arxiv_base_url.clone(),
        config.max_results,
    )));
    registry.register(Arc::new(fetch::FetchPageTool::new(client)));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_tools() {
        let registry = default_registry(&ToolsConfig::default()).unwrap();
        assert!(registry.has_tool("web_search"));
        assert!(registry.has_tool("wikipedia_search"));
        assert!(registry.has_tool("arxiv_search"));
        assert!(registry.has_tool("fetch_page"));
    }

    #[test]
    fn test_web_search_can_be_disabled() {
        let config = ToolsConfig {
            web_search: false,
            ..Default::default()
        };
        let registry = default_registry(&config).unwrap();
        assert!(!registry.has_tool("web_search"));
        assert_eq!(registry.tool_names().len(), 3);
    }
}
