//! Tool-Use Agent
//!
//! Picks a registered tool for a task, calls it under a timeout with a
//! single retry on transient failures, and flattens the JSON result into a
//! [`ToolOutput`] whose text lines line up with its sources.

use crate::agents::router::{contains_any, tokenize};
use crate::tools::ToolRegistry;
use crate::types::{AppError, Result, TaskNode, ToolOutput, ToolSource};
use crate::utils::retry::retry_once_with_timeout;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const WEB_SEARCH: &str = "web_search";
pub const WIKIPEDIA_SEARCH: &str = "wikipedia_search";
pub const ARXIV_SEARCH: &str = "arxiv_search";
pub const FETCH_PAGE: &str = "fetch_page";

const ACADEMIC_MARKERS: &[&str] = &[
    "paper",
    "papers",
    "arxiv",
    "preprint",
    "preprints",
    "academic",
    "publication",
    "publications",
    "study",
    "studies",
    "literature",
];

const ENCYCLOPEDIA_MARKERS: &[&str] = &[
    "wikipedia",
    "what is",
    "what are",
    "who is",
    "who was",
    "define",
    "definition",
    "meaning of",
    "history of",
    "encyclopedia",
];

/// Web searches for these go to the news flavour of the search tool.
const NEWS_MARKERS: &[&str] = &[
    "news",
    "latest",
    "headline",
    "headlines",
    "today",
    "announced",
    "announcement",
    "breaking",
];

/// Words dropped when turning a task description into a search query.
const INSTRUCTION_WORDS: &[&str] = &[
    "find", "search", "look", "up", "for", "list", "get", "fetch", "show", "me", "please",
    "the", "latest", "recent", "on", "about", "some", "any", "news", "papers", "paper",
    "arxiv", "wikipedia", "web", "online", "what", "is", "are", "a", "an", "of", "tell",
    "explain", "define",
];

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct ToolUseAgent {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    backoff: Duration,
    max_results: usize,
}

impl ToolUseAgent {
    pub fn new(
        registry: Arc<ToolRegistry>,
        timeout: Duration,
        backoff: Duration,
        max_results: usize,
    ) -> Self {
        Self {
            registry,
            timeout,
            backoff,
            max_results: max_results.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Name of the tool that will serve `description`.
    pub fn select_tool(&self, description: &str) -> Result<String> {
        let words = tokenize(description);
        let preferred = if contains_any(&words, ACADEMIC_MARKERS) {
            ARXIV_SEARCH
        } else if contains_any(&words, ENCYCLOPEDIA_MARKERS) {
            WIKIPEDIA_SEARCH
        } else {
            WEB_SEARCH
        };

        let fallbacks = [preferred, WEB_SEARCH, WIKIPEDIA_SEARCH, ARXIV_SEARCH];
        if let Some(name) = fallbacks.iter().find(|name| self.registry.has_tool(name)) {
            return Ok(name.to_string());
        }

        self.registry
            .tool_names()
            .into_iter()
            .find(|name| name != FETCH_PAGE)
            .ok_or_else(|| AppError::ToolUnavailable {
                tool: preferred.to_string(),
                reason: "no search tool is registered".to_string(),
            })
    }

    /// Reduce an instruction such as "Find recent papers on Mamba" to the
    /// terms worth searching for.
    pub fn tool_query(description: &str) -> String {
        let kept: Vec<&str> = description
            .split_whitespace()
            .filter(|w| {
                let bare: String = w
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '-')
                    .collect::<String>()
                    .to_lowercase();
                !bare.is_empty() && !INSTRUCTION_WORDS.contains(&bare.as_str())
            })
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
            .collect();
        if kept.is_empty() {
            description.trim().to_string()
        } else {
            kept.join(" ")
        }
    }

    /// Arguments for calling `tool_name` on behalf of `description`.
    pub fn tool_args(&self, tool_name: &str, description: &str) -> Value {
        if tool_name == FETCH_PAGE {
            return json!({ "url": description.trim() });
        }
        let mut args = json!({
            "query": Self::tool_query(description),
            "max_results": self.max_results,
        });
        if tool_name == WEB_SEARCH && contains_any(&tokenize(description), NEWS_MARKERS) {
            args["search_type"] = json!("news");
        }
        args
    }

    #[tracing::instrument(skip(self, task), fields(task = %task.id))]
    pub async fn execute(&self, task: &TaskNode) -> Result<ToolOutput> {
        let tool_name = self.select_tool(&task.description)?;
        let tool = self
            .registry
            .get(&tool_name)
            .ok_or_else(|| AppError::ToolUnavailable {
                tool: tool_name.clone(),
                reason: "not registered".to_string(),
            })?;

        let args = self.tool_args(&tool_name, &task.description);
        tracing::debug!(tool = %tool_name, args = %args, "Calling tool");

        let value = retry_once_with_timeout(&tool_name, self.timeout, self.backoff, || {
            let tool = Arc::clone(&tool);
            let args = args.clone();
            async move { tool.execute(args).await }
        })
        .await
        .map_err(|e| AppError::ToolUnavailable {
            tool: tool_name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self::to_output(&tool_name, &value))
    }

    /// Flatten a tool's JSON reply. Every text line has exactly one source.
    pub fn to_output(tool: &str, value: &Value) -> ToolOutput {
        let mut lines = Vec::new();
        let mut sources = Vec::new();

        if let Some(summary) = value.get("summary").filter(|s| !s.is_null()) {
            let extract = summary.get("extract").and_then(Value::as_str).unwrap_or("");
            let title = summary.get("title").and_then(Value::as_str).unwrap_or("");
            if !extract.trim().is_empty() {
                lines.push(single_line(extract));
                sources.push(ToolSource {
                    title: title.to_string(),
                    url: summary
                        .get("url")
                        .and_then(Value::as_str)
                        .map(String::from),
                });
            }
        }

        let results = value
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for result in &results {
            let title = result
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim();
            let snippet = result
                .get("snippet")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim();
            if title.is_empty() && snippet.is_empty() {
                continue;
            }
            let url = result.get("url").and_then(Value::as_str).map(String::from);
            if sources
                .iter()
                .any(|s: &ToolSource| s.url.is_some() && s.url == url)
            {
                continue;
            }
            lines.push(match (title.is_empty(), snippet.is_empty()) {
                (false, false) => format!("{}: {}", single_line(title), single_line(snippet)),
                (false, true) => single_line(title),
                _ => single_line(snippet),
            });
            sources.push(ToolSource {
                title: if title.is_empty() {
                    tool.to_string()
                } else {
                    title.to_string()
                },
                url,
            });
        }

        ToolOutput {
            tool: tool.to_string(),
            text: lines.join("\n"),
            sources,
        }
    }
}
