//! Fetch a web page and reduce it to readable text.

use crate::tools::registry::Tool;
use crate::tools::send_checked;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::{json, Value};

const CONTENT_SELECTOR: &str = "h1, h2, h3, h4, p, li, pre, blockquote";

/// Readable content of a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageContent {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub word_count: usize,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Internal(format!("Bad selector '{}': {}", css, e)))
}

fn element_text<'a>(element: scraper::ElementRef<'a>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the title and block-level text of an HTML document.
///
/// Script, style and navigation chrome never match the content selector.
/// Pages without any block elements fall back to the body text.
pub fn extract_text(url: &str, html: &str) -> Result<PageContent> {
    let document = Html::parse_document(html);

    let title = document
        .select(&selector("title")?)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty());

    let mut blocks: Vec<String> = document
        .select(&selector(CONTENT_SELECTOR)?)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    blocks.dedup();

    if blocks.is_empty() {
        if let Some(body) = document.select(&selector("body")?).next() {
            let text = element_text(body);
            if !text.is_empty() {
                blocks.push(text);
            }
        }
    }

    let content = blocks.join("\n\n");
    let word_count = content.split_whitespace().count();
    Ok(PageContent {
        url: url.to_string(),
        title,
        content,
        word_count,
    })
}

pub struct FetchPageTool {
    client: Client,
}

impl FetchPageTool {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<PageContent> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        let html = send_checked(self.client.get(parsed), "Page fetch")
            .await?
            .text()
            .await?;
        extract_text(url, &html)
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the page to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'url' parameter".to_string()))?;

        let page = self.fetch(url).await?;
        let snippet: String = page.content.chars().take(500).collect();
        Ok(json!({
            "url": page.url,
            "title": page.title,
            "content": page.content,
            "word_count": page.word_count,
            "count": 1,
            "results": [{
                "title": page.title.clone().unwrap_or_else(|| page.url.clone()),
                "url": page.url,
                "snippet": snippet,
            }]
        }))
    }
}
