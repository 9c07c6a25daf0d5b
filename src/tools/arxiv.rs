//! arXiv paper search over the Atom export API.

use crate::tools::registry::Tool;
use crate::tools::send_checked;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

/// The API accepts more, but long result lists only dilute the report.
const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArxivPaper {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed into papers, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivPaper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut current: Option<ArxivPaper> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| AppError::Upstream {
            message: format!(
                "Malformed arXiv feed at byte {}: {}",
                reader.buffer_position(),
                e
            ),
            transient: false,
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    current = Some(ArxivPaper::default());
                }
                path.push(name);
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(paper) = current.take() {
                        papers.push(paper);
                    }
                }
            }
            Event::Empty(e) => {
                let Some(paper) = current.as_mut() else {
                    continue;
                };
                if e.local_name().as_ref() != b"link" {
                    continue;
                }
                let mut href = None;
                let mut is_pdf = false;
                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_default();
                    match attr.key.local_name().as_ref() {
                        b"href" => href = Some(value),
                        b"title" if value == "pdf" => is_pdf = true,
                        _ => {}
                    }
                }
                if is_pdf {
                    paper.pdf_url = href;
                }
            }
            Event::Text(t) => {
                let Some(paper) = current.as_mut() else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                let depth = path.len();
                let parent = depth
                    .checked_sub(2)
                    .and_then(|i| path.get(i))
                    .map(String::as_str);
                match (parent, path.last().map(String::as_str)) {
                    (Some("entry"), Some("title")) => paper.title.push_str(&text),
                    (Some("entry"), Some("summary")) => paper.summary.push_str(&text),
                    (Some("entry"), Some("published")) => paper.published = text,
                    (Some("entry"), Some("id")) => {
                        paper.arxiv_id = text.rsplit("/abs/").next().unwrap_or(&text).to_string();
                        paper.url = text;
                    }
                    (Some("author"), Some("name")) => paper.authors.push(collapse(&text)),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    for paper in &mut papers {
        paper.title = collapse(&paper.title);
        paper.summary = collapse(&paper.summary);
        paper.published = paper.published.chars().take(10).collect();
    }
    Ok(papers)
}

pub struct ArxivTool {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl ArxivTool {
    pub fn new(client: Client, base_url: impl Into<String>, max_results: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_results: max_results.clamp(1, MAX_RESULTS),
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArxivPaper>> {
        let search_query = format!("all:{}", query);
        let limit = limit.clamp(1, MAX_RESULTS).to_string();
        let request = self
            .client
            .get(format!("{}/api/query", self.base_url))
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", limit.as_str()),
                ("sortBy", "relevance"),
            ]);
        let body = send_checked(request, "arXiv").await?.text().await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl Tool for ArxivTool {
    fn name(&self) -> &str {
        "arxiv_search"
    }

    fn description(&self) -> &str {
        "Search arXiv for academic papers and preprints"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search terms, e.g. \"transformer time series\""
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of papers (at most 10)",
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
            .map(|n| n as usize)
            .unwrap_or(self.max_results);

        let papers = self.search(query, limit).await?;
        let results: Vec<Value> = papers
            .iter()
            .map(|p| {
                json!({
                    "title": p.title,
                    "url": p.url,
                    "snippet": p.summary,
                    "authors": p.authors,
                    "published": p.published,
                    "arxiv_id": p.arxiv_id,
                    "pdf_url": p.pdf_url,
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results
        }))
    }
}
