//! Summarization Agent
//!
//! Turns collected evidence and tool outputs into a cited report. Sources
//! are numbered `[n]` in the order they are first seen, and every claim in
//! the report carries at least one marker that resolves to a listed source.
//!
//! The default synthesis is extractive and deterministic. With an LLM
//! configured the model writes the prose, but its answer is only used when
//! every paragraph cites a valid source.

use crate::llm::LLMClient;
use crate::types::{
    Backend, Citation, CitationKind, Claim, EvidenceContent, EvidenceItem, FusedEvidenceSet,
    Report, Result, ToolOutput,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Longest claim taken from a single source.
const MAX_CLAIM_CHARS: usize = 320;

/// Sentences kept when summarizing user-provided text.
const MAX_SUMMARY_SENTENCES: usize = 3;

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are a research assistant writing a short report.

Use ONLY the numbered sources you are given. Every paragraph must cite at least one source with its marker, e.g. [1] or [2][3]. Do not invent sources or markers. Do not add a source list; it is appended for you."#;

/// Numbered sources, deduplicated by provenance key.
#[derive(Debug, Default)]
struct CitationBook {
    citations: Vec<Citation>,
    by_key: HashMap<String, usize>,
}

impl CitationBook {
    fn cite(&mut self, key: String, label: String, kind: CitationKind) -> usize {
        if let Some(&marker) = self.by_key.get(&key) {
            return marker;
        }
        let marker = self.citations.len() + 1;
        self.by_key.insert(key.clone(), marker);
        self.citations.push(Citation {
            marker,
            key,
            label,
            kind,
        });
        marker
    }

    fn is_valid(&self, marker: usize) -> bool {
        marker >= 1 && marker <= self.citations.len()
    }
}

#[derive(Debug, Default)]
struct Draft {
    book: CitationBook,
    claims: Vec<Claim>,
}

impl Draft {
    /// Add a claim, merging citations into an identical earlier claim.
    fn claim(&mut self, text: String, marker: usize) {
        if text.is_empty() {
            return;
        }
        if let Some(existing) = self.claims.iter_mut().find(|c| c.text == text) {
            if !existing.citations.contains(&marker) {
                existing.citations.push(marker);
            }
            return;
        }
        self.claims.push(Claim {
            text,
            citations: vec![marker],
        });
    }
}

/// Split text into sentences, keeping terminal punctuation.
fn sentences(text: &str) -> Vec<String> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| *n == ' ') {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(at) => format!("{}...", cut[..at].trim_end()),
        None => format!("{}...", cut),
    }
}

/// Lead sentence of `text`, bounded in length.
fn lead_sentence(text: &str) -> String {
    sentences(text)
        .into_iter()
        .next()
        .map(|s| truncate_chars(&s, MAX_CLAIM_CHARS))
        .unwrap_or_default()
}

fn evidence_claim(item: &EvidenceItem) -> String {
    match &item.content {
        EvidenceContent::Span { text } => lead_sentence(text),
        EvidenceContent::Relation(triple) => {
            let predicate = triple.predicate.to_lowercase().replace('_', " ");
            format!("{} {} {}.", triple.subject, predicate, triple.object)
        }
    }
}

/// `[n]` markers found in `text`.
fn markers_in(text: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else {
            break;
        };
        if let Ok(n) = rest[..close].trim().parse::<usize>() {
            if !found.contains(&n) {
                found.push(n);
            }
        }
        rest = &rest[close + 1..];
    }
    found
}

pub struct SummarizationAgent {
    llm: Option<Arc<dyn LLMClient>>,
}

impl Default for SummarizationAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl SummarizationAgent {
    pub fn new() -> Self {
        Self { llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Build the report for a research run.
    ///
    /// `failed_tasks` counts tasks that failed or were skipped; any such task
    /// or any partial evidence set marks the report partial.
    #[tracing::instrument(skip_all, fields(sets = evidence.len(), tools = tools.len()))]
    pub async fn summarize(
        &self,
        query: &str,
        evidence: &[FusedEvidenceSet],
        tools: &[ToolOutput],
        failed_tasks: usize,
    ) -> Result<Report> {
        let mut draft = Draft::default();

        for set in evidence {
            for item in &set.items {
                let marker = draft.book.cite(
                    item.key(),
                    item.provenance.label(),
                    CitationKind::Evidence,
                );
                draft.claim(evidence_claim(item), marker);
            }
        }

        for output in tools {
            if output.sources.is_empty() {
                if output.text.trim().is_empty() {
                    continue;
                }
                let marker = draft.book.cite(
                    format!("tool:{}", output.tool),
                    output.tool.clone(),
                    CitationKind::Tool,
                );
                draft.claim(lead_sentence(&output.text), marker);
                continue;
            }
            for (line, source) in output.text.lines().zip(&output.sources) {
                let key = source
                    .url
                    .clone()
                    .unwrap_or_else(|| format!("tool:{}:{}", output.tool, source.title));
                let label = match &source.url {
                    Some(url) => format!("{} ({})", source.title, url),
                    None => source.title.clone(),
                };
                let marker = draft.book.cite(key, label, CitationKind::Tool);
                draft.claim(lead_sentence(line), marker);
            }
        }

        let mut notes = Vec::new();
        for set in evidence {
            if let Some(partial) = &set.partial {
                let note = format!(
                    "Results are partial: the {} index was unavailable ({}).",
                    match partial.failed_backend {
                        Backend::Vector => "vector",
                        Backend::Graph => "graph",
                    },
                    partial.reason
                );
                if !notes.contains(&note) {
                    notes.push(note);
                }
            }
        }
        if failed_tasks > 0 {
            notes.push(format!(
                "{} research task{} could not be completed.",
                failed_tasks,
                if failed_tasks == 1 { "" } else { "s" }
            ));
        }

        let context = draft
            .claims
            .iter()
            .map(|c| {
                let refs: String = c.citations.iter().map(|m| format!("[{}]", m)).collect();
                format!("{} {}", refs, c.text)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(self.finish(query, draft, &context, notes).await)
    }

    /// Summarize text the user supplied in the query itself, e.g.
    /// "Summarize: <text>". The user's text is the only source.
    pub async fn summarize_text(&self, query: &str) -> Result<Report> {
        let body = match query.split_once(':') {
            Some((_, rest)) if !rest.trim().is_empty() => rest.trim(),
            _ => {
                let trimmed = query.trim();
                match trimmed.split_once(char::is_whitespace) {
                    Some((_, rest)) if !rest.trim().is_empty() => rest.trim(),
                    _ => trimmed,
                }
            }
        };

        let mut draft = Draft::default();
        let marker = draft.book.cite(
            "user:query".to_string(),
            "Text provided in the request".to_string(),
            CitationKind::User,
        );
        for sentence in sentences(body).into_iter().take(MAX_SUMMARY_SENTENCES) {
            draft.claim(truncate_chars(&sentence, MAX_CLAIM_CHARS), marker);
        }
        let context = format!("[{}] {}", marker, body);
        Ok(self.finish(query, draft, &context, Vec::new()).await)
    }

    async fn finish(&self, query: &str, draft: Draft, context: &str, notes: Vec<String>) -> Report {
        let partial = !notes.is_empty();
        if draft.claims.is_empty() {
            let mut text = format!("I could not find any evidence for \"{}\".", query.trim());
            for note in &notes {
                text.push_str("\n\n");
                text.push_str(note);
            }
            return Report {
                text,
                citations: Vec::new(),
                claims: Vec::new(),
                partial,
            };
        }

        let Draft { book, claims } = draft;
        if let Some(llm) = &self.llm {
            if let Some(claims) = Self::synthesize_with_llm(llm.as_ref(), query, &book, context).await
            {
                let body = claims
                    .iter()
                    .map(|c| c.text.clone())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                return Self::assemble(body, book, claims, &notes, partial);
            }
        }

        let mut body = format!("Findings for \"{}\":\n", query.trim());
        for claim in &claims {
            let refs: String = claim.citations.iter().map(|m| format!("[{}]", m)).collect();
            body.push_str(&format!("\n- {} {}", claim.text, refs));
        }
        Self::assemble(body, book, claims, &notes, partial)
    }

    fn assemble(
        body: String,
        book: CitationBook,
        claims: Vec<Claim>,
        notes: &[String],
        partial: bool,
    ) -> Report {
        let mut text = body;
        text.push_str("\n\nSources:");
        for citation in &book.citations {
            text.push_str(&format!("\n[{}] {}", citation.marker, citation.label));
        }
        for note in notes {
            text.push_str("\n\nNote: ");
            text.push_str(note);
        }
        Report {
            text,
            citations: book.citations,
            claims,
            partial,
        }
    }

    /// Ask the model for prose. Each paragraph becomes a claim; `None` if any
    /// paragraph lacks a valid marker or the call fails.
    async fn synthesize_with_llm(
        llm: &dyn LLMClient,
        query: &str,
        book: &CitationBook,
        context: &str,
    ) -> Option<Vec<Claim>> {
        let sources = book
            .citations
            .iter()
            .map(|c| format!("[{}] {}", c.marker, c.label))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Question: {}\n\nSources:\n{}\n\nEvidence:\n{}",
            query.trim(),
            sources,
            context
        );

        let reply = match llm.generate_with_system(SYNTHESIS_SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis LLM call failed, using extractive report");
                return None;
            }
        };

        let mut claims = Vec::new();
        for paragraph in reply.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let markers = markers_in(paragraph);
            if markers.is_empty() || !markers.iter().all(|m| book.is_valid(*m)) {
                tracing::debug!("LLM report has an uncited paragraph, using extractive report");
                return None;
            }
            claims.push(Claim {
                text: paragraph.to_string(),
                citations: markers,
            });
        }
        (!claims.is_empty()).then_some(claims)
    }
}
