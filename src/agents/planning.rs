//! Planning Agent
//!
//! Decomposes a multi-step research query into a [`TaskGraph`]. The default
//! decomposer is a deterministic heuristic; when an LLM is configured it is
//! asked for a JSON plan first and the heuristic is used whenever the reply
//! cannot be used.

use crate::agents::router::{contains_any, tokenize};
use crate::llm::{extract_json_block, LLMClient};
use crate::types::{Result, TaskAgent, TaskNode};
use crate::workflows::TaskGraph;
use serde::Deserialize;
use std::sync::Arc;

/// Phrases that mark a clause as needing an external tool rather than the
/// local knowledge base.
const TOOL_MARKERS: &[&str] = &[
    "news",
    "latest",
    "recent papers",
    "new papers",
    "arxiv",
    "paper",
    "papers",
    "preprint",
    "preprints",
    "wikipedia",
    "web",
    "online",
    "internet",
    "current",
    "today",
    "this week",
    "this year",
];

/// Openers that put the compared subjects right after the marker.
const COMPARISON_OPENERS: &[&str] = &[
    "compare ",
    "comparing ",
    "contrast ",
    "differences between ",
    "difference between ",
    "pros and cons of ",
    "trade-offs between ",
    "tradeoffs between ",
];

/// Infix markers where the whole query holds the subjects.
const COMPARISON_INFIXES: &[&str] = &[" vs. ", " vs ", " versus "];

/// Prepositions that introduce the shared context of a comparison.
const CONTEXT_MARKERS: &[&str] = &[
    " for ", " in ", " on ", " when ", " regarding ", " across ", " within ",
];

const SUBJECT_SEPARATORS: &[&str] = &[" and ", " vs. ", " vs ", " versus ", " with ", " to ", ", "];

/// Clause separators, and whether the clause after them builds on the one
/// before.
const CLAUSE_SEPARATORS: &[(&str, bool)] = &[
    ("; ", false),
    (". ", false),
    (", and then ", true),
    (" and then ", true),
    (", then ", true),
    (" then ", true),
    (", after that ", true),
    (" after that ", true),
    (" followed by ", true),
    (", based on ", true),
    (" based on ", true),
    (" as well as ", false),
    (" and also ", false),
    (", and ", false),
];

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a research planner. Break the user's question into a small number of concrete sub-tasks.

Each task is handled by one agent:
- "retrieval": answer from the indexed document collection (articles, notes, papers already ingested)
- "tool-use": look something up with an external tool (web search, Wikipedia, arXiv)

Respond with ONLY a JSON array, no prose:
[{"id": "t1", "description": "...", "agent": "retrieval", "depends_on": []}]

Rules:
- ids are short and unique
- depends_on lists ids of tasks whose results are needed first
- never create circular dependencies"#;

#[derive(Debug, Deserialize)]
struct PlannedTask {
    id: String,
    description: String,
    agent: String,
    #[serde(default, alias = "dependencies")]
    depends_on: Vec<String>,
}

pub struct PlanningAgent {
    llm: Option<Arc<dyn LLMClient>>,
    max_tasks: usize,
}

impl PlanningAgent {
    /// Heuristic-only planner.
    pub fn new(max_tasks: usize) -> Self {
        Self {
            llm: None,
            max_tasks: max_tasks.max(1),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Build a validated task graph for `query`.
    ///
    /// Structural problems in a plan (cycles, unknown dependencies) are
    /// returned as `AppError::Planning`, never repaired.
    #[tracing::instrument(skip(self), fields(llm = self.llm.is_some()))]
    pub async fn plan(&self, query: &str) -> Result<TaskGraph> {
        if let Some(llm) = &self.llm {
            match self.plan_with_llm(llm.as_ref(), query).await {
                Some(nodes) => return TaskGraph::new(nodes),
                None => tracing::debug!("LLM plan unusable, using heuristic decomposition"),
            }
        }
        TaskGraph::new(self.decompose(query))
    }

    async fn plan_with_llm(&self, llm: &dyn LLMClient, query: &str) -> Option<Vec<TaskNode>> {
        let prompt = format!(
            "Question: {}\n\nUse at most {} tasks.",
            query.trim(),
            self.max_tasks
        );
        let reply = match llm.generate_with_system(PLANNER_SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Planner LLM call failed");
                return None;
            }
        };
        Self::parse_plan(&reply, self.max_tasks)
    }

    /// Parse an LLM plan. `None` when the reply is not a usable plan; a
    /// well-formed plan with bad structure is returned as-is so graph
    /// validation can reject it.
    pub fn parse_plan(reply: &str, max_tasks: usize) -> Option<Vec<TaskNode>> {
        let planned: Vec<PlannedTask> = serde_json::from_str(extract_json_block(reply)).ok()?;
        if planned.is_empty() || planned.len() > max_tasks {
            return None;
        }
        planned
            .into_iter()
            .map(|task| {
                let agent = task.agent.parse::<TaskAgent>().ok()?;
                let description = task.description.trim();
                if description.is_empty() {
                    return None;
                }
                let mut node = TaskNode::new(task.id.trim(), description, agent);
                node.dependencies = task.depends_on;
                Some(node)
            })
            .collect()
    }

    /// Deterministic decomposition. Always yields at least one task.
    pub fn decompose(&self, query: &str) -> Vec<TaskNode> {
        let query = query.trim();
        if let Some(subjects) = comparison_tasks(query) {
            return subjects
                .into_iter()
                .take(self.max_tasks)
                .enumerate()
                .map(|(i, description)| {
                    TaskNode::new(format!("t{}", i + 1), description, TaskAgent::Retrieval)
                })
                .collect();
        }

        let mut nodes: Vec<TaskNode> = Vec::new();
        for (clause, builds_on_previous) in split_clauses(query) {
            if nodes.len() == self.max_tasks {
                break;
            }
            let mut node = TaskNode::new(
                format!("t{}", nodes.len() + 1),
                clause.as_str(),
                agent_for(&clause),
            );
            if builds_on_previous {
                if let Some(previous) = nodes.last() {
                    node = node.depends_on(previous.id.clone());
                }
            }
            nodes.push(node);
        }

        if nodes.is_empty() {
            nodes.push(TaskNode::new("t1", trim_clause(query), agent_for(query)));
        }
        nodes
    }
}

fn agent_for(clause: &str) -> TaskAgent {
    if contains_any(&tokenize(clause), TOOL_MARKERS) {
        TaskAgent::ToolUse
    } else {
        TaskAgent::Retrieval
    }
}

fn trim_clause(text: &str) -> &str {
    let text = text
        .trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | ',' | ';' | ':'))
        .trim();
    for lead in ["and ", "also ", "then ", "And ", "Also ", "Then "] {
        if let Some(rest) = text.strip_prefix(lead) {
            return rest.trim();
        }
    }
    text
}

/// Case-insensitive search that returns a byte offset valid in `haystack`.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

/// Split on the earliest of `separators`, repeatedly.
fn split_all<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let next = separators
            .iter()
            .filter_map(|sep| find_ci(rest, sep).map(|at| (at, sep.len())))
            .min_by_key(|(at, _)| *at);
        match next {
            Some((at, len)) => {
                parts.push(&rest[..at]);
                rest = &rest[at + len..];
            }
            None => {
                parts.push(rest);
                return parts;
            }
        }
    }
}

/// One retrieval description per compared subject, with the shared context
/// appended, e.g. "transformer architectures for time-series forecasting".
fn comparison_tasks(query: &str) -> Option<Vec<String>> {
    let lower = query.to_ascii_lowercase();

    let body = COMPARISON_OPENERS
        .iter()
        .filter_map(|opener| lower.find(opener).map(|at| &query[at + opener.len()..]))
        .next()
        .or_else(|| {
            COMPARISON_INFIXES
                .iter()
                .any(|infix| lower.contains(infix))
                .then_some(query)
        })?;
    let body = trim_clause(body);

    let (subject_part, context) = match CONTEXT_MARKERS
        .iter()
        .filter_map(|m| find_ci(body, m).map(|at| (at, m.len())))
        .min_by_key(|(at, _)| *at)
    {
        Some((at, len)) => (&body[..at], Some(trim_clause(&body[at + len..]))),
        None => (body, None),
    };

    let mut subjects: Vec<String> = split_all(subject_part, SUBJECT_SEPARATORS)
        .into_iter()
        .map(trim_clause)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if subjects.len() < 2 {
        return None;
    }

    // "transformer and RNN architectures": the trailing head noun belongs to
    // every bare subject.
    let head = subjects.last().and_then(|last| {
        let words: Vec<&str> = last.split_whitespace().collect();
        (words.len() > 1).then(|| words[words.len() - 1].to_string())
    });
    if let Some(head) = head {
        let last = subjects.len() - 1;
        for subject in subjects[..last].iter_mut() {
            if !subject.contains(' ') {
                subject.push(' ');
                subject.push_str(&head);
            }
        }
    }

    Some(
        subjects
            .into_iter()
            .map(|subject| match context {
                Some(ctx) if !ctx.is_empty() => format!("{} for {}", subject, ctx),
                _ => subject,
            })
            .collect(),
    )
}

/// Split a query into clauses, tagging each with whether it builds on the
/// clause before it.
fn split_clauses(query: &str) -> Vec<(String, bool)> {
    let mut clauses = Vec::new();
    let mut push = |clause: &str, builds_on_previous: bool| {
        let clause = trim_clause(clause);
        if !clause.is_empty() {
            clauses.push((clause.to_string(), builds_on_previous));
        }
    };

    let mut rest = query;
    let mut builds_on_previous = false;
    while let Some((at, len, dependent)) = CLAUSE_SEPARATORS
        .iter()
        .filter_map(|(sep, dependent)| find_ci(rest, sep).map(|at| (at, sep.len(), *dependent)))
        .min_by_key(|(at, _, _)| *at)
    {
        push(&rest[..at], builds_on_previous);
        builds_on_previous = dependent;
        rest = &rest[at + len..];
    }
    push(rest, builds_on_previous);
    clauses
}
