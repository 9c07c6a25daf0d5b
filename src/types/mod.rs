use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============= Query & Intent Types =============

/// One user turn. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    session_id: String,
    text: String,
}

impl Query {
    /// Create a query for a session.
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
        }
    }

    /// Session this query belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Raw query text as the user typed it.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Agent a single-tool query is routed to without planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectRoute {
    ToolUse,
    Retrieval,
    Summarization,
}

/// Classification of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "route")]
pub enum Intent {
    Casual,
    SingleTool(DirectRoute),
    MultiStepResearch,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Casual => write!(f, "casual"),
            Intent::SingleTool(route) => write!(f, "single-tool ({})", AgentName::from(*route)),
            Intent::MultiStepResearch => write!(f, "multi-step-research"),
        }
    }
}

// ============= Agent Path Types =============

/// Agents that can appear in a thought path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentName {
    Orchestrator,
    Planning,
    ToolUse,
    Retrieval,
    Summarization,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Orchestrator => "orchestrator",
            AgentName::Planning => "planning",
            AgentName::ToolUse => "tool-use",
            AgentName::Retrieval => "retrieval",
            AgentName::Summarization => "summarization",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "orchestrator" => Ok(AgentName::Orchestrator),
            "planning" => Ok(AgentName::Planning),
            "tool-use" => Ok(AgentName::ToolUse),
            "retrieval" => Ok(AgentName::Retrieval),
            "summarization" => Ok(AgentName::Summarization),
            other => Err(AppError::InvalidInput(format!("Unknown agent: {}", other))),
        }
    }
}

impl From<DirectRoute> for AgentName {
    fn from(route: DirectRoute) -> Self {
        match route {
            DirectRoute::ToolUse => AgentName::ToolUse,
            DirectRoute::Retrieval => AgentName::Retrieval,
            DirectRoute::Summarization => AgentName::Summarization,
        }
    }
}

impl From<TaskAgent> for AgentName {
    fn from(agent: TaskAgent) -> Self {
        match agent {
            TaskAgent::ToolUse => AgentName::ToolUse,
            TaskAgent::Retrieval => AgentName::Retrieval,
        }
    }
}

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Received,
    Classifying,
    CasualReply,
    SingleToolDispatch,
    PlanningHandoff,
    Executing,
    Synthesizing,
    Persisted,
    Success,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }
}

/// One entry of the state log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// One agent visit within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub agent: AgentName,
    /// State that handed control to this agent.
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Ordered agent visits for one run, in start order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPath {
    steps: Vec<PathStep>,
}

impl AgentPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a path from stored steps.
    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, agent: AgentName, state: RunState, task_id: Option<String>) {
        self.steps.push(PathStep {
            agent,
            state,
            task_id,
            started_at: Utc::now(),
        });
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Agent names only, e.g. `[orchestrator, planning, retrieval]`.
    pub fn agents(&self) -> Vec<AgentName> {
        self.steps.iter().map(|s| s.agent).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for AgentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|s| s.agent.as_str()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

// ============= Task Graph Types =============

/// Agent kinds a planned task can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskAgent {
    ToolUse,
    Retrieval,
}

impl std::str::FromStr for TaskAgent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "tool-use" | "tool" | "tools" => Ok(TaskAgent::ToolUse),
            "retrieval" | "rag" | "search" => Ok(TaskAgent::Retrieval),
            other => Err(AppError::Planning(format!("Unknown agent kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    #[serde(rename = "skipped-due-to-dependency-failure")]
    SkippedDependencyFailed,
}

impl TaskStatus {
    /// True once the scheduler will never touch the task again.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::SkippedDependencyFailed
        )
    }
}

/// One decomposed sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub description: String,
    /// Ids of tasks that must be `Done` first, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub agent: TaskAgent,
    pub status: TaskStatus,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, description: impl Into<String>, agent: TaskAgent) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            agent,
            status: TaskStatus::Pending,
        }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

// ============= Evidence Types =============

/// Retrieval backends feeding the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Vector,
    Graph,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Vector => write!(f, "vector"),
            Backend::Graph => write!(f, "graph"),
        }
    }
}

/// Subject-predicate-object triple from the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl fmt::Display for RelationTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EvidenceContent {
    Span { text: String },
    Relation(RelationTriple),
}

impl EvidenceContent {
    pub fn as_text(&self) -> String {
        match self {
            EvidenceContent::Span { text } => text.clone(),
            EvidenceContent::Relation(triple) => triple.to_string(),
        }
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Provenance {
    /// Stable identity used for deduplication and tie-breaking.
    ///
    /// Chunk-level evidence is keyed by chunk id so a chunk found by both
    /// backends collapses to one item. Graph-only evidence falls back to its
    /// node ids.
    pub fn key(&self) -> String {
        if let Some(chunk) = &self.chunk_id {
            return chunk.clone();
        }
        if !self.node_ids.is_empty() {
            return format!("graph:{}", self.node_ids.join("|"));
        }
        match &self.document_id {
            Some(doc) => format!("doc:{}", doc),
            None => String::from("unknown"),
        }
    }

    /// Human readable label for citations.
    pub fn label(&self) -> String {
        match (&self.title, &self.source) {
            (Some(title), Some(source)) => format!("{} ({})", title, source),
            (Some(title), None) => title.clone(),
            (None, Some(source)) => source.clone(),
            (None, None) => self.key(),
        }
    }
}

/// A unit of retrieved knowledge after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub sources: Vec<Backend>,
    pub content: EvidenceContent,
    /// Graph relations supporting this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationTriple>,
    /// Fused relevance in [0, 1].
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
    pub provenance: Provenance,
}

impl EvidenceItem {
    pub fn key(&self) -> String {
        self.provenance.key()
    }

    pub fn from_backend(&self, backend: Backend) -> bool {
        self.sources.contains(&backend)
    }
}

/// Backend failure recorded on a degraded retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRetrieval {
    pub failed_backend: Backend,
    pub reason: String,
}

/// Re-ranked evidence for one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEvidenceSet {
    pub query: String,
    pub items: Vec<EvidenceItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialRetrieval>,
}

impl FusedEvidenceSet {
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn provenance_keys(&self) -> Vec<String> {
        self.items.iter().map(|i| i.key()).collect()
    }
}

// ============= Tool Types =============

/// Attribution for a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Raw result of one tool-use task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<ToolSource>,
}

/// Result of one executed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskOutput {
    Evidence(FusedEvidenceSet),
    Tool(ToolOutput),
}

// ============= Indexing Types =============

/// Document handed to the indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub text: String,
}

impl RawDocument {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            source: None,
            authors: Vec::new(),
            text: text.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }
}

/// Embedded span of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{}#{}", document_id, index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Article,
    Author,
    Topic,
    Technology,
    Company,
    Concept,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Article => "article",
            EntityKind::Author => "author",
            EntityKind::Topic => "topic",
            EntityKind::Technology => "technology",
            EntityKind::Company => "company",
            EntityKind::Concept => "concept",
        }
    }
}

/// Knowledge graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

impl GraphEntity {
    /// Entities are keyed by kind and normalized name so repeated mentions
    /// across documents merge into one node.
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        let name = name.into();
        let id = Self::entity_id(&name, kind);
        Self { id, name, kind }
    }

    pub fn entity_id(name: &str, kind: EntityKind) -> String {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        format!("{}:{}", kind.as_str(), normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    WrittenBy,
    AboutTopic,
    Mentions,
    RelatedTo,
    Uses,
    DevelopedBy,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::WrittenBy => "WRITTEN_BY",
            RelationKind::AboutTopic => "ABOUT_TOPIC",
            RelationKind::Mentions => "MENTIONS",
            RelationKind::RelatedTo => "RELATED_TO",
            RelationKind::Uses => "USES",
            RelationKind::DevelopedBy => "DEVELOPED_BY",
        }
    }
}

/// Typed edge between two graph entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelation {
    pub subject: String,
    pub predicate: RelationKind,
    pub object: String,
    /// Chunk the relation was extracted from.
    #[serde(default)]
    pub source_chunk: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}

// ============= Report Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationKind {
    Evidence,
    Tool,
    User,
}

/// A numbered source referenced by `[n]` markers in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub marker: usize,
    pub key: String,
    pub label: String,
    pub kind: CitationKind,
}

/// A report sentence and the citation markers backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub citations: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub partial: bool,
}

impl Report {
    /// Report without sources, used for conversational replies.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
            claims: Vec::new(),
            partial: false,
        }
    }

    pub fn citation(&self, marker: usize) -> Option<&Citation> {
        self.citations.iter().find(|c| c.marker == marker)
    }
}

// ============= Thought Path Types =============

/// Compact task summary stored with a thought path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub description: String,
    pub agent: TaskAgent,
    pub status: TaskStatus,
}

impl From<&TaskNode> for TaskSummary {
    fn from(node: &TaskNode) -> Self {
        Self {
            id: node.id.clone(),
            description: node.description.clone(),
            agent: node.agent,
            status: node.status,
        }
    }
}

/// Persisted trace of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtPathRecord {
    pub id: String,
    pub session_id: String,
    pub query: String,
    pub intent: Intent,
    pub agent_path: AgentPath,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
    /// Provenance keys of the evidence the report was built from.
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub tool_sources: Vec<ToolSource>,
    pub report: String,
    #[serde(default)]
    pub partial: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-session rollup for history listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub runs: usize,
    pub first_query: String,
    pub last_activity: DateTime<Utc>,
}

/// What a caller gets back from a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub intent: Intent,
    pub report: Report,
    pub agent_path: AgentPath,
    #[serde(default)]
    pub tasks: Vec<TaskNode>,
    /// Set when the thought path could not be stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

impl RunOutcome {
    pub fn persistence_degraded(&self) -> bool {
        self.persistence_error.is_some()
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Tool '{tool}' unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Upstream error: {message}")]
    Upstream { message: String, transient: bool },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Upstream { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.is_server_error() || s.as_u16() == 429)
                .unwrap_or(false);
        AppError::Upstream {
            message: err.to_string(),
            transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_accessors() {
        let q = Query::new("s1", "hello");
        assert_eq!(q.session_id(), "s1");
        assert_eq!(q.text(), "hello");
    }

    #[test]
    fn test_agent_path_display() {
        let mut path = AgentPath::new();
        path.push(AgentName::Orchestrator, RunState::Received, None);
        path.push(AgentName::Planning, RunState::PlanningHandoff, None);
        assert_eq!(path.to_string(), "orchestrator -> planning");
        assert_eq!(
            path.agents(),
            vec![AgentName::Orchestrator, AgentName::Planning]
        );
    }

    #[test]
    fn test_task_status_serializes_skip_name() {
        let json = serde_json::to_string(&TaskStatus::SkippedDependencyFailed).unwrap();
        assert_eq!(json, "\"skipped-due-to-dependency-failure\"");
    }

    #[test]
    fn test_task_agent_from_str() {
        assert_eq!("tool_use".parse::<TaskAgent>().unwrap(), TaskAgent::ToolUse);
        assert_eq!("Retrieval".parse::<TaskAgent>().unwrap(), TaskAgent::Retrieval);
        assert!("summarization".parse::<TaskAgent>().is_err());
    }

    #[test]
    fn test_provenance_key_prefers_chunk() {
        let p = Provenance {
            document_id: Some("doc".into()),
            chunk_id: Some("doc#0".into()),
            node_ids: vec!["topic:rnn".into()],
            ..Default::default()
        };
        assert_eq!(p.key(), "doc#0");

        let graph_only = Provenance {
            node_ids: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert_eq!(graph_only.key(), "graph:a|b");
    }

    #[test]
    fn test_entity_id_normalizes_name() {
        let e = GraphEntity::new("  Recurrent  Neural Network ", EntityKind::Technology);
        assert_eq!(e.id, "technology:recurrent-neural-network");
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout("x".into()).is_transient());
        assert!(AppError::Upstream {
            message: "503".into(),
            transient: true
        }
        .is_transient());
        assert!(!AppError::Planning("cycle".into()).is_transient());
    }
}
