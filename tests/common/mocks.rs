//! Mock implementations for testing.
//!
//! Mock LLM clients, tools and stores shared by the integration tests.

use async_trait::async_trait;
use sage::db::{
    GraphCandidate, GraphStore, InMemoryGraphStore, InMemoryVectorStore, ThoughtPathStore,
    VectorCandidate, VectorStore,
};
use sage::llm::LLMClient;
use sage::tools::Tool;
use sage::types::{
    AppError, Chunk, GraphEntity, GraphRelation, Result, SessionSummary, ThoughtPathRecord,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock LLM client that returns a fixed reply or always fails.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockLLMClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            should_fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reply(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.reply()
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.reply()
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// How a [`MockTool`] misbehaves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolFailure {
    /// Fails with a transient upstream error on every call
    Transient,
    /// Fails with a transient error on the first call only
    TransientOnce,
    /// Fails with a permanent upstream error
    Permanent,
}

/// Search tool with canned results and a call counter.
pub struct MockTool {
    name: String,
    results: Vec<(String, String, String)>,
    failure: Option<ToolFailure>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Vec::new(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_result(mut self, title: &str, url: &str, snippet: &str) -> Self {
        self.results
            .push((title.to_string(), url.to_string(), snippet.to_string()));
        self
    }

    pub fn failing(mut self, failure: ToolFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock search tool"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure {
            Some(ToolFailure::Transient) => {
                return Err(AppError::Upstream {
                    message: format!("{} returned HTTP 503", self.name),
                    transient: true,
                })
            }
            Some(ToolFailure::TransientOnce) if call == 0 => {
                return Err(AppError::Upstream {
                    message: format!("{} returned HTTP 503", self.name),
                    transient: true,
                })
            }
            Some(ToolFailure::Permanent) => {
                return Err(AppError::Upstream {
                    message: format!("{} returned HTTP 404", self.name),
                    transient: false,
                })
            }
            _ => {}
        }

        let results: Vec<Value> = self
            .results
            .iter()
            .map(|(title, url, snippet)| json!({"title": title, "url": url, "snippet": snippet}))
            .collect();
        Ok(json!({
            "query": args.get("query").cloned().unwrap_or(Value::Null),
            "count": results.len(),
            "results": results,
        }))
    }
}

/// Vector store whose searches can be switched to fail.
#[derive(Clone)]
pub struct SwitchableVectorStore {
    inner: InMemoryVectorStore,
    failing: Arc<AtomicBool>,
}

impl SwitchableVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: InMemoryVectorStore::new(dimensions),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for SwitchableVectorStore {
    fn provider_name(&self) -> &'static str {
        "switchable-vector"
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        self.inner.upsert(chunks).await
    }

    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<VectorCandidate>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Database("vector index offline".to_string()));
        }
        self.inner.search(embedding, top_n).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_document(document_id).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// Graph store whose reads can be switched to fail.
#[derive(Clone)]
pub struct SwitchableGraphStore {
    inner: InMemoryGraphStore,
    failing: Arc<AtomicBool>,
}

impl SwitchableGraphStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryGraphStore::new(),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Database("graph store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SwitchableGraphStore {
    fn provider_name(&self) -> &'static str {
        "switchable-graph"
    }

    async fn upsert(&self, entities: &[GraphEntity], relations: &[GraphRelation]) -> Result<usize> {
        self.inner.upsert(entities, relations).await
    }

    async fn find_entities(&self, query: &str) -> Result<Vec<GraphEntity>> {
        self.check()?;
        self.inner.find_entities(query).await
    }

    async fn traverse(&self, seeds: &[String], max_hops: usize) -> Result<Vec<GraphCandidate>> {
        self.check()?;
        self.inner.traverse(seeds, max_hops).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_document(document_id).await
    }

    async fn entity_count(&self) -> Result<usize> {
        self.inner.entity_count().await
    }

    async fn relation_count(&self) -> Result<usize> {
        self.inner.relation_count().await
    }
}

/// History store that rejects every write.
pub struct FailingHistoryStore;

#[async_trait]
impl ThoughtPathStore for FailingHistoryStore {
    fn provider_name(&self) -> &'static str {
        "failing"
    }

    async fn append(&self, _record: &ThoughtPathRecord) -> Result<String> {
        Err(AppError::Persistence("disk full".to_string()))
    }

    async fn list(&self, _session_id: &str) -> Result<Vec<ThoughtPathRecord>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _session_id: &str) -> Result<usize> {
        Ok(0)
    }

    async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(Vec::new())
    }
}
