//! Research Service
//!
//! The entry point for callers. A [`ResearchService`] wires configuration,
//! storage, tools and the optional LLM into an [`Orchestrator`] and an
//! [`IndexingPipeline`], and exposes the operations the CLI needs:
//!
//! - run a research query for a session (optionally cancellable)
//! - list, page through and delete a session's thought-path history
//! - ingest documents and web pages into the knowledge base
//!
//! A service built with [`ResearchService::from_manager`] follows the live
//! `[retrieval]` section of its config file: each run picks up the settings
//! current when it starts.
//!
//! # Usage
//!
//! ```ignore
//! use sage::research::ResearchService;
//! use sage::utils::toml_config::SageConfig;
//!
//! let service = ResearchService::from_config(SageConfig::load("sage.toml")?).await?;
//!
//! let outcome = service
//!     .run_research_query("session-1", "Compare transformer and RNN architectures")
//!     .await?;
//!
//! println!("{}", outcome.report.text);
//! println!("path: {}", outcome.agent_path);
//! ```

use crate::agents::{
    Orchestrator, PlanningAgent, RetrievalAgent, SummarizationAgent, ToolUseAgent,
};
use crate::db::{
    GraphStore, InMemoryGraphStore, InMemoryThoughtPathStore, InMemoryVectorStore,
    SqliteThoughtPathStore, ThoughtPathStore, VectorStore,
};
use crate::llm::{LLMClient, Provider};
use crate::rag::{
    embedder_from_config, Embedder, EntityExtractor, HeuristicEntityExtractor,
    HybridFusionEngine, IndexingPipeline, IngestReport, LlmEntityExtractor, TextChunker,
};
use crate::tools::{default_registry, fetch::FetchPageTool, http_client, ToolRegistry};
use crate::types::{
    AppError, Query, RawDocument, Result, RunOutcome, SessionSummary, ThoughtPathRecord,
};
use crate::utils::toml_config::{HistoryConfig, RetrievalConfig, SageConfig, SageConfigManager};
use crate::workflows::TaskScheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const VECTOR_SNAPSHOT: &str = "vectors.json";
const GRAPH_SNAPSHOT: &str = "graph.json";

/// In-memory stores mirrored to JSON files so separate processes share an
/// index.
struct Snapshots {
    dir: PathBuf,
    vector: Arc<InMemoryVectorStore>,
    graph: Arc<InMemoryGraphStore>,
}

impl Snapshots {
    fn open(dir: &Path, dimensions: usize) -> Result<Self> {
        let vector_path = dir.join(VECTOR_SNAPSHOT);
        let graph_path = dir.join(GRAPH_SNAPSHOT);

        let vector = if vector_path.exists() {
            let store = InMemoryVectorStore::load(&vector_path)?;
            if store.dimensions() != dimensions {
                return Err(AppError::Configuration(format!(
                    "Index at {:?} has {} dimensions but the embedder produces {}; re-ingest or change [ingestion]",
                    vector_path,
                    store.dimensions(),
                    dimensions
                )));
            }
            store
        } else {
            InMemoryVectorStore::new(dimensions)
        };
        let graph = if graph_path.exists() {
            InMemoryGraphStore::load(&graph_path)?
        } else {
            InMemoryGraphStore::new()
        };

        tracing::debug!(dir = ?dir, "Opened knowledge base snapshots");
        Ok(Self {
            dir: dir.to_path_buf(),
            vector: Arc::new(vector),
            graph: Arc::new(graph),
        })
    }

    fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Internal(format!("Failed to create {:?}: {}", self.dir, e))
        })?;
        self.vector.save(self.dir.join(VECTOR_SNAPSHOT))?;
        self.graph.save(self.dir.join(GRAPH_SNAPSHOT))
    }
}

/// Builder for [`ResearchService`]. Anything not supplied is created from
/// the configuration.
#[derive(Default)]
pub struct ResearchServiceBuilder {
    config: SageConfig,
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    history: Option<Arc<dyn ThoughtPathStore>>,
    tools: Option<ToolRegistry>,
    llm: Option<Arc<dyn LLMClient>>,
    embedder: Option<Arc<dyn Embedder>>,
    manager: Option<Arc<SageConfigManager>>,
    snapshots: bool,
}

impl ResearchServiceBuilder {
    pub fn new(config: SageConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(store);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(store);
        self
    }

    pub fn history(mut self, store: Arc<dyn ThoughtPathStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = Some(registry);
        self
    }

    pub fn llm(mut self, client: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Re-read `[retrieval]` from `manager` at the start of every run.
    pub fn config_manager(mut self, manager: Arc<SageConfigManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Load and save the knowledge base under `storage.data_dir`. Ignored
    /// when both stores are supplied explicitly.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    pub async fn build(self) -> Result<ResearchService> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedder_from_config(&config.ingestion)?,
        };

        let snapshots = if self.snapshots && (self.vector.is_none() || self.graph.is_none()) {
            Some(Snapshots::open(
                &config.storage.data_dir,
                embedder.dimensions(),
            )?)
        } else {
            None
        };
        let vector: Arc<dyn VectorStore> = match (self.vector, &snapshots) {
            (Some(store), _) => store,
            (None, Some(s)) => s.vector.clone(),
            (None, None) => Arc::new(InMemoryVectorStore::new(embedder.dimensions())),
        };
        let graph: Arc<dyn GraphStore> = match (self.graph, &snapshots) {
            (Some(store), _) => store,
            (None, Some(s)) => s.graph.clone(),
            (None, None) => Arc::new(InMemoryGraphStore::new()),
        };

        let history: Arc<dyn ThoughtPathStore> = match self.history {
            Some(store) => store,
            None => match &config.history {
                HistoryConfig::Memory => Arc::new(InMemoryThoughtPathStore::new()),
                HistoryConfig::Sqlite { path } => {
                    Arc::new(SqliteThoughtPathStore::open(path).await?)
                }
            },
        };

        let registry = match self.tools {
            Some(registry) => registry,
            None => default_registry(&config.tools)?,
        };

        let llm = self.llm;
        let llm_for = |enabled: bool| llm.clone().filter(|_| enabled);

        let extractor: Arc<dyn EntityExtractor> = match llm_for(config.llm.extraction) {
            Some(client) => Arc::new(LlmEntityExtractor::new(client)),
            None => Arc::new(HeuristicEntityExtractor::new()),
        };
        let pipeline = IndexingPipeline::new(
            TextChunker::new(config.ingestion.chunk_size, config.ingestion.chunk_overlap)?,
            embedder.clone(),
            extractor,
            vector.clone(),
            graph.clone(),
        );

        let mut planner = PlanningAgent::new(config.orchestrator.max_plan_tasks);
        if let Some(client) = llm_for(config.llm.planning) {
            planner = planner.with_llm(client);
        }
        let mut summarizer = SummarizationAgent::new();
        if let Some(client) = llm_for(config.llm.synthesis) {
            summarizer = summarizer.with_llm(client);
        }

        let tool_use = ToolUseAgent::new(
            Arc::new(registry),
            Duration::from_secs(config.tools.timeout_secs),
            Duration::from_millis(config.tools.retry_backoff_ms),
            config.tools.max_results,
        );
        let engine = Arc::new(HybridFusionEngine::new(
            vector,
            graph,
            embedder,
            config.retrieval.clone(),
        ));
        let retrieval = RetrievalAgent::new(engine.clone());
        let scheduler = TaskScheduler::new(
            config.orchestrator.max_parallel_tasks,
            Duration::from_millis(config.orchestrator.cancel_grace_ms),
        );

        let orchestrator = Orchestrator::new(
            planner,
            Arc::new(tool_use),
            Arc::new(retrieval),
            summarizer,
            history.clone(),
            scheduler,
        );

        tracing::info!(
            history = history.provider_name(),
            llm = llm.as_ref().map(|c| c.model_name()).unwrap_or("none"),
            snapshots = snapshots.is_some(),
            live_config = self.manager.is_some(),
            "Research service ready"
        );

        Ok(ResearchService {
            fetcher: FetchPageTool::new(http_client(&config.tools)?),
            config,
            orchestrator,
            engine,
            live_config: self.manager,
            pipeline,
            history,
            snapshots,
        })
    }
}

pub struct ResearchService {
    config: SageConfig,
    orchestrator: Orchestrator,
    engine: Arc<HybridFusionEngine>,
    live_config: Option<Arc<SageConfigManager>>,
    pipeline: IndexingPipeline,
    history: Arc<dyn ThoughtPathStore>,
    fetcher: FetchPageTool,
    snapshots: Option<Snapshots>,
}

impl ResearchService {
    pub fn builder(config: SageConfig) -> ResearchServiceBuilder {
        ResearchServiceBuilder::new(config)
    }

    /// Build a service from configuration alone: the configured LLM provider
    /// (if any), history backend and on-disk knowledge base.
    pub async fn from_config(config: SageConfig) -> Result<Self> {
        let mut builder = ResearchServiceBuilder::new(config.clone()).with_snapshots(true);
        if let Some(provider) = Provider::from_config(&config)? {
            tracing::info!(provider = provider.name(), "Using LLM provider");
            builder = builder.llm(provider.create_client().await?);
        }
        builder.build().await
    }

    /// Like [`from_config`](Self::from_config), taking the current config
    /// from `manager` and following its `[retrieval]` section afterwards.
    pub async fn from_manager(manager: Arc<SageConfigManager>) -> Result<Self> {
        let config = manager.config().as_ref().clone();
        let mut builder = ResearchServiceBuilder::new(config.clone())
            .with_snapshots(true)
            .config_manager(manager);
        if let Some(provider) = Provider::from_config(&config)? {
            tracing::info!(provider = provider.name(), "Using LLM provider");
            builder = builder.llm(provider.create_client().await?);
        }
        builder.build().await
    }

    /// Configuration the service was built with.
    pub fn config(&self) -> &SageConfig {
        &self.config
    }

    /// Retrieval settings the next run will use.
    pub fn retrieval_config(&self) -> Arc<RetrievalConfig> {
        self.refresh_retrieval();
        self.engine.config()
    }

    fn refresh_retrieval(&self) {
        let Some(manager) = &self.live_config else {
            return;
        };
        let latest = manager.config();
        if *self.engine.config() != latest.retrieval {
            self.engine.set_config(latest.retrieval.clone());
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn run_research_query(&self, session_id: &str, text: &str) -> Result<RunOutcome> {
        self.run_research_query_with_cancel(session_id, text, &CancellationToken::new())
            .await
    }

    /// Run a query that stops early once `cancel` fires.
    pub async fn run_research_query_with_cancel(
        &self,
        session_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if session_id.trim().is_empty() {
            return Err(AppError::InvalidInput("session id must not be empty".to_string()));
        }
        self.refresh_retrieval();
        self.orchestrator
            .run(Query::new(session_id.trim(), text), cancel)
            .await
    }

    /// Thought paths of a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ThoughtPathRecord>> {
        self.history.list(session_id).await
    }

    pub async fn recent_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ThoughtPathRecord>> {
        self.history.recent(session_id, limit).await
    }

    pub async fn delete_history(&self, session_id: &str) -> Result<usize> {
        let removed = self.history.delete(session_id).await?;
        tracing::info!(session = session_id, removed, "Deleted session history");
        Ok(removed)
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.history.sessions().await
    }

    pub async fn ingest(&self, document: &RawDocument) -> Result<IngestReport> {
        let report = self.pipeline.ingest(document).await?;
        self.save_snapshots()?;
        Ok(report)
    }

    /// Fetch a page and index its readable text. The URL doubles as the
    /// document id, so ingesting the same URL again replaces it.
    pub async fn ingest_url(&self, url: &str, title: Option<&str>) -> Result<IngestReport> {
        let page = self.fetcher.fetch(url).await?;
        let title = title
            .map(String::from)
            .or(page.title)
            .unwrap_or_else(|| url.to_string());
        let document = RawDocument::new(title, page.content)
            .with_id(url)
            .with_source(url);
        self.ingest(&document).await
    }

    /// Persist the knowledge base if it is backed by snapshot files.
    pub fn save_snapshots(&self) -> Result<()> {
        match &self.snapshots {
            Some(snapshots) => snapshots.save(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config(data_dir: &Path) -> SageConfig {
        let mut config = SageConfig::default();
        config.history = HistoryConfig::Memory;
        config.storage.data_dir = data_dir.to_path_buf();
        config.tools.web_search = false;
        config
    }

    #[tokio::test]
    async fn test_snapshots_shared_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = ResearchService::builder(memory_config(dir.path()))
            .with_snapshots(true)
            .build()
            .await
            .unwrap();
        first
            .ingest(&RawDocument::new(
                "LSTM",
                "Long short-term memory networks are recurrent neural networks.",
            ))
            .await
            .unwrap();
        assert!(dir.path().join(VECTOR_SNAPSHOT).exists());
        assert!(dir.path().join(GRAPH_SNAPSHOT).exists());

        let second = ResearchService::builder(memory_config(dir.path()))
            .with_snapshots(true)
            .build()
            .await
            .unwrap();
        let snapshots = second.snapshots.as_ref().unwrap();
        assert!(snapshots.vector.count().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_empty_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = ResearchService::builder(memory_config(dir.path()))
            .build()
            .await
            .unwrap();
        assert!(matches!(
            service.run_research_query("  ", "hello").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
