//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod mocks;

use mocks::{SwitchableGraphStore, SwitchableVectorStore};
use sage::tools::{Tool, ToolRegistry};
use sage::types::RawDocument;
use sage::utils::toml_config::{HistoryConfig, SageConfig};
use sage::{ResearchService, ThoughtPathStore};
use std::sync::Arc;

/// Offline configuration: in-memory history, no web search, fast tool
/// timeouts.
pub fn test_config() -> SageConfig {
    let mut config = SageConfig::default();
    config.history = HistoryConfig::Memory;
    config.tools.web_search = false;
    config.tools.timeout_secs = 2;
    config.tools.retry_backoff_ms = 1;
    config.retrieval.retry_backoff_ms = 1;
    config.orchestrator.cancel_grace_ms = 100;
    config
}

/// A small corpus about sequence models.
pub fn corpus() -> Vec<RawDocument> {
    vec![
        RawDocument::new(
            "Transformers for forecasting",
            "The Transformer architecture relies on self-attention instead of recurrence. \
             Transformer models capture long-range dependencies in time-series forecasting. \
             The Informer model uses sparse attention for long sequence forecasting.",
        )
        .with_id("doc-transformer")
        .with_source("notes/transformers.md")
        .with_authors(vec!["Ashish Vaswani".to_string()]),
        RawDocument::new(
            "Recurrent networks",
            "Recurrent neural networks (RNN) process a sequence one step at a time. \
             The LSTM architecture adds gates to the RNN to keep long-term memory. \
             RNN architectures remain strong baselines for short-horizon forecasting.",
        )
        .with_id("doc-rnn")
        .with_source("notes/rnn.md")
        .with_authors(vec!["Sepp Hochreiter".to_string()]),
    ]
}

/// The pieces of a test service the tests poke at.
pub struct Harness {
    pub service: ResearchService,
    pub vector: Arc<SwitchableVectorStore>,
    pub graph: Arc<SwitchableGraphStore>,
}

/// Service with switchable stores, the given tools and the sample corpus
/// already indexed.
pub async fn harness(tools: Vec<Arc<dyn Tool>>, history: Arc<dyn ThoughtPathStore>) -> Harness {
    let config = test_config();
    let vector = Arc::new(SwitchableVectorStore::new(config.ingestion.dimensions));
    let graph = Arc::new(SwitchableGraphStore::new());

    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }

    let service = ResearchService::builder(config)
        .vector_store(vector.clone())
        .graph_store(graph.clone())
        .history(history)
        .tools(registry)
        .build()
        .await
        .expect("service builds");

    for document in corpus() {
        service.ingest(&document).await.expect("document ingests");
    }

    Harness {
        service,
        vector,
        graph,
    }
}
