//! # SAGE - multi-agent research assistant
//!
//! SAGE answers research questions with a small team of agents. A query is
//! classified, decomposed into a dependency graph of sub-tasks, executed
//! against a hybrid vector + knowledge-graph index and external tools, and
//! turned into a report where every claim cites its evidence. Each run's
//! thought path (which agents acted, in what order, on which evidence) is
//! recorded per session.
//!
//! ## Overview
//!
//! SAGE can be used in two ways:
//!
//! 1. **As a command-line tool** - Run the `sage` binary
//! 2. **As a library** - Build a [`ResearchService`] in your own project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use sage::{ResearchService, SageConfig};
//! use sage::types::RawDocument;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ResearchService::from_config(SageConfig::load_or_default("sage.toml")?).await?;
//!
//!     service
//!         .ingest(&RawDocument::new("RNNs", "Recurrent neural networks process sequences..."))
//!         .await?;
//!
//!     let outcome = service
//!         .run_research_query("default", "Compare transformer and RNN architectures")
//!         .await?;
//!
//!     println!("{}", outcome.report.text);
//!     println!("{}", outcome.agent_path);
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Tools
//!
//! ```rust,ignore
//! use sage::{ResearchService, SageConfig, ToolRegistry};
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(MyCorpusSearch::new()));
//!
//! let service = ResearchService::builder(SageConfig::default())
//!     .tools(registry)
//!     .build()
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI API and compatible endpoints |
//! | `local-embeddings` | fastembed ONNX embeddings instead of hashing |
//!
//! Without an LLM provider every agent falls back to deterministic
//! heuristics, so the full pipeline runs offline.
//!
//! ## Modules
//!
//! - [`agents`] - Orchestrator, router, planning, tool-use, retrieval and summarization agents
//! - [`db`] - Vector, graph and thought-path stores
//! - [`llm`] - LLM client implementations
//! - [`rag`] - Chunking, embeddings, entity extraction and hybrid fusion
//! - [`research`] - The [`ResearchService`] facade
//! - [`tools`] - Web search, Wikipedia, arXiv and page fetch tools
//! - [`workflows`] - Task graphs and the parallel scheduler
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Research agents and the orchestrator.
pub mod agents;
/// Command-line parsing and terminal output.
pub mod cli;
/// Vector, graph and history stores.
pub mod db;
/// LLM provider clients and abstractions.
pub mod llm;
/// Hybrid retrieval over the vector and graph stores.
pub mod rag;
/// Service facade wiring everything together.
pub mod research;
/// External research tools.
pub mod tools;
/// Core types (queries, evidence, reports, errors).
pub mod types;
/// Configuration, logging and retry helpers.
pub mod utils;
/// Task graphs and scheduling.
pub mod workflows;

// Re-export commonly used types
pub use agents::{IntentClassifier, Orchestrator};
pub use db::{InMemoryThoughtPathStore, SqliteThoughtPathStore, ThoughtPathStore};
pub use llm::{LLMClient, Provider};
pub use rag::{HybridFusionEngine, IndexingPipeline};
pub use research::{ResearchService, ResearchServiceBuilder};
pub use tools::registry::{Tool, ToolRegistry};
pub use types::{AppError, Report, Result, RunOutcome, ThoughtPathRecord};
pub use utils::toml_config::{SageConfig, SageConfigManager};
pub use workflows::{TaskGraph, TaskScheduler};
