//! Hybrid Retrieval Pipeline
//!
//! Indexing and retrieval over two stores: a vector store of embedded chunks
//! and a knowledge graph of entities extracted from those chunks.
//!
//! # Module Structure
//!
//! - [`rag::chunker`](crate::rag::chunker) - Text chunking with `text-splitter`
//! - [`rag::embeddings`](crate::rag::embeddings) - Hashing and fastembed embedders, query cache
//! - [`rag::entities`](crate::rag::entities) - Heuristic and LLM entity extraction
//! - [`rag::pipeline`](crate::rag::pipeline) - Document ingestion into both stores
//! - [`rag::fusion`](crate::rag::fusion) - Weighted and reciprocal rank fusion
//!
//! # Flow
//!
//! 1. **Ingestion** - Documents are chunked, embedded and written to the vector store
//! 2. **Extraction** - Entities and relations per chunk are written to the graph store
//! 3. **Retrieval** - Both stores are queried concurrently
//! 4. **Fusion** - Scores are normalized per backend, merged by provenance and ranked
//!
//! # Example
//!
//! ```ignore
//! use sage::rag::{IndexingPipeline, HybridFusionEngine};
//!
//! pipeline.ingest(&RawDocument::new("RNNs", text)).await?;
//! let evidence = engine.retrieve("recurrent networks for forecasting", 5).await?;
//! for item in &evidence.items {
//!     println!("{:.2} {}", item.score, item.content.as_text());
//! }
//! ```

pub mod chunker;
pub mod embeddings;
pub mod entities;
pub mod fusion;
pub mod pipeline;

pub use chunker::TextChunker;
pub use embeddings::{embedder_from_config, CachedEmbedder, Embedder, HashingEmbedder};
pub use entities::{EntityExtractor, ExtractedEntities, HeuristicEntityExtractor, LlmEntityExtractor};
pub use fusion::{fuse_candidates, min_max_normalize, HybridFusionEngine, RrfFusion};
pub use pipeline::{IndexingPipeline, IngestReport};
