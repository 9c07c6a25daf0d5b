//! Vector Store Abstraction Layer
//!
//! Chunks produced by the indexing pipeline are written here once and read
//! concurrently by every retrieval call afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               VectorStore Trait              │
//! ├──────────────────────────────────────────────┤
//! │  upsert  │  search  │  delete_document │ ... │
//! └──────────────────────────────────────────────┘
//!                 ▲
//!                 │
//!       ┌─────────┴──────────┐
//!       │ InMemoryVectorStore│  (parking_lot RwLock, JSON snapshots)
//!       └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sage::db::vectorstore::{InMemoryVectorStore, VectorStore};
//!
//! let store = InMemoryVectorStore::new(384);
//! store.upsert(&chunks).await?;
//! let hits = store.search(&query_embedding, 10).await?;
//! ```

use crate::types::{AppError, Chunk, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub title: String,
    pub source: Option<String>,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Abstract interface for vector storage backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs.
    fn provider_name(&self) -> &'static str;

    /// Insert or replace chunks by id. Returns the number written.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Top `top_n` chunks by cosine similarity, best first.
    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<VectorCandidate>>;

    /// Remove every chunk of a document. Returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// In-Memory Vector Store
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct VectorSnapshot {
    dimensions: usize,
    chunks: Vec<Chunk>,
}

/// Brute-force cosine store kept in process memory.
#[derive(Clone)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    chunks: Arc<RwLock<HashMap<String, Chunk>>>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            chunks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    /// Write all chunks to a JSON snapshot.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut chunks: Vec<Chunk> = self.chunks.read().values().cloned().collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = VectorSnapshot {
            dimensions: self.dimensions,
            chunks,
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| AppError::Internal(format!("Failed to serialize vector store: {}", e)))?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            AppError::Internal(format!(
                "Failed to write vector snapshot {:?}: {}",
                path.as_ref(),
                e
            ))
        })
    }

    /// Load a snapshot written by [`InMemoryVectorStore::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::NotFound(format!(
                "Vector snapshot {:?} unreadable: {}",
                path.as_ref(),
                e
            ))
        })?;
        let snapshot: VectorSnapshot = serde_json::from_str(&json)
            .map_err(|e| AppError::Internal(format!("Corrupt vector snapshot: {}", e)))?;
        let store = Self::new(snapshot.dimensions);
        {
            let mut chunks = store.chunks.write();
            for chunk in snapshot.chunks {
                chunks.insert(chunk.id.clone(), chunk);
            }
        }
        Ok(store)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        for chunk in chunks {
            if chunk.embedding.len() != self.dimensions {
                return Err(AppError::InvalidInput(format!(
                    "Chunk '{}' has {} dimensions, store expects {}",
                    chunk.id,
                    chunk.embedding.len(),
                    self.dimensions
                )));
            }
        }

        let mut store = self.chunks.write();
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<VectorCandidate>> {
        if embedding.len() != self.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Query embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let store = self.chunks.read();
        let mut results: Vec<VectorCandidate> = store
            .values()
            .map(|chunk| VectorCandidate {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                text: chunk.text.clone(),
                title: chunk.title.clone(),
                source: chunk.source.clone(),
                score: Self::cosine_similarity(embedding, &chunk.embedding),
            })
            .collect();

        // HashMap order is random, so ties fall back to the chunk id
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(top_n);

        Ok(results)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut store = self.chunks.write();
        let before = store.len();
        store.retain(|_, chunk| chunk.document_id != document_id);
        Ok(before - store.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().len())
    }
}
