use crate::types::{AppError, Result};
use crate::utils::toml_config::{EmbeddingBackend, IngestionConfig};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Turns text into dense vectors for the vector store.
///
/// Documents and queries are embedded through separate methods because some
/// models expect different instruction prefixes for each side.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder selected in `[ingestion]`, wrapped in a query cache.
pub fn embedder_from_config(config: &IngestionConfig) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.embedding {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.dimensions)),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::FastEmbed => Arc::new(FastEmbedder::new(
            config.document_prefix.clone(),
            config.query_prefix.clone(),
        )?),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::FastEmbed => {
            return Err(AppError::Configuration(
                "fastembed embeddings require the `local-embeddings` feature".to_string(),
            ))
        }
    };
    Ok(Arc::new(CachedEmbedder::new(inner, config.query_cache_size)))
}

// ============================================================================
// Feature hashing
// ============================================================================

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Unigrams and adjacent bigrams are hashed (FNV-1a) into a fixed number of
/// signed buckets and the result is L2-normalized. No model download, and the
/// same text always maps to the same vector, which keeps retrieval
/// reproducible in tests.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in bytes {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| {
                let t = t.to_lowercase();
                if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
                    t[..t.len() - 1].to_string()
                } else {
                    t
                }
            })
            .collect()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokens(text);

        let mut add = |feature: &str, weight: f32| {
            let hash = Self::fnv1a(feature.as_bytes());
            let idx = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign * weight;
        };

        for token in &tokens {
            add(token, 1.0);
        }
        for pair in tokens.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

// ============================================================================
// fastembed
// ============================================================================

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    /// ONNX sentence embeddings (BGE small, 384 dimensions).
    pub struct FastEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
        document_prefix: String,
        query_prefix: String,
    }

    impl FastEmbedder {
        pub fn new(document_prefix: String, query_prefix: String) -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(true),
            )
            .map_err(|e| AppError::Internal(format!("Failed to load embedding model: {}", e)))?;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                document_prefix,
                query_prefix,
            })
        }

        async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            tokio::task::spawn_blocking(move || {
                let mut model = model.lock();
                model
                    .embed(texts, None)
                    .map_err(|e| AppError::Internal(format!("Embedding failed: {}", e)))
            })
            .await
            .map_err(|e| AppError::Internal(format!("Embedding task panicked: {}", e)))?
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn dimensions(&self) -> usize {
            384
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let prefixed = texts
                .iter()
                .map(|t| format!("{}{}", self.document_prefix, t))
                .collect();
            self.run(prefixed).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            let mut vectors = self.run(vec![format!("{}{}", self.query_prefix, text)]).await?;
            vectors
                .pop()
                .ok_or_else(|| AppError::Internal("Embedding model returned nothing".to_string()))
        }
    }
}

// ============================================================================
// Query cache
// ============================================================================

/// Caches query embeddings; research runs tend to repeat sub-queries.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl CachedEmbedder {
    /// A capacity of zero disables caching.
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            cache: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(text) {
                return Ok(hit.clone());
            }
        }
        let vector = self.inner.embed_query(text).await?;
        if let Some(cache) = &self.cache {
            cache.lock().put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }
}
