//! Hybrid retrieval over the vector and graph stores.
//!
//! Both backends are queried concurrently. Their scores live on different
//! scales (cosine similarity vs. inverse hop distance), so each list is
//! min-max normalized before fusion. Candidates that point at the same
//! provenance are merged into one [`EvidenceItem`].
//!
//! A backend that errors or times out (after one retry) degrades the result
//! to a partial set annotated with the failure. Only when both backends fail
//! does retrieval itself fail.

use crate::db::graphstore::{GraphCandidate, GraphStore};
use crate::db::vectorstore::{VectorCandidate, VectorStore};
use crate::rag::embeddings::Embedder;
use crate::types::{
    AppError, Backend, EvidenceContent, EvidenceItem, FusedEvidenceSet, PartialRetrieval,
    Provenance, Result,
};
use crate::utils::retry::retry_once_with_timeout;
use crate::utils::toml_config::{FusionStrategy, RetrievalConfig};
use arc_swap::ArcSwap;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SCORE_EPSILON: f32 = 1e-6;

/// Min-max normalize scores into [0, 1].
///
/// When every score is equal there is no spread to normalize, and all
/// candidates map to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;
    if spread.abs() < SCORE_EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / spread).collect()
}

/// Reciprocal Rank Fusion.
///
/// Ignores raw scores and uses `weight / (k + rank)` per list, which makes
/// it insensitive to how each backend scales its scores.
#[derive(Debug, Clone)]
pub struct RrfFusion {
    k: f32,
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

impl RrfFusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_k(k: f32) -> Self {
        Self { k }
    }

    /// Fuse ranked key lists. Each input is `(keys best first, weight)`.
    /// Scores are scaled so an item ranked first by every list gets 1.0.
    pub fn fuse(&self, ranked_lists: &[(&[String], f32)]) -> HashMap<String, f32> {
        let mut fused: HashMap<String, f32> = HashMap::new();
        let best: f32 = ranked_lists.iter().map(|(_, w)| w / (self.k + 1.0)).sum();

        for (keys, weight) in ranked_lists {
            for (rank, key) in keys.iter().enumerate() {
                *fused.entry(key.clone()).or_insert(0.0) += weight / (self.k + rank as f32 + 1.0);
            }
        }

        if best > 0.0 {
            for score in fused.values_mut() {
                *score /= best;
            }
        }
        fused
    }
}

/// Per-backend candidates after grouping by provenance and normalizing.
struct Normalized {
    backend: Backend,
    entries: Vec<(String, f32, EvidenceItem)>,
}

fn normalize_vector(candidates: Vec<VectorCandidate>) -> Normalized {
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let normalized = min_max_normalize(&scores);
    let entries = candidates
        .into_iter()
        .zip(normalized)
        .map(|(c, score)| {
            let provenance = Provenance {
                document_id: Some(c.document_id),
                chunk_id: Some(c.chunk_id),
                node_ids: Vec::new(),
                title: Some(c.title),
                source: c.source,
            };
            let item = EvidenceItem {
                sources: vec![Backend::Vector],
                content: EvidenceContent::Span { text: c.text },
                relations: Vec::new(),
                score,
                vector_score: Some(score),
                graph_score: None,
                provenance,
            };
            (item.key(), score, item)
        })
        .collect();
    Normalized {
        backend: Backend::Vector,
        entries,
    }
}

/// Graph candidates sharing a source chunk collapse into one item that
/// keeps the best raw score and all supporting relations.
fn group_graph(candidates: Vec<GraphCandidate>, limit: usize) -> Vec<(String, f32, EvidenceItem)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, (f32, EvidenceItem)> = HashMap::new();

    for candidate in candidates {
        let provenance = Provenance {
            document_id: candidate.relation.document_id.clone(),
            chunk_id: candidate.relation.source_chunk.clone(),
            node_ids: vec![
                candidate.relation.subject.clone(),
                candidate.relation.object.clone(),
            ],
            title: None,
            source: None,
        };
        let key = provenance.key();
        match grouped.get_mut(&key) {
            Some((best, item)) => {
                if candidate.score > *best {
                    *best = candidate.score;
                }
                if !item.relations.contains(&candidate.triple) {
                    item.relations.push(candidate.triple);
                }
                for node in provenance.node_ids {
                    if !item.provenance.node_ids.contains(&node) {
                        item.provenance.node_ids.push(node);
                    }
                }
            }
            None => {
                let item = EvidenceItem {
                    sources: vec![Backend::Graph],
                    content: EvidenceContent::Relation(candidate.triple.clone()),
                    relations: vec![candidate.triple],
                    score: candidate.score,
                    vector_score: None,
                    graph_score: None,
                    provenance,
                };
                order.push(key.clone());
                grouped.insert(key, (candidate.score, item));
            }
        }
    }

    let mut entries: Vec<(String, f32, EvidenceItem)> = order
        .into_iter()
        .filter_map(|key| {
            let (score, item) = grouped.remove(&key)?;
            Some((key, score, item))
        })
        .collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.truncate(limit);
    entries
}

fn normalize_graph(candidates: Vec<GraphCandidate>, limit: usize) -> Normalized {
    let grouped = group_graph(candidates, limit);
    let scores: Vec<f32> = grouped.iter().map(|(_, s, _)| *s).collect();
    let normalized = min_max_normalize(&scores);
    let entries = grouped
        .into_iter()
        .zip(normalized)
        .map(|((key, _, mut item), score)| {
            item.score = score;
            item.graph_score = Some(score);
            (key, score, item)
        })
        .collect();
    Normalized {
        backend: Backend::Graph,
        entries,
    }
}

/// Merge two normalized lists into one item per provenance key.
fn merge(lists: Vec<Normalized>) -> HashMap<String, EvidenceItem> {
    let mut merged: HashMap<String, EvidenceItem> = HashMap::new();
    for list in lists {
        for (key, score, item) in list.entries {
            match merged.get_mut(&key) {
                Some(existing) => {
                    if !existing.sources.contains(&list.backend) {
                        existing.sources.push(list.backend);
                        existing.sources.sort();
                    }
                    match list.backend {
                        Backend::Vector => {
                            existing.vector_score = Some(score);
                            // chunk text beats a bare triple
                            existing.content = item.content;
                            existing.provenance.title = item.provenance.title;
                            existing.provenance.source = item.provenance.source;
                        }
                        Backend::Graph => {
                            existing.graph_score = Some(score);
                            for relation in item.relations {
                                if !existing.relations.contains(&relation) {
                                    existing.relations.push(relation);
                                }
                            }
                            existing.provenance.node_ids = item.provenance.node_ids;
                        }
                    }
                }
                None => {
                    merged.insert(key, item);
                }
            }
        }
    }
    merged
}

/// Fuse per-backend candidates into a ranked, deduplicated evidence list.
///
/// `None` means the backend failed. Output order is fused score descending,
/// ties broken by provenance key ascending, so identical inputs always give
/// identical output.
pub fn fuse_candidates(
    vector: Option<Vec<VectorCandidate>>,
    graph: Option<Vec<GraphCandidate>>,
    config: &RetrievalConfig,
    k: usize,
) -> Vec<EvidenceItem> {
    let vector_ok = vector.is_some();
    let graph_ok = graph.is_some();

    let mut lists = Vec::new();
    if let Some(candidates) = vector {
        lists.push(normalize_vector(candidates));
    }
    if let Some(candidates) = graph {
        lists.push(normalize_graph(candidates, config.candidates_per_backend));
    }

    let rrf_scores = match config.strategy {
        FusionStrategy::Rrf => {
            let ranked: Vec<(Vec<String>, f32)> = lists
                .iter()
                .map(|list| {
                    let weight = match list.backend {
                        Backend::Vector => config.vector_weight,
                        Backend::Graph => config.graph_weight,
                    };
                    (list.entries.iter().map(|(k, _, _)| k.clone()).collect(), weight)
                })
                .collect();
            let borrowed: Vec<(&[String], f32)> =
                ranked.iter().map(|(keys, w)| (keys.as_slice(), *w)).collect();
            Some(RrfFusion::new().fuse(&borrowed))
        }
        FusionStrategy::Weighted => None,
    };

    let merged = merge(lists);
    let total_weight = config.vector_weight + config.graph_weight;

    let mut items: Vec<EvidenceItem> = merged
        .into_iter()
        .map(|(key, mut item)| {
            item.score = match &rrf_scores {
                Some(scores) => scores.get(&key).cloned().unwrap_or(0.0),
                None if vector_ok && graph_ok && total_weight > 0.0 => {
                    (config.vector_weight * item.vector_score.unwrap_or(0.0)
                        + config.graph_weight * item.graph_score.unwrap_or(0.0))
                        / total_weight
                }
                // one backend left, its normalized score stands alone
                None => item.vector_score.or(item.graph_score).unwrap_or(0.0),
            };
            item
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key().cmp(&b.key()))
    });
    items.truncate(k);
    items
}

/// Queries both stores and fuses their results.
///
/// The retrieval settings sit behind an [`ArcSwap`] so weights, strategy and
/// budgets can change between calls. Each `retrieve` reads one snapshot.
pub struct HybridFusionEngine {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    config: ArcSwap<RetrievalConfig>,
}

impl HybridFusionEngine {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vector,
            graph,
            embedder,
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Current retrieval settings.
    pub fn config(&self) -> Arc<RetrievalConfig> {
        self.config.load_full()
    }

    /// Replace the retrieval settings. Calls already in progress keep the
    /// settings they started with.
    pub fn set_config(&self, config: RetrievalConfig) {
        tracing::debug!(
            vector_weight = config.vector_weight,
            graph_weight = config.graph_weight,
            strategy = ?config.strategy,
            top_k = config.top_k,
            "Retrieval settings updated"
        );
        self.config.store(Arc::new(config));
    }

    async fn vector_candidates(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<VectorCandidate>> {
        let top_n = config.candidates_per_backend;
        retry_once_with_timeout(
            "vector search",
            Duration::from_millis(config.backend_timeout_ms),
            Duration::from_millis(config.retry_backoff_ms),
            || async move {
                let embedding = self.embedder.embed_query(query).await?;
                self.vector.search(&embedding, top_n).await
            },
        )
        .await
    }

    async fn graph_candidates(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<GraphCandidate>> {
        let max_hops = config.max_hops;
        retry_once_with_timeout(
            "graph traversal",
            Duration::from_millis(config.backend_timeout_ms),
            Duration::from_millis(config.retry_backoff_ms),
            || async move {
                let seeds: Vec<String> = self
                    .graph
                    .find_entities(query)
                    .await?
                    .into_iter()
                    .map(|e| e.id)
                    .collect();
                if seeds.is_empty() {
                    return Ok(Vec::new());
                }
                self.graph.traverse(&seeds, max_hops).await
            },
        )
        .await
    }

    /// Retrieve the top `k` fused evidence items for `query`.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<FusedEvidenceSet> {
        let config = self.config.load_full();
        let (vector, graph) = tokio::join!(
            self.vector_candidates(query, &config),
            self.graph_candidates(query, &config)
        );

        let partial = match (&vector, &graph) {
            (Err(v), Err(g)) => {
                tracing::warn!(vector = %v, graph = %g, "Both retrieval backends failed");
                return Err(AppError::RetrievalUnavailable(format!(
                    "vector: {}; graph: {}",
                    v, g
                )));
            }
            (Err(e), Ok(_)) => Some(PartialRetrieval {
                failed_backend: Backend::Vector,
                reason: e.to_string(),
            }),
            (Ok(_), Err(e)) => Some(PartialRetrieval {
                failed_backend: Backend::Graph,
                reason: e.to_string(),
            }),
            (Ok(_), Ok(_)) => None,
        };

        if let Some(p) = &partial {
            tracing::warn!(
                backend = %p.failed_backend,
                reason = %p.reason,
                "Retrieval degraded to a single backend"
            );
        }

        let items = fuse_candidates(vector.ok(), graph.ok(), &config, k);
        tracing::debug!(
            query = query,
            items = items.len(),
            partial = partial.is_some(),
            "Fused retrieval results"
        );

        Ok(FusedEvidenceSet {
            query: query.to_string(),
            items,
            partial,
        })
    }
}
