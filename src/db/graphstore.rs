//! Knowledge graph store.
//!
//! Entities and typed relations extracted during ingestion. Retrieval seeds a
//! breadth-first traversal from the entities a query mentions and scores every
//! relation it crosses by hop distance, so direct neighbours of a query entity
//! outrank facts two hops away. Edges are walked in both directions.

use crate::types::{AppError, GraphEntity, GraphRelation, RelationTriple, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// A relation reached by traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphCandidate {
    pub relation: GraphRelation,
    /// Relation rendered with entity names instead of ids
    pub triple: RelationTriple,
    /// Hops from the nearest seed, starting at 1
    pub hops: usize,
    /// `1 / hops`
    pub score: f32,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Merge entities and relations into the graph. Returns relations added.
    async fn upsert(&self, entities: &[GraphEntity], relations: &[GraphRelation]) -> Result<usize>;

    /// Entities mentioned by a free-text query, sorted by id.
    async fn find_entities(&self, query: &str) -> Result<Vec<GraphEntity>>;

    /// Relations within `max_hops` of the seed entity ids, best first.
    async fn traverse(&self, seeds: &[String], max_hops: usize) -> Result<Vec<GraphCandidate>>;

    /// Remove every relation extracted from a document, along with entities
    /// left without edges. Returns the number of relations removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    async fn entity_count(&self) -> Result<usize>;

    async fn relation_count(&self) -> Result<usize>;
}

/// Lowercased terms longer than three characters with a trailing plural `s`
/// removed. Short words are too ambiguous to seed a traversal.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|t| singular(&t.to_lowercase()))
        .filter(|t| t.chars().count() > 3 && seen.insert(t.clone()))
        .collect()
}

fn singular(word: &str) -> String {
    if word.len() > 4 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// In-Memory Graph Store
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    entities: Vec<GraphEntity>,
    relations: Vec<GraphRelation>,
}

#[derive(Debug, Default)]
struct GraphInner {
    entities: HashMap<String, GraphEntity>,
    relations: Vec<GraphRelation>,
    /// entity id -> indices into `relations`, in insertion order
    adjacency: HashMap<String, Vec<usize>>,
    edge_keys: HashSet<(String, String, String, Option<String>)>,
}

impl GraphInner {
    fn insert_relation(&mut self, relation: &GraphRelation) -> bool {
        let key = (
            relation.subject.clone(),
            relation.predicate.as_str().to_string(),
            relation.object.clone(),
            relation.source_chunk.clone(),
        );
        if !self.edge_keys.insert(key) {
            return false;
        }
        let idx = self.relations.len();
        self.relations.push(relation.clone());
        self.adjacency
            .entry(relation.subject.clone())
            .or_default()
            .push(idx);
        if relation.object != relation.subject {
            self.adjacency
                .entry(relation.object.clone())
                .or_default()
                .push(idx);
        }
        true
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let (removed, kept): (Vec<GraphRelation>, Vec<GraphRelation>) =
            std::mem::take(&mut self.relations)
                .into_iter()
                .partition(|r| r.document_id.as_deref() == Some(document_id));
        if removed.is_empty() {
            self.relations = kept;
            return 0;
        }

        self.adjacency.clear();
        self.edge_keys.clear();
        for relation in &kept {
            self.insert_relation(relation);
        }

        for relation in &removed {
            for endpoint in [&relation.subject, &relation.object] {
                if !self.adjacency.contains_key(endpoint) {
                    self.entities.remove(endpoint);
                }
            }
        }
        removed.len()
    }

    fn name_of(&self, id: &str) -> String {
        self.entities
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    inner: Arc<RwLock<GraphInner>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let inner = self.inner.read();
        let mut entities: Vec<GraphEntity> = inner.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = GraphSnapshot {
            entities,
            relations: inner.relations.clone(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| AppError::Internal(format!("Failed to serialize graph: {}", e)))?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            AppError::Internal(format!(
                "Failed to write graph snapshot {:?}: {}",
                path.as_ref(),
                e
            ))
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::NotFound(format!("Graph snapshot {:?} unreadable: {}", path.as_ref(), e))
        })?;
        let snapshot: GraphSnapshot = serde_json::from_str(&json)
            .map_err(|e| AppError::Internal(format!("Corrupt graph snapshot: {}", e)))?;

        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for entity in snapshot.entities {
                inner.entities.insert(entity.id.clone(), entity);
            }
            for relation in &snapshot.relations {
                inner.insert_relation(relation);
            }
        }
        Ok(store)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn upsert(&self, entities: &[GraphEntity], relations: &[GraphRelation]) -> Result<usize> {
        let mut inner = self.inner.write();
        for entity in entities {
            inner
                .entities
                .entry(entity.id.clone())
                .or_insert_with(|| entity.clone());
        }

        let mut added = 0;
        for relation in relations {
            for endpoint in [&relation.subject, &relation.object] {
                if !inner.entities.contains_key(endpoint) {
                    return Err(AppError::InvalidInput(format!(
                        "Relation references unknown entity '{}'",
                        endpoint
                    )));
                }
            }
            if inner.insert_relation(relation) {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn find_entities(&self, query: &str) -> Result<Vec<GraphEntity>> {
        let normalized_query = format!(" {} ", normalize(query));
        let terms: HashSet<String> = query_terms(query).into_iter().collect();

        let inner = self.inner.read();
        let mut matches: Vec<GraphEntity> = inner
            .entities
            .values()
            .filter(|entity| {
                let name = normalize(&entity.name);
                if name.is_empty() {
                    return false;
                }
                if normalized_query.contains(&format!(" {} ", name)) {
                    return true;
                }
                name.split_whitespace()
                    .map(singular)
                    .any(|token| terms.contains(&token))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn traverse(&self, seeds: &[String], max_hops: usize) -> Result<Vec<GraphCandidate>> {
        let inner = self.inner.read();

        let mut seed_ids: Vec<&String> = seeds
            .iter()
            .filter(|id| inner.entities.contains_key(*id))
            .collect();
        seed_ids.sort();
        seed_ids.dedup();

        let mut distance: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for id in seed_ids {
            distance.insert(id.as_str(), 0);
            queue.push_back(id.as_str());
        }

        // relation index -> hop at which it was first crossed
        let mut reached: Vec<(usize, usize)> = Vec::new();
        let mut seen_edges: HashSet<usize> = HashSet::new();

        while let Some(node) = queue.pop_front() {
            let depth = distance.get(node).copied().unwrap_or(0);
            if depth >= max_hops {
                continue;
            }
            let Some(edges) = inner.adjacency.get(node) else {
                continue;
            };
            for &idx in edges {
                let relation = &inner.relations[idx];
                if seen_edges.insert(idx) {
                    reached.push((idx, depth + 1));
                }
                let other = if relation.subject == node {
                    relation.object.as_str()
                } else {
                    relation.subject.as_str()
                };
                if !distance.contains_key(other) {
                    distance.insert(other, depth + 1);
                    queue.push_back(other);
                }
            }
        }

        reached.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(reached
            .into_iter()
            .map(|(idx, hops)| {
                let relation = inner.relations[idx].clone();
                let triple = RelationTriple {
                    subject: inner.name_of(&relation.subject),
                    predicate: relation.predicate.as_str().to_string(),
                    object: inner.name_of(&relation.object),
                };
                GraphCandidate {
                    relation,
                    triple,
                    hops,
                    score: 1.0 / hops as f32,
                }
            })
            .collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.inner.write().remove_document(document_id);
        if removed > 0 {
            tracing::debug!(
                document = document_id,
                relations = removed,
                "Removed document from graph"
            );
        }
        Ok(removed)
    }

    async fn entity_count(&self) -> Result<usize> {
        Ok(self.inner.read().entities.len())
    }

    async fn relation_count(&self) -> Result<usize> {
        Ok(self.inner.read().relations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKind, RelationKind};

    fn rel(subject: &GraphEntity, predicate: RelationKind, object: &GraphEntity, chunk: &str) -> GraphRelation {
        GraphRelation {
            subject: subject.id.clone(),
            predicate,
            object: object.id.clone(),
            source_chunk: Some(chunk.to_string()),
            document_id: Some("doc".to_string()),
        }
    }

    async fn sample_graph() -> (InMemoryGraphStore, GraphEntity, GraphEntity, GraphEntity) {
        let store = InMemoryGraphStore::new();
        let rnn = GraphEntity::new("RNN", EntityKind::Technology);
        let lstm = GraphEntity::new("LSTM", EntityKind::Technology);
        let forecasting = GraphEntity::new("Forecasting", EntityKind::Topic);
        store
            .upsert(
                &[rnn.clone(), lstm.clone(), forecasting.clone()],
                &[
                    rel(&rnn, RelationKind::RelatedTo, &lstm, "doc#0"),
                    rel(&lstm, RelationKind::Uses, &forecasting, "doc#1"),
                ],
            )
            .await
            .unwrap();
        (store, rnn, lstm, forecasting)
    }

    #[test]
    fn test_query_terms() {
        let terms = query_terms("Compare transformers and RNN architectures");
        assert_eq!(terms, vec!["compare", "transformer", "architecture"]);
    }

    #[tokio::test]
    async fn test_find_entities_by_name_and_term() {
        let (store, rnn, _, forecasting) = sample_graph().await;
        let found = store
            .find_entities("RNN models for time-series forecasting")
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&rnn.id.as_str()));
        assert!(ids.contains(&forecasting.id.as_str()));
    }

    #[tokio::test]
    async fn test_traverse_scores_by_distance() {
        let (store, rnn, _, _) = sample_graph().await;
        let hits = store.traverse(&[rnn.id.clone()], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].hops, 1);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].hops, 2);
        assert_eq!(hits[1].score, 0.5);
        assert_eq!(hits[1].triple.object, "Forecasting");
    }

    #[tokio::test]
    async fn test_traverse_respects_hop_limit() {
        let (store, rnn, _, _) = sample_graph().await;
        let hits = store.traverse(&[rnn.id.clone()], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_seed_yields_nothing() {
        let (store, _, _, _) = sample_graph().await;
        let hits = store.traverse(&["topic:none".to_string()], 2).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_relations_ignored() {
        let (store, rnn, lstm, _) = sample_graph().await;
        let added = store
            .upsert(&[], &[rel(&rnn, RelationKind::RelatedTo, &lstm, "doc#0")])
            .await
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.relation_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_relation_to_unknown_entity_rejected() {
        let store = InMemoryGraphStore::new();
        let a = GraphEntity::new("A thing", EntityKind::Concept);
        let b = GraphEntity::new("B thing", EntityKind::Concept);
        let err = store
            .upsert(&[a.clone()], &[rel(&a, RelationKind::RelatedTo, &b, "x#0")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_delete_document_drops_its_relations() {
        let (store, rnn, lstm, forecasting) = sample_graph().await;
        let gru = GraphEntity::new("GRU", EntityKind::Technology);
        let other = GraphRelation {
            document_id: Some("other".to_string()),
            ..rel(&gru, RelationKind::RelatedTo, &rnn, "other#0")
        };
        store.upsert(&[gru.clone()], &[other]).await.unwrap();

        assert_eq!(store.delete_document("doc").await.unwrap(), 2);
        assert_eq!(store.relation_count().await.unwrap(), 1);
        // rnn keeps an edge from the other document
        let ids: Vec<String> = store
            .find_entities("RNN GRU LSTM forecasting")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert!(ids.contains(&rnn.id));
        assert!(ids.contains(&gru.id));
        assert!(!ids.contains(&lstm.id));
        assert!(!ids.contains(&forecasting.id));

        let hits = store.traverse(&[rnn.id.clone()], 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].relation.source_chunk.as_deref(), Some("other#0"));
        assert_eq!(store.delete_document("doc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let (store, rnn, _, _) = sample_graph().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        store.save(&path).unwrap();

        let loaded = InMemoryGraphStore::load(&path).unwrap();
        assert_eq!(loaded.entity_count().await.unwrap(), 3);
        let hits = loaded.traverse(&[rnn.id], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
