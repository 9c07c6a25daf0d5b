use crate::rag::fusion::HybridFusionEngine;
use crate::types::{FusedEvidenceSet, Result, TaskNode};
use std::sync::Arc;

/// Answers tasks from the local knowledge base through hybrid retrieval.
///
/// The result budget is the engine's `top_k`, read on every call.
pub struct RetrievalAgent {
    engine: Arc<HybridFusionEngine>,
}

impl RetrievalAgent {
    pub fn new(engine: Arc<HybridFusionEngine>) -> Self {
        Self { engine }
    }

    pub fn top_k(&self) -> usize {
        self.engine.config().top_k.max(1)
    }

    pub fn engine(&self) -> &Arc<HybridFusionEngine> {
        &self.engine
    }

    #[tracing::instrument(skip(self, task), fields(task = %task.id))]
    pub async fn execute(&self, task: &TaskNode) -> Result<FusedEvidenceSet> {
        self.execute_with_k(task, self.top_k()).await
    }

    /// Like [`execute`](Self::execute) with an explicit result budget.
    pub async fn execute_with_k(&self, task: &TaskNode, k: usize) -> Result<FusedEvidenceSet> {
        let evidence = self.engine.retrieve(&task.description, k.max(1)).await?;
        tracing::debug!(
            items = evidence.len(),
            partial = evidence.is_partial(),
            "Retrieval finished"
        );
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GraphStore, InMemoryGraphStore, InMemoryVectorStore, VectorStore};
    use crate::rag::embeddings::{Embedder, HashingEmbedder};
    use crate::types::{Chunk, TaskAgent};
    use crate::utils::toml_config::RetrievalConfig;

    async fn sequence_engine(top_k: usize) -> Arc<HybridFusionEngine> {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let vector = Arc::new(InMemoryVectorStore::new(64));
        let texts = [
            "LSTM networks model long sequences",
            "GRU networks are a lighter recurrent unit",
            "Transformers rely on attention",
        ];
        let embeddings = embedder
            .embed_documents(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let chunks: Vec<Chunk> = texts
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| Chunk {
                id: Chunk::chunk_id("doc", i),
                document_id: "doc".to_string(),
                index: i,
                text: text.to_string(),
                title: "Sequence models".to_string(),
                source: None,
                embedding,
            })
            .collect();
        vector.upsert(&chunks).await.unwrap();

        Arc::new(HybridFusionEngine::new(
            vector as Arc<dyn VectorStore>,
            Arc::new(InMemoryGraphStore::new()) as Arc<dyn GraphStore>,
            embedder as Arc<dyn Embedder>,
            RetrievalConfig {
                top_k,
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_execute_respects_k() {
        let agent = RetrievalAgent::new(sequence_engine(2).await);
        let task = TaskNode::new("t1", "recurrent networks", TaskAgent::Retrieval);

        let evidence = agent.execute(&task).await.unwrap();
        assert!(evidence.len() <= 2);
        assert!(!evidence.is_empty());
        assert!(!evidence.is_partial());
    }

    #[tokio::test]
    async fn test_budget_follows_engine_settings() {
        let agent = RetrievalAgent::new(sequence_engine(1).await);
        let task = TaskNode::new("t1", "recurrent networks", TaskAgent::Retrieval);
        assert_eq!(agent.execute(&task).await.unwrap().len(), 1);

        agent.engine().set_config(RetrievalConfig {
            top_k: 3,
            ..Default::default()
        });

        assert_eq!(agent.top_k(), 3);
        assert_eq!(agent.execute(&task).await.unwrap().len(), 3);
    }
}
