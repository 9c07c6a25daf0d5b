use crate::db::graphstore::GraphStore;
use crate::db::vectorstore::VectorStore;
use crate::rag::chunker::TextChunker;
use crate::rag::embeddings::Embedder;
use crate::rag::entities::{EntityExtractor, ExtractedEntities};
use crate::types::{
    AppError, Chunk, EntityKind, GraphEntity, GraphRelation, RawDocument, RelationKind, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Cap on RELATED_TO edges per chunk. Co-occurrence grows quadratically and
/// long chunks would otherwise flood the graph.
const MAX_RELATED_PER_CHUNK: usize = 6;

/// Summary of one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relation_count: usize,
}

/// Chunks, embeds and graphs documents into the two retrieval stores.
pub struct IndexingPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
}

/// Entities and relations collected for one document before the upsert.
#[derive(Default)]
struct GraphBatch {
    entities: BTreeMap<String, GraphEntity>,
    relations: Vec<GraphRelation>,
    seen: HashSet<(String, RelationKind, String, Option<String>)>,
}

impl GraphBatch {
    fn entity(&mut self, name: &str, kind: EntityKind) -> String {
        let entity = GraphEntity::new(name.trim(), kind);
        let id = entity.id.clone();
        self.entities.entry(id.clone()).or_insert(entity);
        id
    }

    fn relate(
        &mut self,
        subject: &str,
        predicate: RelationKind,
        object: &str,
        chunk: Option<&str>,
        document_id: &str,
    ) {
        if subject == object {
            return;
        }
        let key = (
            subject.to_string(),
            predicate,
            object.to_string(),
            chunk.map(String::from),
        );
        if !self.seen.insert(key) {
            return;
        }
        self.relations.push(GraphRelation {
            subject: subject.to_string(),
            predicate,
            object: object.to_string(),
            source_chunk: chunk.map(String::from),
            document_id: Some(document_id.to_string()),
        });
    }
}

impl IndexingPipeline {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            extractor,
            vector,
            graph,
        }
    }

    /// Index a document. Re-ingesting the same document id replaces its
    /// chunks and the graph relations extracted from them. Entities shared
    /// with other documents are kept.
    pub async fn ingest(&self, document: &RawDocument) -> Result<IngestReport> {
        let texts = self.chunker.chunk(&document.text);
        if texts.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Document '{}' has no text to index",
                document.title
            )));
        }

        let embeddings = self.embedder.embed_documents(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::Internal(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let chunks: Vec<Chunk> = texts
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| Chunk {
                id: Chunk::chunk_id(&document.id, index),
                document_id: document.id.clone(),
                index,
                text: text.clone(),
                title: document.title.clone(),
                source: document.source.clone(),
                embedding,
            })
            .collect();

        let mut batch = GraphBatch::default();
        let article = batch.entity(&document.title, EntityKind::Article);
        let first_chunk = chunks.first().map(|c| c.id.clone());

        for author in &document.authors {
            let author_id = batch.entity(author, EntityKind::Author);
            batch.relate(
                &article,
                RelationKind::WrittenBy,
                &author_id,
                first_chunk.as_deref(),
                &document.id,
            );
        }

        for chunk in &chunks {
            let extracted = self.extractor.extract(&chunk.text).await?;
            tracing::trace!(
                chunk = %chunk.id,
                entities = extracted.total(),
                "Extracted entities"
            );
            Self::link_chunk(&mut batch, &article, chunk, &extracted);
        }

        self.vector.delete_document(&document.id).await?;
        self.graph.delete_document(&document.id).await?;
        let chunk_count = self.vector.upsert(&chunks).await?;

        let entities: Vec<GraphEntity> = batch.entities.into_values().collect();
        self.graph.upsert(&entities, &batch.relations).await?;

        let report = IngestReport {
            document_id: document.id.clone(),
            title: document.title.clone(),
            chunk_count,
            entity_count: entities.len(),
            relation_count: batch.relations.len(),
        };
        tracing::info!(
            document = %report.document_id,
            chunks = report.chunk_count,
            entities = report.entity_count,
            relations = report.relation_count,
            "Indexed document"
        );
        Ok(report)
    }

    fn link_chunk(
        batch: &mut GraphBatch,
        article: &str,
        chunk: &Chunk,
        extracted: &ExtractedEntities,
    ) {
        let chunk_id = Some(chunk.id.as_str());
        let doc = chunk.document_id.as_str();

        for author in &extracted.authors {
            let id = batch.entity(author, EntityKind::Author);
            batch.relate(article, RelationKind::WrittenBy, &id, chunk_id, doc);
        }
        for topic in &extracted.topics {
            let id = batch.entity(topic, EntityKind::Topic);
            batch.relate(article, RelationKind::AboutTopic, &id, chunk_id, doc);
        }

        let technologies: Vec<String> = extracted
            .technologies
            .iter()
            .map(|t| batch.entity(t, EntityKind::Technology))
            .collect();
        let companies: Vec<String> = extracted
            .companies
            .iter()
            .map(|c| batch.entity(c, EntityKind::Company))
            .collect();
        let concepts: Vec<String> = extracted
            .concepts
            .iter()
            .map(|c| batch.entity(c, EntityKind::Concept))
            .collect();

        for tech in &technologies {
            batch.relate(article, RelationKind::Uses, tech, chunk_id, doc);
            for company in &companies {
                batch.relate(tech, RelationKind::DevelopedBy, company, chunk_id, doc);
            }
        }
        for id in companies.iter().chain(concepts.iter()) {
            batch.relate(article, RelationKind::Mentions, id, chunk_id, doc);
        }

        let co_occurring: Vec<&String> = technologies.iter().chain(concepts.iter()).collect();
        let mut related = 0;
        'outer: for (i, a) in co_occurring.iter().enumerate() {
            for b in co_occurring.iter().skip(i + 1) {
                if related >= MAX_RELATED_PER_CHUNK {
                    break 'outer;
                }
                batch.relate(a, RelationKind::RelatedTo, b, chunk_id, doc);
                related += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::graphstore::InMemoryGraphStore;
    use crate::db::vectorstore::InMemoryVectorStore;
    use crate::rag::embeddings::HashingEmbedder;
    use crate::rag::entities::HeuristicEntityExtractor;

    fn pipeline() -> (IndexingPipeline, Arc<InMemoryVectorStore>, Arc<InMemoryGraphStore>) {
        let vector = Arc::new(InMemoryVectorStore::new(64));
        let graph = Arc::new(InMemoryGraphStore::new());
        let pipeline = IndexingPipeline::new(
            TextChunker::new(200, 20).unwrap(),
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(HeuristicEntityExtractor::new()),
            vector.clone(),
            graph.clone(),
        );
        (pipeline, vector, graph)
    }

    #[tokio::test]
    async fn test_ingest_populates_both_stores() {
        let (pipeline, vector, graph) = pipeline();
        let doc = RawDocument::new(
            "Recurrent Networks",
            "An RNN processes sequences step by step. Google researchers used LSTM cells \
             for time-series forecasting.",
        )
        .with_id("rnn")
        .with_authors(vec!["Ada Lovelace".to_string()]);

        let report = pipeline.ingest(&doc).await.unwrap();
        assert_eq!(report.document_id, "rnn");
        assert!(report.chunk_count >= 1);
        assert_eq!(vector.count().await.unwrap(), report.chunk_count);
        assert!(report.relation_count > 0);
        assert_eq!(graph.relation_count().await.unwrap(), report.relation_count);

        let found = graph.find_entities("lstm").await.unwrap();
        assert!(found.iter().any(|e| e.id == "technology:lstm"));
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let (pipeline, vector, _) = pipeline();
        let doc = RawDocument::new("Doc", "Some text about forecasting.").with_id("d1");
        pipeline.ingest(&doc).await.unwrap();
        pipeline.ingest(&doc).await.unwrap();
        assert_eq!(vector.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reingest_replaces_graph_relations() {
        let (pipeline, _, graph) = pipeline();
        let first = RawDocument::new("Notes", "The LSTM architecture adds gates to the RNN.")
            .with_id("doc");
        pipeline.ingest(&first).await.unwrap();
        assert!(!graph.find_entities("LSTM").await.unwrap().is_empty());

        let second = RawDocument::new("Notes", "Gardening tips for tomatoes in spring.")
            .with_id("doc");
        let report = pipeline.ingest(&second).await.unwrap();

        assert!(graph.find_entities("LSTM").await.unwrap().is_empty());
        assert_eq!(graph.relation_count().await.unwrap(), report.relation_count);
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let (pipeline, _, _) = pipeline();
        let doc = RawDocument::new("Empty", "   ");
        assert!(matches!(
            pipeline.ingest(&doc).await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
