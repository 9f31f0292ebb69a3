use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docqa_common::{Chunk, ChunkMetadata, DocQaError, QueryResult, Result, RetrievedChunk};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::vector_store::DocumentStore;

/// Document store backed by a Qdrant collection using cosine distance.
///
/// Qdrant point ids must be UUIDs or integers, so each point gets a fresh
/// UUID and the chunk id travels in the payload.
pub struct QdrantDocumentStore {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QdrantDocumentStore {
    pub fn new(url: &str, collection: &str, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(Self::map_err)?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            embedder,
        })
    }

    fn map_err(e: impl std::fmt::Display) -> DocQaError {
        DocQaError::VectorStore {
            backend: "qdrant".to_string(),
            message: e.to_string(),
        }
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            info!("Creating Qdrant collection: {}", self.collection);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.embedder.dimensions() as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(Self::map_err)?;
        }

        Ok(())
    }

    fn payload_for(chunk: &Chunk) -> Result<Payload> {
        Payload::try_from(serde_json::json!({
            "chunk_id": chunk.id,
            "text": chunk.text,
            "filename": chunk.metadata.filename,
            "chunk_index": chunk.metadata.chunk_index,
            "total_chunks": chunk.metadata.total_chunks,
        }))
        .map_err(Self::map_err)
    }
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload_usize(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<usize> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
        Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

fn retrieved_from_payload(payload: &HashMap<String, QdrantValue>, score: f32) -> Option<RetrievedChunk> {
    Some(RetrievedChunk {
        id: payload_string(payload, "chunk_id")?,
        text: payload_string(payload, "text")?,
        metadata: ChunkMetadata {
            filename: payload_string(payload, "filename")?,
            chunk_index: payload_usize(payload, "chunk_index")?,
            total_chunks: payload_usize(payload, "total_chunks")?,
        },
        // Qdrant reports cosine similarity for cosine collections.
        distance: 1.0 - score,
    })
}

#[async_trait]
impl DocumentStore for QdrantDocumentStore {
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(DocQaError::Embedding {
                provider: self.embedder.name().to_string(),
                message: format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            points.push(PointStruct::new(
                Uuid::new_v4().to_string(),
                embedding,
                Self::payload_for(chunk)?,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = chunks.len(), "Upserted chunks to Qdrant");
        Ok(())
    }

    async fn search(&self, text: &str, n_results: usize) -> Result<QueryResult> {
        if n_results == 0 {
            return Ok(QueryResult::empty());
        }

        let query_embedding = self.embedder.embed(text).await?;
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_embedding, n_results as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let chunks: Vec<RetrievedChunk> = response
            .result
            .iter()
            .filter_map(|point| retrieved_from_payload(&point.payload, point.score))
            .collect();

        debug!(collection = %self.collection, results = chunks.len(), "Qdrant search complete");
        Ok(QueryResult::new(chunks))
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(Self::map_err)?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    /// Drops and recreates the collection. Not transactional: if recreation
    /// fails the collection is gone until the next successful reset.
    async fn clear(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection.as_str())
            .await
            .map_err(Self::map_err)?;
        self.ensure_collection().await
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}
