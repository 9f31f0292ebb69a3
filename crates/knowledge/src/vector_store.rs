use std::sync::Arc;

use async_trait::async_trait;
use docqa_common::{Chunk, DocQaError, QueryResult, Result, RetrievedChunk};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::qdrant_store::QdrantDocumentStore;

pub const DEFAULT_COLLECTION: &str = "document_chunks";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Chunk index with similarity search.
///
/// Backends implement the fallible primitives; `add`, `query` and `reset`
/// carry the contract callers rely on: a failed query reads as "no results"
/// and a failed reset reads as `false`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists chunks that already carry ids and metadata.
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Returns up to `n_results` chunks ordered closest first.
    async fn search(&self, text: &str, n_results: usize) -> Result<QueryResult>;

    async fn count(&self) -> Result<usize>;

    /// Removes every chunk. The store stays usable afterwards.
    async fn clear(&self) -> Result<()>;

    fn backend(&self) -> &'static str;

    /// Stores the chunks of one document and returns their ids.
    async fn add(&self, filename: &str, texts: Vec<String>) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = Chunk::for_document(filename, texts);
        let ids = chunks.iter().map(|c| c.id.clone()).collect();
        self.insert(chunks).await?;
        Ok(ids)
    }

    async fn query(&self, text: &str, n_results: usize) -> QueryResult {
        match self.search(text, n_results).await {
            Ok(result) => result,
            Err(e) => {
                warn!(backend = self.backend(), error = %e, "Query failed, returning no results");
                QueryResult::empty()
            }
        }
    }

    async fn reset(&self) -> bool {
        match self.clear().await {
            Ok(()) => {
                info!(backend = self.backend(), "Document store cleared");
                true
            }
            Err(e) => {
                error!(backend = self.backend(), error = %e, "Failed to clear document store");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

pub async fn create_store(
    config: &StoreConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new(embedder)))
        }
        StoreBackend::Qdrant => {
            info!(url = %config.qdrant_url, collection = %config.collection, "Using Qdrant document store");
            let store = QdrantDocumentStore::new(&config.qdrant_url, &config.collection, embedder)?;
            store.ensure_collection().await?;
            Ok(Arc::new(store))
        }
    }
}

/// `1 - cosine similarity`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Process-local store. Chunks are kept in insertion order, which breaks
/// ties between equally distant results.
pub struct InMemoryDocumentStore {
    embedder: Arc<dyn EmbeddingProvider>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryDocumentStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(DocQaError::VectorStore {
                backend: self.backend().to_string(),
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let mut stored = self.chunks.write().await;
        let added = chunks.len();
        stored.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| StoredChunk { chunk, embedding }),
        );

        debug!(added, total = stored.len(), "Inserted chunks");
        Ok(())
    }

    async fn search(&self, text: &str, n_results: usize) -> Result<QueryResult> {
        if n_results == 0 || self.chunks.read().await.is_empty() {
            return Ok(QueryResult::empty());
        }

        let query_embedding = self.embedder.embed(text).await?;
        let stored = self.chunks.read().await;

        let mut scored: Vec<RetrievedChunk> = stored
            .iter()
            .map(|entry| RetrievedChunk {
                id: entry.chunk.id.clone(),
                text: entry.chunk.text.clone(),
                metadata: entry.chunk.metadata.clone(),
                distance: cosine_distance(&entry.embedding, &query_embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(n_results);

        debug!(results = scored.len(), "In-memory search complete");
        Ok(QueryResult::new(scored))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.write().await.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(128)))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(DocQaError::Embedding {
                provider: "broken".to_string(),
                message: "service unavailable".to_string(),
            })
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_add_increases_count() {
        let store = store();
        assert_eq!(store.count().await.unwrap(), 0);

        let ids = store
            .add("a.pdf", texts(&["one", "two", "three"]))
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.count().await.unwrap(), 3);

        store.add("a.pdf", texts(&["four", "five"])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_add_nothing_is_noop() {
        let store = store();
        let ids = store.add("a.pdf", Vec::new()).await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_empties_store_and_stays_usable() {
        let store = store();
        store.add("a.pdf", texts(&["one", "two"])).await.unwrap();

        assert!(store.reset().await);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query("one", 5).await.is_empty());

        store.add("b.pdf", texts(&["three"])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = store();
        let result = store.query("anything", 5).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_all_chunks_of_small_document() {
        let store = store();
        store
            .add(
                "manual.pdf",
                texts(&[
                    "Install the device on a flat surface.",
                    "Connect the power cable.",
                    "Press the green button to start.",
                ]),
            )
            .await
            .unwrap();

        let result = store.query("how do I start the device", 10).await;
        assert_eq!(result.len(), 3);

        let mut indexes: Vec<usize> = result
            .chunks
            .iter()
            .map(|c| c.metadata.chunk_index)
            .collect();
        indexes.sort();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(result
            .chunks
            .iter()
            .all(|c| c.metadata.filename == "manual.pdf" && c.metadata.total_chunks == 3));
    }

    #[tokio::test]
    async fn test_query_ranks_closest_first_and_limits() {
        let store = store();
        store
            .add(
                "notes.pdf",
                texts(&[
                    "Penguins live in Antarctica and eat fish.",
                    "The invoice payment is due within thirty days.",
                    "Mountains are tall and covered in snow.",
                ]),
            )
            .await
            .unwrap();

        let result = store.query("when is the invoice payment due", 2).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result.chunks[0].metadata.chunk_index, 1);
        assert!(result.chunks[0].distance <= result.chunks[1].distance);
    }

    #[tokio::test]
    async fn test_query_failure_returns_empty() {
        let store = InMemoryDocumentStore::new(Arc::new(BrokenEmbedder));
        store
            .insert(Chunk::for_document("a.pdf", texts(&["one"])))
            .await
            .unwrap_err();

        // Seed directly so the store is non-empty while the embedder fails.
        store.chunks.write().await.push(StoredChunk {
            chunk: Chunk::for_document("a.pdf", texts(&["one"])).remove(0),
            embedding: vec![1.0; 8],
        });

        assert!(store.search("one", 5).await.is_err());
        assert!(store.query("one", 5).await.is_empty());
    }

    #[test]
    fn test_cosine_distance() {
        assert!((cosine_distance(&[1.0, 0.0], &[1.0, 0.0])).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
