use std::sync::Arc;

use docqa_common::QueryResult;
use tracing::{debug, warn};

use crate::vector_store::DocumentStore;

pub const DEFAULT_N_RESULTS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub result: QueryResult,
    /// Set when the store could not be searched; the result is then empty.
    pub warning: Option<String>,
}

/// Fetches the context chunks for a question.
///
/// Calls `search` rather than the store's `query` so a failure can be
/// reported as a warning; the chunks returned are the same either way.
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    n_results: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            n_results: DEFAULT_N_RESULTS,
        }
    }

    pub fn with_n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }

    pub fn n_results(&self) -> usize {
        self.n_results
    }

    pub async fn retrieve(&self, question: &str) -> Retrieval {
        match self.store.search(question, self.n_results).await {
            Ok(result) => {
                debug!(matches = result.len(), "Retrieved chunks");
                Retrieval {
                    result,
                    warning: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing with no context");
                Retrieval {
                    result: QueryResult::empty(),
                    warning: Some(format!("Query failed: {}", e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::vector_store::InMemoryDocumentStore;
    use async_trait::async_trait;
    use docqa_common::{Chunk, DocQaError, Result};

    struct UnreachableStore;

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn insert(&self, _chunks: Vec<Chunk>) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _text: &str, _n_results: usize) -> Result<QueryResult> {
            Err(DocQaError::VectorStore {
                backend: "test".to_string(),
                message: "connection refused".to_string(),
            })
        }

        async fn count(&self) -> Result<usize> {
            Ok(1)
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "test"
        }
    }

    #[tokio::test]
    async fn test_default_returns_at_most_five() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(64))));
        let texts = (0..8).map(|i| format!("section {} of the report", i)).collect();
        store.add("report.pdf", texts).await.unwrap();

        let retriever = Retriever::new(store);
        assert_eq!(retriever.n_results(), DEFAULT_N_RESULTS);

        let retrieval = retriever.retrieve("report section").await;
        assert_eq!(retrieval.result.len(), 5);
        assert!(retrieval.warning.is_none());
    }

    #[tokio::test]
    async fn test_configured_result_count() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(64))));
        let texts = (0..4).map(|i| format!("paragraph {}", i)).collect();
        store.add("doc.pdf", texts).await.unwrap();

        let retrieval = Retriever::new(store).with_n_results(2).retrieve("paragraph").await;
        assert_eq!(retrieval.result.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_matches_tolerated() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(64))));
        let retrieval = Retriever::new(store).retrieve("anything").await;
        assert!(retrieval.result.is_empty());
        assert!(retrieval.warning.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_becomes_warning() {
        let retrieval = Retriever::new(Arc::new(UnreachableStore))
            .retrieve("anything")
            .await;
        assert!(retrieval.result.is_empty());
        let warning = retrieval.warning.unwrap();
        assert!(warning.starts_with("Query failed:"));
        assert!(warning.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_retrieve_agrees_with_store_query() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(64))));
        let texts = (0..7).map(|i| format!("clause {} of the lease", i)).collect();
        store.add("lease.pdf", texts).await.unwrap();

        let retrieval = Retriever::new(store.clone()).retrieve("lease clause").await;
        assert_eq!(retrieval.result, store.query("lease clause", DEFAULT_N_RESULTS).await);

        let unreachable = Arc::new(UnreachableStore);
        let retrieval = Retriever::new(unreachable.clone()).retrieve("lease").await;
        assert_eq!(retrieval.result, unreachable.query("lease", DEFAULT_N_RESULTS).await);
    }
}
