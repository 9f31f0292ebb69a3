//! Ingestion and retrieval: PDF text extraction, chunking, embeddings and
//! the document store.

pub mod chunker;
pub mod document_processor;
pub mod embedding;
pub mod qdrant_store;
pub mod semantic_search;
pub mod vector_store;

pub use chunker::TextChunker;
pub use document_processor::DocumentProcessor;
pub use embedding::{create_embedder, EmbeddingConfig, EmbeddingProvider, HashingEmbedder};
pub use semantic_search::{Retrieval, Retriever};
pub use vector_store::{create_store, DocumentStore, InMemoryDocumentStore, StoreConfig};
