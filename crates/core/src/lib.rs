pub mod config;
pub mod generator;
pub mod session;

use docqa_common::{DocQaError, Result};
use docqa_knowledge::{create_embedder, create_store, DocumentStore, Retriever, TextChunker};
use std::sync::Arc;
use tracing::info;

pub use config::AppConfig;
pub use generator::{AnswerGenerator, ChatModel, OpenAiChatModel};
pub use session::{AskOutcome, AskStream, SessionController, SessionState, UploadOutcome};

/// Session context: the store and the model client, built once at startup
/// and handed to every request through the controller.
pub struct DocQaCore {
    pub session: Arc<SessionController>,
    pub store: Arc<dyn DocumentStore>,
    pub model_name: String,
}

impl DocQaCore {
    pub async fn new(config: AppConfig, api_key: Option<String>) -> Result<Self> {
        config.validate()?;

        let api_key = api_key.ok_or_else(|| {
            DocQaError::Configuration(
                "GEMINI_API_KEY (or OPENAI_API_KEY) must be set in the environment".to_string(),
            )
        })?;

        let embedder = create_embedder(&config.embedding, Some(api_key.as_str()))?;
        let store = create_store(&config.store, embedder).await?;

        let model = OpenAiChatModel::new(&api_key, &config.generation.api_base)
            .with_model(config.generation.model.clone())
            .with_temperature(config.generation.temperature);

        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

        Ok(Self::from_parts(
            chunker,
            store,
            Arc::new(model),
            config.retrieval.n_results,
        ))
    }

    pub fn from_parts(
        chunker: TextChunker,
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn ChatModel>,
        n_results: usize,
    ) -> Self {
        let model_name = model.model_name();
        let retriever = Retriever::new(store.clone()).with_n_results(n_results);
        let generator = AnswerGenerator::new(model);
        let session = Arc::new(SessionController::new(
            chunker,
            store.clone(),
            retriever,
            generator,
        ));

        info!(
            backend = store.backend(),
            model = %model_name,
            n_results,
            "Document Q&A core ready"
        );

        Self {
            session,
            store,
            model_name,
        }
    }

    pub fn session(&self) -> Arc<SessionController> {
        self.session.clone()
    }

    pub async fn shutdown(&self) -> Result<()> {
        let chunks = self.session.chunk_count().await;
        info!(
            backend = self.store.backend(),
            chunks, "Shutting down document Q&A core"
        );
        Ok(())
    }
}
