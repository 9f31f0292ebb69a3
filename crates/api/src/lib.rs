pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

use axum::Json;
use docqa_common::ApiResponse;
use docqa_core::DocQaCore;
use std::sync::Arc;

pub use server::ApiServer;

// Re-export common types
pub use docqa_common;
pub use docqa_core;

/// Server settings come straight from the application configuration.
pub use docqa_core::config::ServerConfig as ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<DocQaCore>,
}

impl AppState {
    pub fn new(core: Arc<DocQaCore>) -> Self {
        Self { core }
    }
}

// Health check response
#[derive(serde::Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub store: String,
    pub model: String,
}

pub fn create_success_response<T: serde::Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

pub fn create_error_response(message: String) -> Json<ApiResponse<()>> {
    Json(ApiResponse::error(message))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use docqa_common::Result;
    use docqa_core::generator::{ChatModel, FragmentStream};
    use docqa_knowledge::{DocumentStore, HashingEmbedder, InMemoryDocumentStore, TextChunker};
    use futures::stream::{self, StreamExt};

    /// Answers every prompt with the same fragments.
    pub struct CannedModel(pub Vec<&'static str>);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn stream_completion(&self, _prompt: &str) -> Result<FragmentStream> {
            let fragments: Vec<Result<String>> =
                self.0.iter().map(|f| Ok(f.to_string())).collect();
            Ok(stream::iter(fragments).boxed())
        }

        fn model_name(&self) -> String {
            "canned".to_string()
        }
    }

    pub fn test_state() -> AppState {
        test_state_answering(vec!["Grounded ", "answer."])
    }

    pub fn test_state_answering(fragments: Vec<&'static str>) -> AppState {
        let store: Arc<dyn DocumentStore> =
            Arc::new(InMemoryDocumentStore::new(Arc::new(HashingEmbedder::new(64))));
        let model = Arc::new(CannedModel(fragments));
        let core = DocQaCore::from_parts(TextChunker::default(), store, model, 5);
        AppState::new(Arc::new(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_success_response_creation() {
        let data = json!({"message": "test"});
        let response = create_success_response(data);
        assert!(response.0.success);
    }

    #[test]
    fn test_error_response_creation() {
        let response = create_error_response("Test error".to_string());
        assert!(!response.0.success);
        assert_eq!(response.0.error, Some("Test error".to_string()));
    }
}
