//! Embedding providers used by the document store.

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use docqa_common::{DocQaError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Sequential by default; providers with a native batch call override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model: String,
    /// Falls back to the provider's native size when unset.
    pub dimensions: Option<usize>,
    pub api_base: String,
}

impl EmbeddingConfig {
    pub fn resolved_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.provider {
            EmbeddingBackend::Hashing => DEFAULT_HASHING_DIMENSIONS,
            EmbeddingBackend::OpenAi => DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hashing,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

pub fn create_embedder(
    config: &EmbeddingConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.resolved_dimensions();
    if dimensions == 0 {
        return Err(DocQaError::Configuration(
            "embedding dimensions must be greater than zero".to_string(),
        ));
    }

    match config.provider {
        EmbeddingBackend::Hashing => {
            info!(dimensions, "Using local hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(dimensions)))
        }
        EmbeddingBackend::OpenAi => {
            let api_key = api_key.ok_or_else(|| {
                DocQaError::Configuration(
                    "an API key is required for the remote embedding provider".to_string(),
                )
            })?;
            info!(model = %config.model, api_base = %config.api_base, dimensions, "Using remote embedder");
            Ok(Arc::new(OpenAiEmbedder::new(
                api_key,
                &config.api_base,
                &config.model,
                dimensions,
            )))
        }
    }
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Each lowercase alphanumeric token lands in one signed bucket; the vector
/// is L2-normalized, so texts sharing vocabulary score a higher cosine.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

/// Embedder for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, api_base: &str, model: &str, dimensions: usize) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            dimensions,
        }
    }

    fn map_err(e: impl std::fmt::Display) -> DocQaError {
        DocQaError::Embedding {
            provider: "openai".to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| Self::map_err("no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "Requesting embeddings");

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(Self::map_err)?;

        let response = self.client.embeddings().create(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "Embedding request failed");
            Self::map_err(e)
        })?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(Self::map_err(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed("The quick brown fox").await.unwrap();
        let second = embedder.embed("the QUICK brown fox!").await.unwrap();

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_prefers_shared_vocabulary() {
        let embedder = HashingEmbedder::new(DEFAULT_HASHING_DIMENSIONS);
        let query = embedder.embed("invoice payment terms").await.unwrap();
        let related = embedder
            .embed("The payment terms of this invoice are thirty days.")
            .await
            .unwrap();
        let unrelated = embedder
            .embed("Penguins live in the southern hemisphere.")
            .await
            .unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_gives_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let vector = embedder.embed("  ...  ").await.unwrap();
        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_create_embedder_requires_key_for_remote() {
        let config = EmbeddingConfig {
            provider: EmbeddingBackend::OpenAi,
            ..Default::default()
        };
        assert!(create_embedder(&config, None).is_err());
        assert!(create_embedder(&config, Some("key")).is_ok());
    }

    #[test]
    fn test_create_embedder_rejects_zero_dimensions() {
        let config = EmbeddingConfig {
            dimensions: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            create_embedder(&config, None),
            Err(DocQaError::Configuration(_))
        ));
    }

    #[test]
    fn test_dimensions_follow_provider() {
        let hashing = EmbeddingConfig::default();
        assert_eq!(hashing.resolved_dimensions(), DEFAULT_HASHING_DIMENSIONS);
        assert_eq!(create_embedder(&hashing, None).unwrap().dimensions(), 384);

        let remote = EmbeddingConfig {
            provider: EmbeddingBackend::OpenAi,
            ..Default::default()
        };
        assert_eq!(remote.resolved_dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(create_embedder(&remote, Some("key")).unwrap().dimensions(), 768);

        let pinned = EmbeddingConfig {
            provider: EmbeddingBackend::OpenAi,
            dimensions: Some(256),
            ..Default::default()
        };
        assert_eq!(create_embedder(&pinned, Some("key")).unwrap().dimensions(), 256);
    }

    #[test]
    fn test_remote_api_base_drops_trailing_slash() {
        use async_openai::config::Config;

        let embedder = OpenAiEmbedder::new("key", "https://example.test/v1beta/openai/", "m", 8);
        assert_eq!(embedder.client.config().api_base(), "https://example.test/v1beta/openai");
    }
}
