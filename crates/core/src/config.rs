use config::{Config, Environment, File};
use docqa_common::{DocQaError, Result};
use docqa_knowledge::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docqa_knowledge::semantic_search::DEFAULT_N_RESULTS;
use docqa_knowledge::{EmbeddingConfig, StoreConfig};
use serde::{Deserialize, Serialize};

use crate::generator::{DEFAULT_CHAT_API_BASE, DEFAULT_CHAT_MODEL};

pub const CONFIG_FILE: &str = "docqa";
pub const ENV_PREFIX: &str = "DOCQA";

/// Application configuration.
///
/// Layered from an optional `docqa.toml` and `DOCQA_*` environment variables,
/// with `__` separating nested keys (`DOCQA_SERVER__PORT=9000`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8501".to_string(),
            ],
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub n_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: DEFAULT_N_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base: String,
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_base: DEFAULT_CHAT_API_BASE.to_string(),
            temperature: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DocQaError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(DocQaError::Configuration(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DocQaError::Configuration(
                "chunking.chunk_overlap must be less than chunking.chunk_size".to_string(),
            ));
        }
        if self.retrieval.n_results == 0 {
            return Err(DocQaError::Configuration(
                "retrieval.n_results must be greater than zero".to_string(),
            ));
        }
        if self.embedding.resolved_dimensions() == 0 {
            return Err(DocQaError::Configuration(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(DocQaError::Configuration(format!(
                    "generation.temperature must be within 0.0..=2.0, got {}",
                    t
                )));
            }
        }
        if self.server.max_upload_bytes == 0 {
            return Err(DocQaError::Configuration(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads the model credential, preferring `GEMINI_API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.trim().is_empty())
}
