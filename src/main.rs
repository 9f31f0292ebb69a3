use anyhow::{Context, Result};
use docqa_api::ApiServer;
use docqa_core::{config::api_key_from_env, AppConfig, DocQaCore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before anything reads them
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "docqa=debug,docqa_core=debug,docqa_knowledge=debug,docqa_api=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting document Q&A API...");

    let config = AppConfig::load().context("failed to load configuration")?;

    let api_key = api_key_from_env();
    if api_key.is_none() {
        warn!("GEMINI_API_KEY is not set");
    }

    let core = Arc::new(
        DocQaCore::new(config.clone(), api_key)
            .await
            .context("failed to initialize document Q&A core")?,
    );

    let server = ApiServer::new(config.server.clone(), core.clone());
    let served = server.start().await;

    core.shutdown().await?;

    if let Err(e) = served {
        error!("API server error: {}", e);
        return Err(anyhow::anyhow!("API server error: {}", e));
    }

    info!("Document Q&A API stopped");
    Ok(())
}
