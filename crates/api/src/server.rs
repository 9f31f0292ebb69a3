use crate::{
    middleware::{cors_layer, request_id_middleware, request_logging_middleware},
    routes::create_routes,
    ApiConfig, AppState,
};
use axum::{extract::DefaultBodyLimit, Router};
use docqa_core::DocQaCore;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct ApiServer {
    config: ApiConfig,
    core: Arc<DocQaCore>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, core: Arc<DocQaCore>) -> Self {
        Self { config, core }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_app();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("Starting API server on {}", addr);
        info!("CORS origins: {:?}", self.config.cors_origins);
        info!("Upload limit: {} bytes", self.config.max_upload_bytes);

        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("API server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }

    pub fn create_app(&self) -> Router {
        create_routes(AppState::new(self.core.clone())).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&self.config))
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::max(self.config.max_upload_bytes)),
        )
    }

    pub fn get_config(&self) -> &ApiConfig {
        &self.config
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn create_test_server(config: ApiConfig) -> ApiServer {
        ApiServer::new(config, test_state().core)
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = create_test_server(ApiConfig::default());
        assert_eq!(server.get_config().port, 8080);
    }

    #[tokio::test]
    async fn test_app_routes_and_request_id() {
        let app = create_test_server(ApiConfig::default()).create_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/documents/count")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_test_server(ApiConfig::default()).create_app();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let config = ApiConfig {
            max_upload_bytes: 64,
            ..Default::default()
        };
        let app = create_test_server(config).create_app();

        let boundary = "limit-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"big.pdf\"\r\nContent-Type: application/pdf\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        body.extend(std::iter::repeat(b'x').take(4096));
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/documents")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
