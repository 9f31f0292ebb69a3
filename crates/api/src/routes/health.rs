use crate::{create_success_response, AppState, HealthCheck};
use axum::{extract::State, routing::get, Json, Router};
use docqa_common::ApiResponse;
use serde_json::json;
use tracing::debug;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthCheck>> {
    debug!("Health check requested");

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.core.store.backend().to_string(),
        model: state.core.model_name.clone(),
    };

    create_success_response(health)
}

// Ready once the store answers a count.
async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    debug!("Readiness check requested");

    match state.core.store.count().await {
        Ok(chunks) => Json(json!({
            "status": "ready",
            "timestamp": chrono::Utc::now(),
            "checks": {
                "store": "ready",
                "chunks": chunks,
                "session": state.core.session.state().await,
            }
        })),
        Err(e) => Json(json!({
            "status": "not_ready",
            "timestamp": chrono::Utc::now(),
            "checks": {
                "store": "not_ready",
                "error": e.to_string(),
            }
        })),
    }
}

async fn liveness_check() -> Json<serde_json::Value> {
    debug!("Liveness check requested");

    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now(),
    }))
}
