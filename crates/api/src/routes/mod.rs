pub mod ask;
pub mod documents;
pub mod health;

use crate::{create_error_response, AppState};
use axum::{http::StatusCode, response::IntoResponse, Router};

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::routes())
        .nest("/api/v1", api_routes())
        .fallback(not_found_handler)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/documents", documents::routes())
        .nest("/ask", ask::routes())
}

pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, create_error_response("Not found".to_string()))
}
