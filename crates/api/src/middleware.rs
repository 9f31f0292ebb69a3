use crate::ApiConfig;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: AllowOrigin = if config.cors_origins.iter().any(|o| o == "*") {
        Any.into()
    } else {
        config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>()
            .into()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    info!("Incoming request: {} {}", method, uri);

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        warn!(
            "Request failed: {} {} - {} - {:?}",
            method,
            uri,
            status,
            start.elapsed()
        );
    } else {
        info!(
            "Request completed: {} {} - {} - {:?}",
            method,
            uri,
            status,
            start.elapsed()
        );
    }

    response
}

/// Tags each request with an id, reusing one supplied by the client.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let header = HeaderName::from_static(REQUEST_ID_HEADER);

    let request_id = match request.headers().get(&header) {
        Some(value) => value.clone(),
        None => match HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return next.run(request).await,
        },
    };

    request
        .headers_mut()
        .insert(header.clone(), request_id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(header, request_id);
    response
}
