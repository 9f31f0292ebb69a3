use crate::{
    create_success_response,
    error::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use docqa_common::ApiResponse;
use docqa_core::UploadOutcome;
use serde::Serialize;
use tracing::{info, warn};

const FILE_FIELD: &str = "file";
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Serialize)]
pub struct ChunkCount {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_document).delete(clear_documents))
        .route("/count", get(chunk_count))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::RequestTooLarge
    } else {
        ApiError::Multipart(e.body_text())
    }
}

/// Accepts the upload when either the extension or the declared type says PDF.
fn is_pdf(filename: &str, content_type: Option<&str>) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<UploadOutcome>>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("uploaded file has no filename".to_string()))?;
        let content_type = field.content_type().map(str::to_string);

        if !is_pdf(&filename, content_type.as_deref()) {
            warn!(filename = %filename, content_type = ?content_type, "Rejected non-PDF upload");
            return Err(ApiError::UnsupportedMediaType(format!(
                "only PDF files are accepted, got {}",
                filename
            )));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        info!(filename = %filename, size = data.len(), "Received upload");

        let outcome = state.core.session.upload(&filename, data.to_vec()).await;
        return match outcome {
            UploadOutcome::Rejected { reason, .. } => Err(ApiError::Rejected(reason)),
            indexed => Ok(create_success_response(indexed)),
        };
    }

    Err(ApiError::Validation(format!(
        "multipart field '{}' is required",
        FILE_FIELD
    )))
}

async fn chunk_count(State(state): State<AppState>) -> Json<ApiResponse<ChunkCount>> {
    let count = state.core.session.chunk_count().await;
    create_success_response(ChunkCount { count })
}

async fn clear_documents(State(state): State<AppState>) -> Json<ApiResponse<ClearResult>> {
    let cleared = state.core.session.clear().await;
    create_success_response(ClearResult { cleared })
}
