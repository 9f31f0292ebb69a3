use crate::{create_success_response, AppState};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use docqa_common::ApiResponse;
use docqa_core::{AskOutcome, AskStream};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    #[serde(flatten)]
    pub outcome: AskOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<AskOutcome> for AskResponse {
    fn from(outcome: AskOutcome) -> Self {
        let message = outcome.notice();
        Self { outcome, message }
    }
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(ask))
        .route("/stream", post(ask_stream))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Json<ApiResponse<AskResponse>> {
    debug!(question_chars = request.question.chars().count(), "Question received");
    let outcome = state.core.session.ask(&request.question).await;
    create_success_response(outcome.into())
}

fn json_event(name: &str, data: &impl Serialize) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(event = name, error = %e, "Failed to encode SSE payload");
            Event::default().event("error").data(e.to_string())
        }
    }
}

/// Emits `sources`, then one `token` per fragment, then `done`. Token data
/// is a JSON string so fragments may carry line breaks. Questions that stop
/// before generation get a single `notice` event instead.
async fn ask_stream(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Sse<EventStream> {
    let events: EventStream = match state.core.session.ask_stream(&request.question).await {
        AskStream::Notice(outcome) => {
            let response = AskResponse::from(outcome);
            stream::once(async move { Ok::<_, Infallible>(json_event("notice", &response)) }).boxed()
        }
        AskStream::Streaming { sources, fragments } => {
            let head = stream::once(async move {
                Ok::<_, Infallible>(json_event("sources", &sources))
            });
            let tokens = fragments.map(|text| Ok::<_, Infallible>(json_event("token", &text)));
            let done = stream::once(async { Ok::<_, Infallible>(Event::default().event("done").data("")) });
            head.chain(tokens).chain(done).boxed()
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
