//! HTTP surface: axum routes delegating into the translation pipeline.

pub mod anthropic;
pub mod openai;
pub mod responses;

use std::sync::Arc;

use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use futures_util::StreamExt;

use crate::error::ProxyError;
use crate::protocol::chunk::{ChunkAccumulator, ChunkStream};
use crate::state::AppState;

/// Build the public router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/openai/v1/chat/completions", post(openai::chat_completions))
        .route("/openai/v1/models", get(openai::list_models))
        .route("/openai/v1/responses", post(responses::create_response))
        .route("/anthropic/v1/messages", post(anthropic::messages))
        .route("/anthropic/v1/models", get(anthropic::list_models))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Standard SSE response envelope.
pub(crate) fn sse_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// Drain a chunk stream into an accumulator for the buffered paths.
pub(crate) async fn accumulate(mut chunks: ChunkStream) -> Result<ChunkAccumulator, ProxyError> {
    let mut acc = ChunkAccumulator::new();
    while let Some(item) = chunks.next().await {
        acc.push(&item?);
    }
    Ok(acc)
}
