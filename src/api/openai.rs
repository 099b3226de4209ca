//! `/openai/v1/chat/completions` and `/openai/v1/models`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::{into_axum_response, ProxyError};
use crate::models::{self, ModelFamily, KNOWN_MODELS};
use crate::protocol::openai_chat::request::map_chat_request;
use crate::protocol::openai_chat::response::{encode_chat_response, encode_model_list};
use crate::protocol::openai_chat::stream::OpenAiChatSseEncoder;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::IngressApi;
use crate::state::AppState;
use crate::util::{next_chat_id, unix_now_secs};

use super::{accumulate, sse_response};

const INGRESS: IngressApi = IngressApi::OpenAiChat;

pub async fn list_models() -> axum::Json<serde_json::Value> {
    axum::Json(encode_model_list(&KNOWN_MODELS))
}

pub async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: OpenAiChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return into_axum_response(
                &ProxyError::InvalidRequest(format!("Invalid request body: {err}")),
                INGRESS,
            );
        }
    };

    let requested = request.model.clone();
    let resolved = models::resolve(requested.as_deref());
    let family = ModelFamily::of(requested.as_deref().unwrap_or_default());
    let display_model = requested.unwrap_or_else(|| resolved.clone());
    let stream_requested = request.stream.unwrap_or(false);

    let gemini_request = match map_chat_request(&request, &state.signatures) {
        Ok(mapped) => mapped,
        Err(err) => return into_axum_response(&err, INGRESS),
    };

    let serve_model = state.fallback.best_available(&resolved);
    let chat_id = next_chat_id();
    let created = unix_now_secs();
    tracing::info!(
        model = %serve_model,
        ingress = "openai-chat",
        stream = stream_requested,
        "dispatching request"
    );

    if stream_requested {
        let outcome = state
            .fallback
            .wrap_streaming(&serve_model, |model| {
                let request = gemini_request.clone();
                let session = chat_id.clone();
                let state = Arc::clone(&state);
                async move {
                    state
                        .gemini
                        .stream_generate(&model, family, request, session)
                        .await
                }
            })
            .await;
        let chunks = match outcome {
            Ok(outcome) => outcome.value,
            Err(err) => return into_axum_response(&err, INGRESS),
        };

        let mut encoder = OpenAiChatSseEncoder::new(chat_id, display_model, created);
        let frames = async_stream::stream! {
            let mut chunks = chunks;
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        if let Some(frame) = encoder.encode(&chunk) {
                            yield Ok::<Bytes, Infallible>(Bytes::from(frame));
                        }
                    }
                    Err(err) => {
                        // Headers are already out; emit a final error event
                        // and close.
                        yield Ok(Bytes::from(encoder.encode_error(&err)));
                        return;
                    }
                }
            }
            yield Ok(Bytes::from(encoder.done()));
        };
        return sse_response(Body::from_stream(frames));
    }

    let outcome = state
        .fallback
        .wrap_nonstreaming(&serve_model, |model| {
            let request = gemini_request.clone();
            let session = chat_id.clone();
            let state = Arc::clone(&state);
            async move {
                let chunks = state
                    .gemini
                    .stream_generate(&model, family, request, session)
                    .await?;
                accumulate(chunks).await
            }
        })
        .await;

    match outcome {
        Ok(outcome) => {
            let body = encode_chat_response(&outcome.value, &display_model, &chat_id, created);
            axum::Json(body).into_response()
        }
        Err(err) => into_axum_response(&err, INGRESS),
    }
}
