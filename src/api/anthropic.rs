//! `/anthropic/v1/messages` and `/anthropic/v1/models`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::{into_axum_response, ProxyError};
use crate::models::{self, ModelFamily, KNOWN_MODELS};
use crate::protocol::anthropic::request::map_messages_request;
use crate::protocol::anthropic::response::{encode_messages_response, encode_model_list};
use crate::protocol::anthropic::stream::AnthropicSseEncoder;
use crate::protocol::anthropic::AnthropicRequest;
use crate::protocol::IngressApi;
use crate::state::AppState;
use crate::util::next_message_id;

use super::{accumulate, sse_response};

const INGRESS: IngressApi = IngressApi::Anthropic;

pub async fn list_models() -> axum::Json<serde_json::Value> {
    axum::Json(encode_model_list(&KNOWN_MODELS))
}

pub async fn messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: AnthropicRequest = match serde_json::from_slice(&body) {
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

    // Validation happens before any upstream traffic: a request without
    // max_tokens never leaves the building.
    let gemini_request = match map_messages_request(&request) {
        Ok(mapped) => mapped,
        Err(err) => return into_axum_response(&err, INGRESS),
    };

    let serve_model = state.fallback.best_available(&resolved);
    let message_id = next_message_id();
    tracing::info!(
        model = %serve_model,
        ingress = "anthropic",
        stream = stream_requested,
        "dispatching request"
    );

    if stream_requested {
        let outcome = state
            .fallback
            .wrap_streaming(&serve_model, |model| {
                let request = gemini_request.clone();
                let session = message_id.clone();
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

        let mut encoder =
            AnthropicSseEncoder::new(message_id, display_model, Arc::clone(&state.signatures));
        let frames = async_stream::stream! {
            let mut chunks = chunks;
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        for frame in encoder.encode(&chunk) {
                            yield Ok::<Bytes, Infallible>(Bytes::from(frame));
                        }
                    }
                    Err(err) => {
                        yield Ok(Bytes::from(encoder.encode_error(&err)));
                        return;
                    }
                }
            }
            // A stream that ended without a terminal chunk still owes the
            // client a well-formed close.
            for frame in encoder.finalize() {
                yield Ok(Bytes::from(frame));
            }
        };
        return sse_response(Body::from_stream(frames));
    }

    let outcome = state
        .fallback
        .wrap_nonstreaming(&serve_model, |model| {
            let request = gemini_request.clone();
            let session = message_id.clone();
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
            let body = encode_messages_response(&outcome.value, &display_model, &message_id);
            axum::Json(body).into_response()
        }
        Err(err) => into_axum_response(&err, INGRESS),
    }
}
