//! `/openai/v1/responses`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::{into_axum_response, ProxyError};
use crate::models::{self, ModelFamily};
use crate::protocol::openai_responses::request::map_responses_request;
use crate::protocol::openai_responses::response::encode_responses_response;
use crate::protocol::openai_responses::stream::ResponsesSseEncoder;
use crate::protocol::openai_responses::ResponsesRequest;
use crate::protocol::IngressApi;
use crate::state::AppState;
use crate::util::{next_response_id, unix_now_secs};

use super::{accumulate, sse_response};

const INGRESS: IngressApi = IngressApi::OpenAiResponses;

pub async fn create_response(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ResponsesRequest = match serde_json::from_slice(&body) {
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

    let gemini_request = match map_responses_request(&request, &state.signatures) {
        Ok(mapped) => mapped,
        Err(err) => return into_axum_response(&err, INGRESS),
    };

    let serve_model = state.fallback.best_available(&resolved);
    let response_id = next_response_id();
    let created = unix_now_secs();
    tracing::info!(
        model = %serve_model,
        ingress = "openai-responses",
        stream = stream_requested,
        "dispatching request"
    );

    if stream_requested {
        let outcome = state
            .fallback
            .wrap_streaming(&serve_model, |model| {
                let request = gemini_request.clone();
                let session = response_id.clone();
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

        let mut encoder = ResponsesSseEncoder::new(response_id, display_model, created);
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
            let session = response_id.clone();
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
            let body =
                encode_responses_response(&outcome.value, &display_model, &response_id, created);
            axum::Json(body).into_response()
        }
        Err(err) => into_axum_response(&err, INGRESS),
    }
}
