use crate::protocol::IngressApi;

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Model not allowed: {0}")]
    ModelForbidden(String),
    #[error("{message}")]
    RateLimit {
        status: u16,
        reset_after_ms: Option<u64>,
        message: String,
    },
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProxyError::RateLimit { .. })
    }
}

/// HTTP status chosen per ingress dialect.
///
/// Rate limits are deliberately surfaced as 400 on the Anthropic path: a 429
/// there sends common clients into an unbounded retry loop against a quota
/// that will not reset for minutes.
#[must_use]
pub fn http_status_for(err: &ProxyError, ingress: IngressApi) -> http::StatusCode {
    match err {
        ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
        ProxyError::Auth(_) => http::StatusCode::UNAUTHORIZED,
        ProxyError::ModelForbidden(_) => http::StatusCode::FORBIDDEN,
        ProxyError::RateLimit { .. } => match ingress {
            IngressApi::Anthropic => http::StatusCode::BAD_REQUEST,
            IngressApi::OpenAiChat | IngressApi::OpenAiResponses => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        ProxyError::Config(_)
        | ProxyError::Upstream { .. }
        | ProxyError::Transport(_)
        | ProxyError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn openai_error_type(err: &ProxyError) -> &'static str {
    match err {
        ProxyError::InvalidRequest(_) => "invalid_request_error",
        ProxyError::Auth(_) => "authentication_error",
        ProxyError::ModelForbidden(_) => "permission_error",
        ProxyError::RateLimit { .. } => "rate_limit_error",
        _ => "server_error",
    }
}

fn anthropic_error_type(err: &ProxyError) -> &'static str {
    match err {
        // Rate limits ride the invalid_request_error surface on this path so
        // clients treat them as terminal rather than retryable.
        ProxyError::InvalidRequest(_) | ProxyError::RateLimit { .. } => "invalid_request_error",
        ProxyError::Auth(_) | ProxyError::ModelForbidden(_) => "authentication_error",
        _ => "api_error",
    }
}

#[must_use]
pub fn openai_error_payload(err: &ProxyError) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": openai_error_type(err),
            "param": null,
        }
    })
}

#[must_use]
pub fn anthropic_error_payload(err: &ProxyError) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "error": {
            "type": anthropic_error_type(err),
            "message": err.to_string(),
        }
    })
}

/// Format an error for a given ingress API, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &ProxyError, ingress: IngressApi) -> (http::StatusCode, serde_json::Value) {
    let status = http_status_for(err, ingress);
    let body = match ingress {
        IngressApi::OpenAiChat | IngressApi::OpenAiResponses => openai_error_payload(err),
        IngressApi::Anthropic => anthropic_error_payload(err),
    };
    (status, body)
}

/// Convert a `ProxyError` into an axum response for a specific ingress.
#[must_use]
pub fn into_axum_response(err: &ProxyError, ingress: IngressApi) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err, ingress);
    (status, axum::Json(body)).into_response()
}
