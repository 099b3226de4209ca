//! Authenticated streaming client for the Code Assist Gemini endpoint.

pub mod discovery;
pub mod stream;

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::AuthClient;
use crate::error::ProxyError;
use crate::models::ModelFamily;
use crate::protocol::chunk::ChunkStream;
use crate::protocol::gemini::{
    GeminiErrorEnvelope, GeminiRequest, GeminiResponse, GenerateContentEnvelope, StreamRecord,
};
use crate::state::signature_cache::SignatureCache;
use crate::stream::sse::sse_frame_stream;

use self::stream::PartStreamEmitter;

/// Production Code Assist endpoint.
pub const CODE_ASSIST_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";
const V1_INTERNAL: &str = "/v1internal";

/// Version advertised in the GeminiCLI User-Agent.
const GEMINI_CLI_VERSION: &str = "0.4.1";

const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const CHUNK_CHANNEL_CAPACITY: usize = 32;

static QUOTA_RESET_RE: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"(?is)quota.*?reset.*?(\d+)\s*(second|minute|hour)s?")
        .expect("static regex compiles")
});

/// Streaming client over one `AuthClient`. The project id is discovered
/// lazily and cached for the life of the client.
pub struct GeminiClient {
    http: reqwest::Client,
    auth: Arc<dyn AuthClient>,
    signatures: Arc<SignatureCache>,
    project: tokio::sync::Mutex<Option<String>>,
    installation_id: String,
    base_url: String,
}

impl GeminiClient {
    /// Build a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Transport` when the HTTP client cannot be built.
    pub fn new(
        auth: Arc<dyn AuthClient>,
        signatures: Arc<SignatureCache>,
        timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|err| ProxyError::Transport(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            auth,
            signatures,
            project: tokio::sync::Mutex::new(None),
            installation_id: uuid::Uuid::new_v4().to_string(),
            base_url: CODE_ASSIST_ENDPOINT.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, staging).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn signatures(&self) -> &Arc<SignatureCache> {
        &self.signatures
    }

    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}{V1_INTERNAL}:{method}", self.base_url)
    }

    fn user_agent(&self, model: &str) -> String {
        format!(
            "GeminiCLI/{GEMINI_CLI_VERSION}/{model} ({}; {})",
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    pub(crate) fn base_headers(&self, token: &str, model: &str) -> reqwest::header::HeaderMap {
        use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.user_agent(model)) {
            headers.insert(USER_AGENT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.installation_id) {
            headers.insert("x-gemini-api-privileged-user-id", value);
        }
        headers
    }

    /// Issue a `:streamGenerateContent` call and return the normalized chunk
    /// stream.
    ///
    /// A 401 triggers one token invalidation and restart; 429 and 5xx are
    /// retried a bounded number of times before the failure is surfaced (no
    /// downstream bytes have been written yet at that point).
    ///
    /// # Errors
    ///
    /// `RateLimit` for an exhausted 429, `Upstream` for other HTTP failures,
    /// `Auth`/`Transport` for credential and connection problems.
    pub async fn stream_generate(
        &self,
        model: &str,
        family: ModelFamily,
        mut request: GeminiRequest,
        session_id: String,
    ) -> Result<ChunkStream, ProxyError> {
        let project = self.project().await?;
        request.session_id = Some(session_id);
        let envelope = GenerateContentEnvelope {
            model: model.to_string(),
            project,
            user_prompt_id: uuid::Uuid::new_v4().to_string(),
            request,
        };

        let url = format!("{}?alt=sse", self.method_url("streamGenerateContent"));
        let mut invalidated = false;
        let mut attempt: u32 = 0;
        let response = loop {
            let token = self.auth.access_token().await?;
            let response = self
                .http
                .post(&url)
                .headers(self.base_headers(&token, model))
                .json(&envelope)
                .send()
                .await
                .map_err(|err| ProxyError::Transport(err.to_string()))?;

            let status = response.status();
            if status.is_success() {
                break response;
            }
            let status_code = status.as_u16();

            if status_code == 401 && !invalidated {
                invalidated = true;
                self.auth.invalidate_token();
                tracing::debug!(model, "upstream 401, refreshing token and restarting");
                continue;
            }
            if (status_code == 429 || status_code >= 500) && attempt + 1 < RETRY_MAX_ATTEMPTS {
                attempt += 1;
                let delay = retry_delay(attempt);
                tracing::debug!(model, status = status_code, attempt, "retrying upstream call");
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(error_for_response(model, response).await);
        };

        let sse = sse_frame_stream(response.bytes_stream());
        let (tx, rx) = tokio::sync::mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let mut emitter = PartStreamEmitter::new(family, Arc::clone(&self.signatures));

        tokio::spawn(async move {
            futures_util::pin_mut!(sse);
            let mut pending = Vec::new();
            while let Some(event) = sse.next().await {
                let Some(record) = parse_stream_record(&event.data) else {
                    continue;
                };
                emitter.on_record(&record, &mut pending);
                for chunk in pending.drain(..) {
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Downstream hung up; drop the rest of the upstream
                        // bytes on the floor.
                        return;
                    }
                }
            }
            emitter.finish(&mut pending);
            for chunk in pending.drain(..) {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Parse one SSE data payload into a response record. Both the enveloped
/// (`{response: {...}}`) and bare (`{candidates: [...]}`) shapes occur.
#[must_use]
pub fn parse_stream_record(data: &str) -> Option<GeminiResponse> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    if value.get("response").is_some() {
        let record: StreamRecord = serde_json::from_value(value).ok()?;
        Some(record.response)
    } else {
        serde_json::from_value(value).ok()
    }
}

fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))
}

async fn error_for_response(model: &str, response: reqwest::Response) -> ProxyError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response.text().await.unwrap_or_default();

    match status {
        429 => rate_limit_error(model, status, retry_after.as_deref(), &body),
        401 => ProxyError::Auth("upstream rejected credentials".to_string()),
        400 => {
            let parsed: GeminiErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
            let message = if parsed.error.message.is_empty() {
                body
            } else {
                parsed.error.message
            };
            ProxyError::Upstream {
                status: if parsed.error.code == 0 { 400 } else { parsed.error.code },
                message,
            }
        }
        _ => ProxyError::Upstream {
            status,
            message: body,
        },
    }
}

/// Extract a reset hint as (milliseconds, human text) from the
/// `retry-after` header or the error body.
#[must_use]
pub(crate) fn parse_reset_hint(retry_after: Option<&str>, body: &str) -> Option<(u64, String)> {
    if let Some(seconds) = retry_after.and_then(|value| value.trim().parse::<u64>().ok()) {
        return Some((seconds.saturating_mul(1000), format!("{seconds} second(s)")));
    }
    let captures = QUOTA_RESET_RE.captures(body)?;
    let value: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_lowercase();
    let millis = match unit.as_str() {
        "minute" => value.saturating_mul(60_000),
        "hour" => value.saturating_mul(3_600_000),
        _ => value.saturating_mul(1000),
    };
    Some((millis, format!("{value} {unit}(s)")))
}

/// Build the typed rate-limit error, including the human-readable reset
/// estimate when one can be derived.
#[must_use]
pub(crate) fn rate_limit_error(
    model: &str,
    status: u16,
    retry_after: Option<&str>,
    body: &str,
) -> ProxyError {
    match parse_reset_hint(retry_after, body) {
        Some((reset_after_ms, human)) => {
            let next_available = chrono::Utc::now()
                + chrono::Duration::milliseconds(reset_after_ms as i64);
            ProxyError::RateLimit {
                status,
                reset_after_ms: Some(reset_after_ms),
                message: format!(
                    "RESOURCE_EXHAUSTED: Rate limited on {model}. Quota will reset after {human}. Next available: {}",
                    next_available.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ),
            }
        }
        None => ProxyError::RateLimit {
            status,
            reset_after_ms: None,
            message: format!("RESOURCE_EXHAUSTED: Rate limited on {model}."),
        },
    }
}
