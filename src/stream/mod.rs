pub mod sse;

pub use sse::{sse_frame_stream, SseParser};

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}
