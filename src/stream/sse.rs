//! SSE (Server-Sent Events) frame parser, encoder, and stream utilities.
//!
//! Handles the low-level parsing of SSE frames from a byte stream, including
//! buffering partial lines and field semantics per the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use super::SseEvent;
use futures_util::Stream;
use memchr::memchr_iter;

// ---------------------------------------------------------------------------
// SseParser — incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (potentially arriving at arbitrary byte
/// boundaries) and it yields fully-assembled [`SseEvent`] frames.
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            event_type: None,
            data_buffer: String::new(),
            has_data: false,
        }
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// SSE field rules:
    /// - `data:` lines append to the data buffer (one leading space after the
    ///   colon is stripped; multiple lines are joined with `\n`)
    /// - `event:` sets the event type for the next frame
    /// - an empty line terminates the frame
    /// - `:` comment lines and unknown fields are ignored
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut consumed = 0usize;
        let bytes = self.buffer.as_bytes();
        for pos in memchr_iter(b'\n', bytes) {
            let mut line = &self.buffer[consumed..pos];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
            consumed = pos + 1;
        }
        self.buffer.drain(..consumed);
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            // Empty line = dispatch event
            if *has_data {
                events.push(SseEvent {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            }
            return;
        }

        // Comment line — ignore
        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
        // id:, retry:, and unknown field names are ignored; the upstream
        // never sets them on generateContent streams.
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Format an Anthropic-style SSE frame (with named event type).
#[must_use]
pub fn anthropic_sse_frame(event_type: &str, json: &str) -> String {
    let mut out = String::with_capacity(18 + event_type.len() + json.len());
    out.push_str("event: ");
    out.push_str(event_type);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Format a Responses-API SSE frame (named event, same wire shape as Anthropic).
#[must_use]
pub fn responses_sse_frame(event_type: &str, json: &str) -> String {
    anthropic_sse_frame(event_type, json)
}

/// The OpenAI terminal sentinel frame.
#[must_use]
pub fn done_frame() -> String {
    DONE_FRAME.to_owned()
}

const DONE_FRAME: &str = "data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Split a byte stream into SSE events using [`SseParser`].
///
/// Bytes arriving from an HTTP response body are decoded as UTF-8 (split
/// code points are buffered until complete), fed into the parser, and
/// complete [`SseEvent`] frames are yielded.
pub fn sse_frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = SseEvent> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            SseParser::new(),
            Vec::<u8>::new(),
            std::collections::VecDeque::<SseEvent>::new(),
        ),
        |(mut stream, mut parser, mut remainder, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((event, (stream, parser, remainder, pending)));
                }

                let chunk = stream.as_mut().next().await?;
                let Ok(bytes) = chunk else {
                    continue;
                };
                remainder.extend_from_slice(&bytes);
                let mut parsed = Vec::new();
                match std::str::from_utf8(&remainder) {
                    Ok(text) => {
                        parser.feed_into(text, &mut parsed);
                        remainder.clear();
                    }
                    Err(e) => {
                        let valid_up_to = e.valid_up_to();
                        // Safety: valid_up_to is guaranteed to be a UTF-8 boundary.
                        let text = unsafe { std::str::from_utf8_unchecked(&remainder[..valid_up_to]) };
                        parser.feed_into(text, &mut parsed);
                        remainder.copy_within(valid_up_to.., 0);
                        remainder.truncate(remainder.len() - valid_up_to);
                    }
                }
                pending.extend(parsed);
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
