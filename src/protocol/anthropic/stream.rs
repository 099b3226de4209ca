//! Anthropic Messages SSE re-emission.
//!
//! Tracks the currently open content block (thinking / text / tool_use) and
//! a monotone block index, emitting the full block lifecycle: every
//! `content_block_start` is matched by a `content_block_stop`, and no delta
//! is emitted outside an open block.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::protocol::chunk::{FinishReason, StreamChunk, ToolCallDelta};
use crate::state::signature_cache::{is_valid_signature, SignatureCache};
use crate::stream::sse::anthropic_sse_frame;

use super::response::{wire_tool_use_id, EMPTY_RESPONSE_PLACEHOLDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Thinking,
    Text,
    ToolUse,
}

/// Stateful encoder for one streaming Messages response.
pub struct AnthropicSseEncoder {
    message_id: String,
    model: String,
    signatures: Arc<SignatureCache>,
    started: bool,
    finished: bool,
    block: Option<BlockKind>,
    block_index: usize,
    pending_signature: Option<String>,
}

impl AnthropicSseEncoder {
    #[must_use]
    pub fn new(message_id: String, model: String, signatures: Arc<SignatureCache>) -> Self {
        Self {
            message_id,
            model,
            signatures,
            started: false,
            finished: false,
            block: None,
            block_index: 0,
            pending_signature: None,
        }
    }

    /// Encode one normalized chunk into zero or more SSE frames.
    #[must_use]
    pub fn encode(&mut self, chunk: &StreamChunk) -> Vec<String> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if let Some(delta) = &chunk.delta {
            if delta.thinking_end && !delta.thought {
                self.close_block(&mut events);
            }

            if let Some(content) = &delta.content {
                if delta.thought {
                    self.push_thinking_delta(content, delta.thought_signature.as_deref(), &mut events);
                } else if !content.is_empty() {
                    self.push_text_delta(content, &mut events);
                }
            }

            for tool_call in &delta.tool_calls {
                self.push_tool_call(tool_call, &mut events);
            }
        }

        if let Some(finish_reason) = chunk.finish_reason {
            self.push_terminal(finish_reason, chunk, &mut events);
        }

        events
    }

    /// Flush a stream that ended without a terminal chunk.
    #[must_use]
    pub fn finalize(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.push_terminal(FinishReason::Stop, &StreamChunk::default(), &mut events);
        events
    }

    /// Final error event for a stream whose headers are already out.
    #[must_use]
    pub fn encode_error(&mut self, err: &ProxyError) -> String {
        self.finished = true;
        let body = crate::error::anthropic_error_payload(err);
        anthropic_sse_frame("error", &body.to_string())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn push_thinking_delta(
        &mut self,
        content: &str,
        signature: Option<&str>,
        events: &mut Vec<String>,
    ) {
        self.ensure_started(events);
        if self.block != Some(BlockKind::Thinking) {
            self.close_block(events);
            self.emit(
                events,
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": { "type": "thinking", "thinking": "" }
                }),
            );
            self.block = Some(BlockKind::Thinking);
        }
        self.emit(
            events,
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": self.block_index,
                "delta": { "type": "thinking_delta", "thinking": content }
            }),
        );
        if let Some(signature) = signature {
            if is_valid_signature(signature) {
                self.pending_signature = Some(signature.to_string());
            }
        }
    }

    fn push_text_delta(&mut self, content: &str, events: &mut Vec<String>) {
        self.ensure_started(events);
        if self.block != Some(BlockKind::Text) {
            self.close_block(events);
            self.emit(
                events,
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": { "type": "text", "text": "" }
                }),
            );
            self.block = Some(BlockKind::Text);
        }
        self.emit(
            events,
            "content_block_delta",
            json!({
                "type": "content_block_delta",
                "index": self.block_index,
                "delta": { "type": "text_delta", "text": content }
            }),
        );
    }

    fn push_tool_call(&mut self, tool_call: &ToolCallDelta, events: &mut Vec<String>) {
        self.ensure_started(events);

        let opens_new_block = tool_call.name.is_some() || self.block != Some(BlockKind::ToolUse);
        if opens_new_block {
            // A signature riding on the tool call belongs to the thinking
            // block being closed.
            if let Some(signature) = tool_call
                .thought_signature
                .as_deref()
                .filter(|s| is_valid_signature(s))
                .map(ToString::to_string)
                .or_else(|| {
                    tool_call
                        .id
                        .as_deref()
                        .and_then(|id| self.signatures.for_tool_call(id))
                })
            {
                self.pending_signature = Some(signature);
            }
            self.close_block(events);
            // Whatever close_block did not consume must not leak into a
            // later thinking block.
            self.pending_signature = None;

            let wire_id = tool_call
                .id
                .as_deref()
                .map_or_else(crate::util::next_toolu_id, wire_tool_use_id);
            self.emit(
                events,
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": {
                        "type": "tool_use",
                        "id": wire_id,
                        "name": tool_call.name.as_deref().unwrap_or_default(),
                        "input": {}
                    }
                }),
            );
            self.block = Some(BlockKind::ToolUse);
        }

        if let Some(arguments) = tool_call.arguments.as_deref() {
            if !arguments.is_empty() {
                self.emit(
                    events,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": { "type": "input_json_delta", "partial_json": arguments }
                    }),
                );
            }
        }
    }

    fn push_terminal(
        &mut self,
        finish_reason: FinishReason,
        chunk: &StreamChunk,
        events: &mut Vec<String>,
    ) {
        if !self.started {
            // Nothing arrived at all; a bare message_delta would violate the
            // block lifecycle, so substitute a placeholder text block.
            self.ensure_started(events);
            self.push_text_delta(EMPTY_RESPONSE_PLACEHOLDER, events);
        }
        self.close_block(events);

        let usage = chunk.usage.unwrap_or_default();
        self.emit(
            events,
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": finish_reason.as_anthropic_str(),
                    "stop_sequence": null
                },
                "usage": {
                    "output_tokens": usage.completion_tokens,
                    "cache_read_input_tokens": 0,
                    "cache_creation_input_tokens": 0
                }
            }),
        );
        self.emit(events, "message_stop", json!({ "type": "message_stop" }));
        self.finished = true;
    }

    fn ensure_started(&mut self, events: &mut Vec<String>) {
        if self.started {
            return;
        }
        self.started = true;
        self.emit(
            events,
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": { "input_tokens": 0, "output_tokens": 0 }
                }
            }),
        );
    }

    fn close_block(&mut self, events: &mut Vec<String>) {
        let Some(block) = self.block.take() else {
            return;
        };
        if block == BlockKind::Thinking {
            if let Some(signature) = self.pending_signature.take() {
                self.emit(
                    events,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": { "type": "signature_delta", "signature": signature }
                    }),
                );
            }
        }
        self.emit(
            events,
            "content_block_stop",
            json!({ "type": "content_block_stop", "index": self.block_index }),
        );
        self.block_index += 1;
    }

    fn emit(&self, events: &mut Vec<String>, name: &str, body: Value) {
        events.push(anthropic_sse_frame(name, &body.to_string()));
    }
}
