//! Incremental translation of Gemini stream records into normalized chunks.
//!
//! Walks `candidates[0].content.parts` in order, segmenting thought text
//! into a thinking block (one open at a time, start paired with end),
//! minting tool-call ids, and carrying the finish reason and usage onto a
//! single terminal chunk.

use std::sync::Arc;

use crate::models::ModelFamily;
use crate::protocol::chunk::{ChunkDelta, ChunkUsage, FinishReason, StreamChunk, ToolCallDelta};
use crate::protocol::gemini::{GeminiPart, GeminiResponse};
use crate::protocol::mapping::finish_reason_from_gemini;
use crate::state::signature_cache::{is_valid_signature, SignatureCache};
use crate::util::next_call_id;

pub struct PartStreamEmitter {
    family: ModelFamily,
    signatures: Arc<SignatureCache>,
    first_chunk: bool,
    thinking_open: bool,
    emitted_tool_call: bool,
    finished: bool,
    usage: Option<ChunkUsage>,
}

impl PartStreamEmitter {
    #[must_use]
    pub fn new(family: ModelFamily, signatures: Arc<SignatureCache>) -> Self {
        Self {
            family,
            signatures,
            first_chunk: true,
            thinking_open: false,
            emitted_tool_call: false,
            finished: false,
            usage: None,
        }
    }

    /// Translate one decoded stream record into normalized chunks.
    pub fn on_record(&mut self, record: &GeminiResponse, out: &mut Vec<StreamChunk>) {
        if self.finished {
            return;
        }

        if let Some(usage) = &record.usage_metadata {
            self.usage = Some(ChunkUsage {
                prompt_tokens: usage.prompt_token_count.unwrap_or(0),
                completion_tokens: usage.candidates_token_count.unwrap_or(0),
            });
        }

        let Some(candidate) = record.candidates.as_ref().and_then(|c| c.first()) else {
            return;
        };

        for part in &candidate.content.parts {
            self.on_part(part, out);
        }

        if let Some(reason) = candidate.finish_reason.as_deref() {
            self.emit_terminal(finish_reason_from_gemini(reason, self.emitted_tool_call), out);
        }
    }

    /// Close any open thinking block and emit the terminal chunk if the
    /// upstream stream ended without an explicit finish reason.
    pub fn finish(&mut self, out: &mut Vec<StreamChunk>) {
        if self.finished {
            return;
        }
        let reason = if self.emitted_tool_call {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        self.emit_terminal(reason, out);
    }

    fn on_part(&mut self, part: &GeminiPart, out: &mut Vec<StreamChunk>) {
        if let Some(text) = &part.text {
            if part.is_thought() {
                self.emit_thought_text(text, part.thought_signature.as_deref(), out);
            } else {
                self.close_thinking(out);
                out.push(StreamChunk::with_delta(ChunkDelta {
                    role: self.take_role(),
                    content: Some(text.clone()),
                    ..ChunkDelta::default()
                }));
            }
            return;
        }

        if let Some(call) = &part.function_call {
            self.close_thinking(out);
            let call_id = next_call_id();
            let signature = part
                .thought_signature
                .as_deref()
                .filter(|s| is_valid_signature(s));
            if let Some(signature) = signature {
                self.signatures.store_for_tool_call(&call_id, signature);
            }
            let arguments =
                serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_string());
            out.push(StreamChunk::with_delta(ChunkDelta {
                role: self.take_role(),
                tool_calls: vec![ToolCallDelta {
                    index: 0,
                    id: Some(call_id),
                    name: Some(call.name.clone()),
                    arguments: Some(arguments),
                    thought_signature: signature.map(ToString::to_string),
                }],
                ..ChunkDelta::default()
            }));
            self.emitted_tool_call = true;
        }
        // functionResponse / inlineData parts never occur in model output.
    }

    fn emit_thought_text(
        &mut self,
        text: &str,
        signature: Option<&str>,
        out: &mut Vec<StreamChunk>,
    ) {
        let starting = !self.thinking_open;
        self.thinking_open = true;
        let signature = signature.filter(|s| is_valid_signature(s));
        if let Some(signature) = signature {
            self.signatures.store_for_family(self.family, signature);
        }
        out.push(StreamChunk::with_delta(ChunkDelta {
            role: self.take_role(),
            content: Some(text.to_string()),
            thought: true,
            thinking_start: starting,
            thought_signature: signature.map(ToString::to_string),
            ..ChunkDelta::default()
        }));
    }

    fn close_thinking(&mut self, out: &mut Vec<StreamChunk>) {
        if !self.thinking_open {
            return;
        }
        self.thinking_open = false;
        out.push(StreamChunk::with_delta(ChunkDelta {
            thinking_end: true,
            ..ChunkDelta::default()
        }));
    }

    fn emit_terminal(&mut self, reason: FinishReason, out: &mut Vec<StreamChunk>) {
        self.close_thinking(out);
        out.push(StreamChunk::terminal(reason, self.usage));
        self.finished = true;
    }

    fn take_role(&mut self) -> Option<&'static str> {
        if self.first_chunk {
            self.first_chunk = false;
            Some("assistant")
        } else {
            None
        }
    }
}
