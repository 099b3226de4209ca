//! The normalized chunk stream: the dialect-agnostic pipe between the Gemini
//! streaming client and the SSE re-emitters.

use futures_util::stream::BoxStream;

use crate::error::ProxyError;

/// A single unit of the normalized stream.
///
/// Within one response at most one thinking block is open at a time; a
/// `thinking_start` marker is paired with exactly one `thinking_end`, and no
/// non-thinking content appears between them. `finish_reason` appears on
/// exactly one chunk (the last content-bearing one); `usage` rides on a chunk
/// no earlier than the finish-reason chunk.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub delta: Option<ChunkDelta>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<ChunkUsage>,
}

/// The delta payload of one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkDelta {
    /// `"assistant"`, set on the first emitted chunk only.
    pub role: Option<&'static str>,
    /// Visible or thinking text, depending on `thought`.
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    /// `content` is reasoning text rather than assistant-visible output.
    pub thought: bool,
    /// Signature attached to a thinking delta.
    pub thought_signature: Option<String>,
    pub thinking_start: bool,
    pub thinking_end: bool,
}

/// Incremental tool-call delta at a stream index.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// A fragment of the JSON-encoded arguments; the concatenation over all
    /// deltas at one index parses as a JSON object.
    pub arguments: Option<String>,
    pub thought_signature: Option<String>,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

impl FinishReason {
    #[must_use]
    pub fn as_openai_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
        }
    }

    #[must_use]
    pub fn as_anthropic_str(self) -> &'static str {
        match self {
            FinishReason::Stop | FinishReason::ContentFilter => "end_turn",
            FinishReason::ToolCalls => "tool_use",
            FinishReason::Length => "max_tokens",
        }
    }
}

/// Token usage totals reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChunkUsage {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The single-producer single-consumer finite chunk sequence.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProxyError>>;

impl StreamChunk {
    #[must_use]
    pub fn with_delta(delta: ChunkDelta) -> Self {
        Self {
            delta: Some(delta),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn terminal(finish_reason: FinishReason, usage: Option<ChunkUsage>) -> Self {
        Self {
            delta: None,
            finish_reason: Some(finish_reason),
            usage,
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulator for the non-streaming paths
// ---------------------------------------------------------------------------

/// A fully assembled tool call, after the argument deltas are concatenated.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
    pub thought_signature: Option<String>,
}

/// Folds a chunk stream into the pieces the buffered response encoders need.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    text: String,
    thinking: String,
    thinking_signature: Option<String>,
    tool_calls: Vec<AccumulatedToolCall>,
    index_map: Vec<(usize, usize)>,
    finish_reason: Option<FinishReason>,
    usage: Option<ChunkUsage>,
}

impl ChunkAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &StreamChunk) {
        if let Some(delta) = &chunk.delta {
            if let Some(content) = &delta.content {
                if delta.thought {
                    self.thinking.push_str(content);
                } else {
                    self.text.push_str(content);
                }
            }
            if delta.thought {
                if let Some(sig) = &delta.thought_signature {
                    self.thinking_signature = Some(sig.clone());
                }
            }
            for tc in &delta.tool_calls {
                let slot = self.slot_for(tc.index);
                let call = &mut self.tool_calls[slot];
                if let Some(id) = &tc.id {
                    call.id.clone_from(id);
                }
                if let Some(name) = &tc.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &tc.arguments {
                    call.arguments.push_str(arguments);
                }
                if let Some(sig) = &tc.thought_signature {
                    call.thought_signature = Some(sig.clone());
                }
            }
        }
        if let Some(reason) = chunk.finish_reason {
            self.finish_reason = Some(reason);
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
    }

    fn slot_for(&mut self, index: usize) -> usize {
        if let Some(&(_, slot)) = self.index_map.iter().find(|(idx, _)| *idx == index) {
            return slot;
        }
        self.tool_calls.push(AccumulatedToolCall::default());
        let slot = self.tool_calls.len() - 1;
        self.index_map.push((index, slot));
        slot
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    #[must_use]
    pub fn thinking_signature(&self) -> Option<&str> {
        self.thinking_signature.as_deref()
    }

    #[must_use]
    pub fn tool_calls(&self) -> &[AccumulatedToolCall] {
        &self.tool_calls
    }

    /// The effective finish reason: tool calls win over whatever the upstream
    /// reported, and a missing report defaults to a clean stop.
    #[must_use]
    pub fn finish_reason(&self) -> FinishReason {
        if !self.tool_calls.is_empty() {
            return FinishReason::ToolCalls;
        }
        self.finish_reason.unwrap_or(FinishReason::Stop)
    }

    #[must_use]
    pub fn usage(&self) -> ChunkUsage {
        self.usage.unwrap_or_default()
    }
}
