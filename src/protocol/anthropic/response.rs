//! Buffered (non-streaming) Anthropic Messages response encoding.

use serde_json::{json, Value};

use crate::protocol::chunk::ChunkAccumulator;
use crate::protocol::mapping::parse_tool_arguments;
use crate::util::next_toolu_id;

/// Text block substituted when the upstream produced nothing at all.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "[No response received - please try again]";

/// Pick the wire id for a tool_use block: ids already in Anthropic form are
/// reused, everything else gets a fresh `toolu_` id.
#[must_use]
pub(crate) fn wire_tool_use_id(normalized_id: &str) -> String {
    if normalized_id.starts_with("toolu_") {
        normalized_id.to_string()
    } else {
        next_toolu_id()
    }
}

/// Assemble the final `message` object from an accumulated stream.
#[must_use]
pub fn encode_messages_response(acc: &ChunkAccumulator, model: &str, id: &str) -> Value {
    let mut content = Vec::new();

    if !acc.thinking().is_empty() {
        content.push(json!({
            "type": "thinking",
            "thinking": acc.thinking(),
            "signature": acc.thinking_signature().unwrap_or(""),
        }));
    }
    if !acc.text().is_empty() {
        content.push(json!({ "type": "text", "text": acc.text() }));
    }
    for call in acc.tool_calls() {
        content.push(json!({
            "type": "tool_use",
            "id": wire_tool_use_id(&call.id),
            "name": call.name,
            "input": parse_tool_arguments(&call.arguments),
        }));
    }
    if content.is_empty() {
        content.push(json!({ "type": "text", "text": EMPTY_RESPONSE_PLACEHOLDER }));
    }

    let usage = acc.usage();
    json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": acc.finish_reason().as_anthropic_str(),
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
        }
    })
}

/// The `/v1/models` listing body, Anthropic shape.
#[must_use]
pub fn encode_model_list(models: &[&str]) -> Value {
    let data: Vec<Value> = models
        .iter()
        .map(|id| json!({ "type": "model", "id": id, "display_name": id }))
        .collect();
    json!({ "data": data, "has_more": false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chunk::{ChunkDelta, ChunkUsage, FinishReason, StreamChunk, ToolCallDelta};

    #[test]
    fn text_response_is_end_turn() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            role: Some("assistant"),
            content: Some("Hello".into()),
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::terminal(
            FinishReason::Stop,
            Some(ChunkUsage {
                prompt_tokens: 2,
                completion_tokens: 4,
            }),
        ));
        let body = encode_messages_response(&acc, "claude-3-5-sonnet-20241022", "msg_1");
        assert_eq!(body["type"], "message");
        assert_eq!(body["stop_reason"], "end_turn");
        assert_eq!(body["content"][0]["type"], "text");
        assert_eq!(body["usage"]["output_tokens"], 4);
    }

    #[test]
    fn tool_calls_become_tool_use_blocks_with_parsed_input() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_x".into()),
                name: Some("get_weather".into()),
                arguments: Some("{\"city\":\"Paris\"}".into()),
                thought_signature: None,
            }],
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::terminal(FinishReason::ToolCalls, None));

        let body = encode_messages_response(&acc, "claude-x", "msg_2");
        assert_eq!(body["stop_reason"], "tool_use");
        let block = &body["content"][0];
        assert_eq!(block["type"], "tool_use");
        assert!(block["id"].as_str().unwrap().starts_with("toolu_"));
        assert_eq!(block["input"]["city"], "Paris");
    }

    #[test]
    fn length_truncation_is_max_tokens() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            content: Some("partial".into()),
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::terminal(FinishReason::Length, None));
        let body = encode_messages_response(&acc, "claude-x", "msg_3");
        assert_eq!(body["stop_reason"], "max_tokens");
    }

    #[test]
    fn empty_response_gets_placeholder() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::terminal(FinishReason::Stop, None));
        let body = encode_messages_response(&acc, "claude-x", "msg_4");
        assert_eq!(body["content"][0]["text"], EMPTY_RESPONSE_PLACEHOLDER);
    }

    #[test]
    fn thinking_block_leads_and_carries_signature() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            content: Some("pondering".into()),
            thought: true,
            thinking_start: true,
            thought_signature: Some("s".repeat(120)),
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            content: Some("done".into()),
            thinking_end: true,
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::terminal(FinishReason::Stop, None));
        let body = encode_messages_response(&acc, "claude-x", "msg_5");
        assert_eq!(body["content"][0]["type"], "thinking");
        assert_eq!(body["content"][0]["thinking"], "pondering");
        assert_eq!(body["content"][1]["type"], "text");
    }
}
