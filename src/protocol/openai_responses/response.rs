//! Buffered (non-streaming) Responses API encoding.

use serde_json::{json, Value};

use crate::protocol::chunk::ChunkAccumulator;

/// Assemble the final `response` object from an accumulated stream.
#[must_use]
pub fn encode_responses_response(
    acc: &ChunkAccumulator,
    model: &str,
    id: &str,
    created_at: u64,
) -> Value {
    let mut output = Vec::new();

    if !acc.text().is_empty() {
        output.push(json!({
            "type": "message",
            "id": format!("{id}-msg"),
            "status": "completed",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": acc.text(), "annotations": [] }]
        }));
    }
    for call in acc.tool_calls() {
        output.push(json!({
            "type": "function_call",
            "id": format!("{id}-fc-{}", call.id),
            "status": "completed",
            "call_id": call.id,
            "name": call.name,
            "arguments": call.arguments,
        }));
    }

    let usage = acc.usage();
    json!({
        "id": id,
        "object": "response",
        "created_at": created_at,
        "status": "completed",
        "model": model,
        "output": output,
        "usage": {
            "input_tokens": usage.prompt_tokens,
            "output_tokens": usage.completion_tokens,
            "total_tokens": usage.total(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chunk::{ChunkDelta, FinishReason, StreamChunk, ToolCallDelta};

    #[test]
    fn text_and_tool_items_appear_in_order() {
        let mut acc = ChunkAccumulator::new();
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            role: Some("assistant"),
            content: Some("ok".into()),
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::with_delta(ChunkDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("t".into()),
                arguments: Some("{}".into()),
                thought_signature: None,
            }],
            ..ChunkDelta::default()
        }));
        acc.push(&StreamChunk::terminal(FinishReason::ToolCalls, None));

        let body = encode_responses_response(&acc, "gemini-2.5-pro", "resp_1", 1);
        assert_eq!(body["object"], "response");
        assert_eq!(body["status"], "completed");
        assert_eq!(body["output"][0]["type"], "message");
        assert_eq!(body["output"][0]["content"][0]["text"], "ok");
        assert_eq!(body["output"][1]["type"], "function_call");
        assert_eq!(body["output"][1]["call_id"], "call_1");
    }
}
