//! Buffered (non-streaming) OpenAI chat.completion encoding.

use serde_json::{json, Value};

use crate::protocol::chunk::ChunkAccumulator;

/// Assemble the final `chat.completion` object from an accumulated stream.
#[must_use]
pub fn encode_chat_response(
    acc: &ChunkAccumulator,
    model: &str,
    id: &str,
    created: u64,
) -> Value {
    let tool_calls: Vec<Value> = acc
        .tool_calls()
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments }
            })
        })
        .collect();

    let mut message = json!({
        "role": "assistant",
        "content": if acc.text().is_empty() && !tool_calls.is_empty() {
            Value::Null
        } else {
            Value::String(acc.text().to_string())
        }
    });
    if !tool_calls.is_empty() {
        message["tool_calls"] = Value::Array(tool_calls);
    }

    let usage = acc.usage();
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": acc.finish_reason().as_openai_str(),
        }],
        "usage": {
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "total_tokens": usage.total(),
        }
    })
}

/// The `/v1/models` listing body.
#[must_use]
pub fn encode_model_list(models: &[&str]) -> Value {
    let data: Vec<Value> = models
        .iter()
        .map(|id| json!({ "id": id, "object": "model", "owned_by": "google" }))
        .collect();
    json!({ "object": "list", "data": data })
}
