//! OpenAI chat.completion.chunk SSE re-emission.

use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::protocol::chunk::StreamChunk;
use crate::stream::sse::{done_frame, openai_sse_frame};

/// Per-request encoder for the OpenAI streaming wire.
///
/// The shared `id` and `created` come from the request context so every
/// chunk of one response carries the same envelope.
pub struct OpenAiChatSseEncoder {
    id: String,
    model: String,
    created: u64,
    role_sent: bool,
}

impl OpenAiChatSseEncoder {
    #[must_use]
    pub fn new(id: String, model: String, created: u64) -> Self {
        Self {
            id,
            model,
            created,
            role_sent: false,
        }
    }

    /// Encode one normalized chunk as an SSE frame.
    ///
    /// Thinking deltas and bare lifecycle markers have no representation on
    /// this wire and yield `None`.
    #[must_use]
    pub fn encode(&mut self, chunk: &StreamChunk) -> Option<String> {
        let mut delta = serde_json::Map::new();

        if let Some(chunk_delta) = &chunk.delta {
            if chunk_delta.thought {
                // Reasoning text never reaches the chat-completions wire.
                if chunk.finish_reason.is_none() {
                    return None;
                }
            } else {
                if let Some(content) = &chunk_delta.content {
                    delta.insert("content".to_string(), Value::String(content.clone()));
                }
                if !chunk_delta.tool_calls.is_empty() {
                    let calls: Vec<Value> = chunk_delta
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            let mut function = serde_json::Map::new();
                            if let Some(name) = &tc.name {
                                function
                                    .insert("name".to_string(), Value::String(name.clone()));
                            }
                            if let Some(arguments) = &tc.arguments {
                                function.insert(
                                    "arguments".to_string(),
                                    Value::String(arguments.clone()),
                                );
                            }
                            let mut call = serde_json::Map::new();
                            call.insert("index".to_string(), json!(tc.index));
                            if let Some(id) = &tc.id {
                                call.insert("id".to_string(), Value::String(id.clone()));
                                call.insert(
                                    "type".to_string(),
                                    Value::String("function".to_string()),
                                );
                            }
                            call.insert("function".to_string(), Value::Object(function));
                            Value::Object(call)
                        })
                        .collect();
                    delta.insert("tool_calls".to_string(), Value::Array(calls));
                }
            }
        }

        if delta.is_empty() && chunk.finish_reason.is_none() && chunk.usage.is_none() {
            // Pure thinking-lifecycle marker; nothing to put on this wire.
            return None;
        }

        // The first frame that carries a delta names the role, even when a
        // suppressed thinking prefix consumed the chunk that originally did.
        if !delta.is_empty() && !self.role_sent {
            delta.insert(
                "role".to_string(),
                Value::String("assistant".to_string()),
            );
            self.role_sent = true;
        }

        let mut body = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": Value::Object(delta),
                "finish_reason": match chunk.finish_reason {
                    Some(reason) => Value::String(reason.as_openai_str().to_string()),
                    None => Value::Null,
                },
            }],
        });
        if let Some(usage) = chunk.usage {
            body["usage"] = json!({
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total(),
            });
        }

        Some(openai_sse_frame(&body.to_string()))
    }

    /// Final error event for a stream whose headers are already out.
    #[must_use]
    pub fn encode_error(&self, err: &ProxyError) -> String {
        let body = json!({ "error": { "message": err.to_string() } });
        openai_sse_frame(&body.to_string())
    }

    /// The terminal `[DONE]` sentinel.
    #[must_use]
    pub fn done(&self) -> String {
        done_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chunk::{ChunkDelta, ChunkUsage, FinishReason, ToolCallDelta};

    fn encoder() -> OpenAiChatSseEncoder {
        OpenAiChatSseEncoder::new("chatcmpl-1".into(), "gemini-2.5-flash".into(), 1700000000)
    }

    fn parse_frame(frame: &str) -> serde_json::Value {
        let data = frame.strip_prefix("data: ").unwrap().trim_end();
        serde_json::from_str(data).unwrap()
    }

    #[test]
    fn first_text_chunk_carries_role() {
        let chunk = StreamChunk::with_delta(ChunkDelta {
            role: Some("assistant"),
            content: Some("Hi ".into()),
            ..ChunkDelta::default()
        });
        let mut encoder = encoder();
        let frame = encoder.encode(&chunk).unwrap();
        let body = parse_frame(&frame);
        assert_eq!(body["object"], "chat.completion.chunk");
        assert_eq!(body["id"], "chatcmpl-1");
        assert_eq!(body["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(body["choices"][0]["delta"]["content"], "Hi ");
        assert!(body["choices"][0]["finish_reason"].is_null());

        // Role appears once, not on later frames.
        let frame = encoder
            .encode(&StreamChunk::with_delta(ChunkDelta {
                content: Some("there".into()),
                ..ChunkDelta::default()
            }))
            .unwrap();
        let body = parse_frame(&frame);
        assert!(body["choices"][0]["delta"].get("role").is_none());
    }

    #[test]
    fn role_recovers_when_stream_opens_with_thinking() {
        let mut encoder = encoder();
        assert!(encoder
            .encode(&StreamChunk::with_delta(ChunkDelta {
                role: Some("assistant"),
                content: Some("pondering".into()),
                thought: true,
                thinking_start: true,
                ..ChunkDelta::default()
            }))
            .is_none());
        let frame = encoder
            .encode(&StreamChunk::with_delta(ChunkDelta {
                content: Some("visible".into()),
                thinking_end: true,
                ..ChunkDelta::default()
            }))
            .unwrap();
        let body = parse_frame(&frame);
        assert_eq!(body["choices"][0]["delta"]["role"], "assistant");
    }

    #[test]
    fn thinking_deltas_are_suppressed() {
        let chunk = StreamChunk::with_delta(ChunkDelta {
            content: Some("let me think".into()),
            thought: true,
            thinking_start: true,
            ..ChunkDelta::default()
        });
        assert!(encoder().encode(&chunk).is_none());

        let marker = StreamChunk::with_delta(ChunkDelta {
            thinking_end: true,
            ..ChunkDelta::default()
        });
        assert!(encoder().encode(&marker).is_none());
    }

    #[test]
    fn terminal_chunk_carries_finish_reason_and_usage() {
        let chunk = StreamChunk::terminal(
            FinishReason::Stop,
            Some(ChunkUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
            }),
        );
        let frame = encoder().encode(&chunk).unwrap();
        let body = parse_frame(&frame);
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["usage"]["total_tokens"], 3);
        assert_eq!(encoder().done(), "data: [DONE]\n\n");
    }

    #[test]
    fn tool_call_deltas_pass_through() {
        let chunk = StreamChunk::with_delta(ChunkDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("get_weather".into()),
                arguments: Some("{\"city\":\"Paris\"}".into()),
                thought_signature: None,
            }],
            ..ChunkDelta::default()
        });
        let frame = encoder().encode(&chunk).unwrap();
        let body = parse_frame(&frame);
        let call = &body["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "get_weather");
        assert_eq!(call["function"]["arguments"], "{\"city\":\"Paris\"}");
    }

    #[test]
    fn error_event_shape() {
        let err = ProxyError::Upstream {
            status: 500,
            message: "boom".into(),
        };
        let frame = encoder().encode_error(&err);
        let body = parse_frame(&frame);
        assert!(body["error"]["message"].as_str().unwrap().contains("boom"));
    }
}
