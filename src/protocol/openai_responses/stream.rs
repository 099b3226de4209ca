//! Responses API SSE re-emission: output-item event ladder.

use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::protocol::chunk::{ChunkAccumulator, StreamChunk, ToolCallDelta};
use crate::stream::sse::responses_sse_frame;

struct OpenMessageItem {
    item_id: String,
    output_index: usize,
    text: String,
}

struct OpenToolItem {
    item_id: String,
    output_index: usize,
    call_id: String,
    name: String,
    arguments: String,
}

/// Stateful encoder for one streaming Responses reply.
pub struct ResponsesSseEncoder {
    response_id: String,
    model: String,
    created_at: u64,
    started: bool,
    finished: bool,
    output_index: usize,
    message_item: Option<OpenMessageItem>,
    tool_item: Option<OpenToolItem>,
    acc: ChunkAccumulator,
}

impl ResponsesSseEncoder {
    #[must_use]
    pub fn new(response_id: String, model: String, created_at: u64) -> Self {
        Self {
            response_id,
            model,
            created_at,
            started: false,
            finished: false,
            output_index: 0,
            message_item: None,
            tool_item: None,
            acc: ChunkAccumulator::new(),
        }
    }

    /// Encode one normalized chunk into zero or more SSE frames.
    #[must_use]
    pub fn encode(&mut self, chunk: &StreamChunk) -> Vec<String> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.acc.push(chunk);

        if let Some(delta) = &chunk.delta {
            if let Some(content) = &delta.content {
                // Reasoning text has no Responses representation.
                if !delta.thought && !content.is_empty() {
                    self.push_text_delta(content, &mut events);
                }
            }
            for tool_call in &delta.tool_calls {
                self.push_tool_call(tool_call, &mut events);
            }
        }

        if chunk.finish_reason.is_some() {
            self.push_completed(&mut events);
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
        self.push_completed(&mut events);
        events
    }

    /// Final error event for a stream whose headers are already out.
    #[must_use]
    pub fn encode_error(&mut self, err: &ProxyError) -> String {
        self.finished = true;
        responses_sse_frame(
            "error",
            &json!({ "type": "error", "message": err.to_string() }).to_string(),
        )
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ensure_started(&mut self, events: &mut Vec<String>) {
        if self.started {
            return;
        }
        self.started = true;
        let envelope = json!({
            "id": self.response_id,
            "object": "response",
            "created_at": self.created_at,
            "status": "in_progress",
            "model": self.model,
            "output": []
        });
        self.emit(
            events,
            "response.created",
            json!({ "type": "response.created", "response": envelope }),
        );
        self.emit(
            events,
            "response.in_progress",
            json!({ "type": "response.in_progress", "response": envelope }),
        );
    }

    fn push_text_delta(&mut self, content: &str, events: &mut Vec<String>) {
        self.ensure_started(events);
        self.close_tool_item(events);

        if self.message_item.is_none() {
            let output_index = self.output_index;
            self.output_index += 1;
            let item_id = format!("{}-msg-{output_index}", self.response_id);
            self.emit(
                events,
                "response.output_item.added",
                json!({
                    "type": "response.output_item.added",
                    "output_index": output_index,
                    "item": {
                        "id": item_id,
                        "type": "message",
                        "status": "in_progress",
                        "role": "assistant",
                        "content": []
                    }
                }),
            );
            self.emit(
                events,
                "response.content_part.added",
                json!({
                    "type": "response.content_part.added",
                    "item_id": item_id,
                    "output_index": output_index,
                    "content_index": 0,
                    "part": { "type": "output_text", "text": "", "annotations": [] }
                }),
            );
            self.message_item = Some(OpenMessageItem {
                item_id,
                output_index,
                text: String::new(),
            });
        }

        let item = self.message_item.as_mut().expect("message item just opened");
        item.text.push_str(content);
        let payload = json!({
            "type": "response.output_text.delta",
            "item_id": item.item_id,
            "output_index": item.output_index,
            "content_index": 0,
            "delta": content
        });
        self.emit(events, "response.output_text.delta", payload);
    }

    fn push_tool_call(&mut self, tool_call: &ToolCallDelta, events: &mut Vec<String>) {
        self.ensure_started(events);

        let opens_new_item = tool_call.name.is_some() || self.tool_item.is_none();
        if opens_new_item {
            self.close_message_item(events);
            self.close_tool_item(events);

            let output_index = self.output_index;
            self.output_index += 1;
            let call_id = tool_call.id.clone().unwrap_or_else(crate::util::next_call_id);
            let name = tool_call.name.clone().unwrap_or_default();
            let item_id = format!("{}-fc-{output_index}", self.response_id);
            self.emit(
                events,
                "response.output_item.added",
                json!({
                    "type": "response.output_item.added",
                    "output_index": output_index,
                    "item": {
                        "id": item_id,
                        "type": "function_call",
                        "status": "in_progress",
                        "call_id": call_id,
                        "name": name,
                        "arguments": ""
                    }
                }),
            );
            self.tool_item = Some(OpenToolItem {
                item_id,
                output_index,
                call_id,
                name,
                arguments: String::new(),
            });
        }

        if let Some(arguments) = tool_call.arguments.as_deref() {
            if !arguments.is_empty() {
                let item = self.tool_item.as_mut().expect("tool item just opened");
                item.arguments.push_str(arguments);
                let payload = json!({
                    "type": "response.function_call_arguments.delta",
                    "item_id": item.item_id,
                    "output_index": item.output_index,
                    "delta": arguments
                });
                self.emit(events, "response.function_call_arguments.delta", payload);
            }
        }
    }

    fn close_message_item(&mut self, events: &mut Vec<String>) {
        let Some(item) = self.message_item.take() else {
            return;
        };
        self.emit(
            events,
            "response.output_text.done",
            json!({
                "type": "response.output_text.done",
                "item_id": item.item_id,
                "output_index": item.output_index,
                "content_index": 0,
                "text": item.text
            }),
        );
        self.emit(
            events,
            "response.content_part.done",
            json!({
                "type": "response.content_part.done",
                "item_id": item.item_id,
                "output_index": item.output_index,
                "content_index": 0,
                "part": { "type": "output_text", "text": item.text, "annotations": [] }
            }),
        );
        self.emit(
            events,
            "response.output_item.done",
            json!({
                "type": "response.output_item.done",
                "output_index": item.output_index,
                "item": {
                    "id": item.item_id,
                    "type": "message",
                    "status": "completed",
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": item.text, "annotations": [] }]
                }
            }),
        );
    }

    fn close_tool_item(&mut self, events: &mut Vec<String>) {
        let Some(item) = self.tool_item.take() else {
            return;
        };
        self.emit(
            events,
            "response.function_call_arguments.done",
            json!({
                "type": "response.function_call_arguments.done",
                "item_id": item.item_id,
                "output_index": item.output_index,
                "arguments": item.arguments
            }),
        );
        self.emit(
            events,
            "response.output_item.done",
            json!({
                "type": "response.output_item.done",
                "output_index": item.output_index,
                "item": {
                    "id": item.item_id,
                    "type": "function_call",
                    "status": "completed",
                    "call_id": item.call_id,
                    "name": item.name,
                    "arguments": item.arguments
                }
            }),
        );
    }

    fn push_completed(&mut self, events: &mut Vec<String>) {
        self.ensure_started(events);
        self.close_message_item(events);
        self.close_tool_item(events);
        let body = super::response::encode_responses_response(
            &self.acc,
            &self.model,
            &self.response_id,
            self.created_at,
        );
        self.emit(
            events,
            "response.completed",
            json!({ "type": "response.completed", "response": body }),
        );
        self.finished = true;
    }

    fn emit(&self, events: &mut Vec<String>, name: &str, body: Value) {
        events.push(responses_sse_frame(name, &body.to_string()));
    }
}
