//! Responses API request -> Gemini request translation.
//!
//! The Responses input-item list is first adapted into chat-completions
//! messages (grouping adjacent `function_call` items into one assistant
//! message, splitting `function_call_output` items into tool messages), then
//! run through the chat mapper.

use serde_json::Value;

use crate::error::ProxyError;
use crate::protocol::gemini::GeminiRequest;
use crate::protocol::openai_chat::request::map_chat_request;
use crate::protocol::openai_chat::{
    OpenAiChatRequest, OpenAiFunctionCall, OpenAiFunctionDef, OpenAiMessage, OpenAiTool,
    OpenAiToolCall, OpenAiToolChoice, OpenAiToolChoiceFunction, OpenAiToolChoiceFunctionName,
};
use crate::state::signature_cache::SignatureCache;

use super::ResponsesRequest;

/// Translate a Responses API request into a Gemini request body.
///
/// # Errors
///
/// Returns `ProxyError::InvalidRequest` when `input` is missing or empty.
pub fn map_responses_request(
    request: &ResponsesRequest,
    signatures: &SignatureCache,
) -> Result<GeminiRequest, ProxyError> {
    let chat = adapt_to_chat(request)?;
    map_chat_request(&chat, signatures)
}

/// Build the equivalent chat-completions request.
pub fn adapt_to_chat(request: &ResponsesRequest) -> Result<OpenAiChatRequest, ProxyError> {
    let mut messages = Vec::new();

    if let Some(instructions) = request.instructions.as_deref() {
        if !instructions.is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(Value::String(instructions.to_string())),
                ..OpenAiMessage::default()
            });
        }
    }

    match &request.input {
        Value::String(text) => {
            messages.push(OpenAiMessage {
                role: "user".to_string(),
                content: Some(Value::String(text.clone())),
                ..OpenAiMessage::default()
            });
        }
        Value::Array(items) => adapt_items(items, &mut messages),
        _ => return Err(ProxyError::InvalidRequest("input is required".into())),
    }

    if messages.is_empty() {
        return Err(ProxyError::InvalidRequest("input is required".into()));
    }

    Ok(OpenAiChatRequest {
        model: request.model.clone(),
        messages,
        tools: adapt_tools(request.tools.as_deref()),
        tool_choice: adapt_tool_choice(request.tool_choice.as_ref()),
        stream: request.stream,
        temperature: request.temperature,
        max_tokens: request.max_output_tokens,
        max_completion_tokens: None,
        reasoning_effort: request
            .reasoning
            .as_ref()
            .and_then(|reasoning| reasoning.effort.clone()),
        extra: serde_json::Map::new(),
    })
}

fn adapt_items(items: &[Value], messages: &mut Vec<OpenAiMessage>) {
    let mut pending_calls: Vec<OpenAiToolCall> = Vec::new();

    for item in items {
        let item_type = item.get("type").and_then(Value::as_str);
        match item_type {
            Some("function_call") => {
                pending_calls.push(OpenAiToolCall {
                    id: item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    type_: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: item
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: item
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                    },
                });
                continue;
            }
            _ => flush_pending_calls(&mut pending_calls, messages),
        }

        match item_type {
            Some("function_call_output") => {
                messages.push(OpenAiMessage {
                    role: "tool".to_string(),
                    tool_call_id: item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    content: Some(
                        item.get("output")
                            .cloned()
                            .unwrap_or(Value::String(String::new())),
                    ),
                    ..OpenAiMessage::default()
                });
            }
            Some("message") | None => {
                let role = item
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("user")
                    .to_string();
                messages.push(OpenAiMessage {
                    role,
                    content: item.get("content").map(adapt_content),
                    ..OpenAiMessage::default()
                });
            }
            _ => {}
        }
    }
    flush_pending_calls(&mut pending_calls, messages);
}

fn flush_pending_calls(pending: &mut Vec<OpenAiToolCall>, messages: &mut Vec<OpenAiMessage>) {
    if pending.is_empty() {
        return;
    }
    messages.push(OpenAiMessage {
        role: "assistant".to_string(),
        content: None,
        tool_calls: Some(std::mem::take(pending)),
        ..OpenAiMessage::default()
    });
}

/// Responses content parts use `input_text` / `output_text` / `input_image`;
/// rewrite them into the chat part vocabulary.
fn adapt_content(content: &Value) -> Value {
    match content {
        Value::Array(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part.get("type").and_then(Value::as_str) {
                    Some("input_text") | Some("output_text") => serde_json::json!({
                        "type": "text",
                        "text": part.get("text").and_then(Value::as_str).unwrap_or_default()
                    }),
                    Some("input_image") => serde_json::json!({
                        "type": "image_url",
                        "image_url": {
                            "url": part.get("image_url").and_then(Value::as_str).unwrap_or_default()
                        }
                    }),
                    _ => part.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn adapt_tools(tools: Option<&[Value]>) -> Option<Vec<OpenAiTool>> {
    let tools = tools?;
    let adapted: Vec<OpenAiTool> = tools
        .iter()
        .filter_map(|tool| {
            if tool.get("type").and_then(Value::as_str) != Some("function") {
                return None;
            }
            // Flat Responses layout; tolerate the nested chat layout too.
            let function = tool.get("function").unwrap_or(tool);
            Some(OpenAiTool {
                type_: "function".to_string(),
                function: OpenAiFunctionDef {
                    name: function
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    description: function
                        .get("description")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    parameters: function.get("parameters").cloned(),
                },
            })
        })
        .collect();
    if adapted.is_empty() {
        None
    } else {
        Some(adapted)
    }
}

fn adapt_tool_choice(choice: Option<&Value>) -> Option<OpenAiToolChoice> {
    let choice = choice?;
    match choice {
        Value::String(mode) => Some(OpenAiToolChoice::Mode(mode.clone())),
        Value::Object(map) => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| {
                    map.get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                })?;
            Some(OpenAiToolChoice::Function(OpenAiToolChoiceFunction {
                type_: "function".to_string(),
                function: OpenAiToolChoiceFunctionName {
                    name: name.to_string(),
                },
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(request: serde_json::Value) -> ResponsesRequest {
        serde_json::from_value(request).unwrap()
    }

    #[test]
    fn string_input_becomes_one_user_message() {
        let request = parse(json!({ "model": "gemini-2.5-pro", "input": "hi" }));
        let chat = adapt_to_chat(&request).unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, "user");
    }

    #[test]
    fn instructions_become_a_system_message() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "input": "hi",
            "instructions": "Be terse."
        }));
        let chat = adapt_to_chat(&request).unwrap();
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].role, "user");
    }

    #[test]
    fn adjacent_function_calls_group_into_one_assistant_message() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "input": [
                { "role": "user", "content": "do two things" },
                { "type": "function_call", "call_id": "call_a", "name": "f", "arguments": "{}" },
                { "type": "function_call", "call_id": "call_b", "name": "g", "arguments": "{\"x\":1}" },
                { "type": "function_call_output", "call_id": "call_a", "output": "ok-a" },
                { "type": "function_call_output", "call_id": "call_b", "output": "ok-b" }
            ]
        }));
        let chat = adapt_to_chat(&request).unwrap();
        assert_eq!(chat.messages.len(), 4);
        let calls = chat.messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].function.name, "g");
        assert_eq!(chat.messages[2].role, "tool");
        assert_eq!(chat.messages[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(chat.messages[3].tool_call_id.as_deref(), Some("call_b"));
    }

    #[test]
    fn separated_function_calls_do_not_group() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "input": [
                { "type": "function_call", "call_id": "call_a", "name": "f", "arguments": "{}" },
                { "type": "function_call_output", "call_id": "call_a", "output": "ok" },
                { "type": "function_call", "call_id": "call_b", "name": "g", "arguments": "{}" }
            ]
        }));
        let chat = adapt_to_chat(&request).unwrap();
        assert_eq!(chat.messages.len(), 3);
        assert_eq!(chat.messages[0].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(chat.messages[2].tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn input_text_parts_are_rewritten() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "input": [{
                "role": "user",
                "content": [
                    { "type": "input_text", "text": "look at this" },
                    { "type": "input_image", "image_url": "data:image/png;base64,QUJD" }
                ]
            }]
        }));
        let mapped = map_responses_request(&request, &SignatureCache::new()).unwrap();
        let parts = &mapped.contents[0].parts;
        assert_eq!(parts[0].text.as_deref(), Some("look at this\n"));
        assert!(parts[1].inline_data.is_some());
    }

    #[test]
    fn flat_tools_and_reasoning_effort_map_through() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "input": "hi",
            "tools": [{ "type": "function", "name": "t", "parameters": { "type": "object" } }],
            "tool_choice": "auto",
            "reasoning": { "effort": "medium" }
        }));
        let mapped = map_responses_request(&request, &SignatureCache::new()).unwrap();
        let declarations = &mapped.tools.unwrap()[0].function_declarations;
        assert_eq!(declarations[0].name, "t");
        assert_eq!(
            mapped.tool_config.unwrap().function_calling_config.mode,
            "AUTO"
        );
        assert_eq!(
            mapped
                .generation_config
                .unwrap()
                .thinking_config
                .unwrap()
                .thinking_budget,
            8192
        );
    }

    #[test]
    fn missing_input_is_invalid() {
        let request = parse(json!({ "model": "gemini-2.5-pro", "input": [] }));
        assert!(matches!(
            map_responses_request(&request, &SignatureCache::new()),
            Err(ProxyError::InvalidRequest(_))
        ));
    }
}
