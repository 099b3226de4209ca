//! Anthropic Messages request -> Gemini request translation.

use serde_json::Value;

use crate::error::ProxyError;
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionCallingConfig, GeminiFunctionDeclaration, GeminiGenerationConfig,
    GeminiPart, GeminiRequest, GeminiThinkingConfig, GeminiToolConfig, GeminiToolDeclaration,
};
use crate::protocol::mapping::{pad_empty_turn, push_text_part};
use crate::schema::normalize_tool_schema;

use super::{AnthropicMessage, AnthropicRequest};

/// Placeholder signature for tool_use parts echoed from history. The
/// upstream validator insists on a signature for every functionCall from a
/// thinking model; prior-turn thinking blocks are dropped from the rebuilt
/// history, so the real one is gone.
pub const SKIP_SIGNATURE: &str = "skip_thought_signature_validator";

/// Appended to the system instruction when tools are declared; quiets the
/// upstream validator for thinking models that interleave tool calls.
const INTERLEAVED_THINKING_HINT: &str =
    "Interleaved thinking is enabled: you may reason between tool calls, and \
     reasoning may continue after tool results arrive.";

/// Translate an Anthropic Messages request into a Gemini request body.
///
/// # Errors
///
/// Returns `ProxyError::InvalidRequest` when `max_tokens` is absent or
/// `messages` is empty.
pub fn map_messages_request(request: &AnthropicRequest) -> Result<GeminiRequest, ProxyError> {
    let Some(max_tokens) = request.max_tokens else {
        return Err(ProxyError::InvalidRequest("max_tokens is required".into()));
    };
    if request.messages.is_empty() {
        return Err(ProxyError::InvalidRequest("messages is required".into()));
    }

    let mut system_text = collect_system_text(request.system.as_ref());
    let has_tools = request.tools.as_deref().is_some_and(|tools| !tools.is_empty());
    if has_tools {
        if !system_text.is_empty() {
            system_text.push('\n');
        }
        system_text.push_str(INTERLEAVED_THINKING_HINT);
    }

    let mut contents = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        contents.push(map_message(message, &request.messages));
    }

    let generation_config = Some(GeminiGenerationConfig {
        temperature: request.temperature,
        top_p: None,
        max_output_tokens: Some(max_tokens),
        thinking_config: map_thinking(request),
    });

    Ok(GeminiRequest {
        contents,
        system_instruction: if system_text.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(system_text)],
            })
        },
        tools: map_tools(request),
        tool_config: map_tool_choice(request.tool_choice.as_ref()),
        generation_config,
        session_id: None,
    })
}

fn collect_system_text(system: Option<&Value>) -> String {
    let mut out = String::new();
    match system {
        Some(Value::String(text)) => out.push_str(text),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
        }
        _ => {}
    }
    out
}

fn map_message(message: &AnthropicMessage, history: &[AnthropicMessage]) -> GeminiContent {
    let is_assistant = message.role == "assistant";
    let mut parts = Vec::new();

    match &message.content {
        Value::String(text) => {
            if !text.is_empty() {
                push_text_part(&mut parts, text, false);
            }
        }
        Value::Array(blocks) => {
            let multi = blocks.len() > 1;
            for block in blocks {
                map_block(block, is_assistant, multi, history, &mut parts);
            }
        }
        _ => {}
    }

    // A turn of nothing but dropped thinking blocks still needs a part.
    pad_empty_turn(&mut parts);
    GeminiContent {
        role: Some(if is_assistant { "model" } else { "user" }.to_string()),
        parts,
    }
}

fn map_block(
    block: &Value,
    is_assistant: bool,
    multi: bool,
    history: &[AnthropicMessage],
    parts: &mut Vec<GeminiPart>,
) {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    push_text_part(parts, text, multi);
                }
            }
        }
        Some("image") => {
            let source = block.get("source");
            let media_type = source
                .and_then(|s| s.get("media_type"))
                .and_then(Value::as_str);
            let data = source.and_then(|s| s.get("data")).and_then(Value::as_str);
            if let (Some(media_type), Some(data)) = (media_type, data) {
                parts.push(GeminiPart::inline_data(media_type, data));
            }
        }
        Some("thinking") | Some("redacted_thinking") => {
            // Prior-turn reasoning is not replayed; the upstream re-derives it.
        }
        Some("tool_use") if is_assistant => {
            let name = block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let args = block.get("input").cloned().unwrap_or(Value::Object(
                serde_json::Map::new(),
            ));
            let mut part = GeminiPart::function_call(name, args);
            part.thought_signature = Some(SKIP_SIGNATURE.to_string());
            parts.push(part);
        }
        Some("tool_result") => {
            let tool_use_id = block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name =
                find_tool_name(history, tool_use_id).unwrap_or_else(|| tool_use_id.to_string());
            parts.push(GeminiPart::function_response(
                name,
                tool_result_value(block.get("content")),
            ));
        }
        _ => {}
    }
}

/// Shape a `tool_result` payload: array content joins its text sub-parts
/// with `\n`, strings pass through, and an empty result reads as success.
fn tool_result_value(content: Option<&Value>) -> Value {
    let result = match content {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Array(items)) => {
            let mut joined = String::new();
            for item in items {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    if !joined.is_empty() {
                        joined.push('\n');
                    }
                    joined.push_str(text);
                }
            }
            if joined.is_empty() {
                "Success".to_string()
            } else {
                joined
            }
        }
        Some(Value::String(_)) | None => "Success".to_string(),
        Some(other) => other.to_string(),
    };
    serde_json::json!({ "result": result })
}

fn find_tool_name(history: &[AnthropicMessage], tool_use_id: &str) -> Option<String> {
    for message in history {
        let Value::Array(blocks) = &message.content else {
            continue;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use")
                && block.get("id").and_then(Value::as_str) == Some(tool_use_id)
            {
                return block
                    .get("name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
            }
        }
    }
    None
}

fn map_tools(request: &AnthropicRequest) -> Option<Vec<GeminiToolDeclaration>> {
    let tools = request.tools.as_deref()?;
    if tools.is_empty() {
        return None;
    }
    Some(vec![GeminiToolDeclaration {
        function_declarations: tools
            .iter()
            .map(|tool| GeminiFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: Some(normalize_tool_schema(&tool.input_schema)),
            })
            .collect(),
    }])
}

fn map_tool_choice(choice: Option<&Value>) -> Option<GeminiToolConfig> {
    let choice = choice?;
    let mode = choice.get("type").and_then(Value::as_str)?;
    let config = match mode {
        "none" => GeminiFunctionCallingConfig {
            mode: "NONE".to_string(),
            allowed_function_names: None,
        },
        "any" => GeminiFunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: None,
        },
        "tool" => GeminiFunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: choice
                .get("name")
                .and_then(Value::as_str)
                .map(|name| vec![name.to_string()]),
        },
        _ => GeminiFunctionCallingConfig {
            mode: "AUTO".to_string(),
            allowed_function_names: None,
        },
    };
    Some(GeminiToolConfig {
        function_calling_config: config,
    })
}

fn map_thinking(request: &AnthropicRequest) -> Option<GeminiThinkingConfig> {
    let thinking = request.thinking.as_ref()?;
    if thinking.type_ != "enabled" {
        return None;
    }
    Some(GeminiThinkingConfig {
        thinking_budget: thinking.budget_tokens.unwrap_or(8192),
        include_thoughts: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(request: serde_json::Value) -> AnthropicRequest {
        serde_json::from_value(request).unwrap()
    }

    #[test]
    fn missing_max_tokens_is_invalid() {
        let request = parse(json!({
            "model": "claude-3-5-sonnet-20241022",
            "messages": [{ "role": "user", "content": "hi" }]
        }));
        let err = map_messages_request(&request).unwrap_err();
        match err {
            ProxyError::InvalidRequest(message) => assert_eq!(message, "max_tokens is required"),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn maps_simple_conversation() {
        let request = parse(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "system": "Be brief.",
            "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "Hi!" },
                { "role": "user", "content": "Bye" }
            ]
        }));
        let mapped = map_messages_request(&request).unwrap();
        assert_eq!(mapped.contents.len(), 3);
        assert_eq!(mapped.contents[1].role.as_deref(), Some("model"));
        assert_eq!(
            mapped.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("Be brief.")
        );
        assert_eq!(
            mapped.generation_config.unwrap().max_output_tokens,
            Some(1024)
        );
    }

    #[test]
    fn tools_append_interleaved_thinking_hint() {
        let request = parse(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 512,
            "system": "Base.",
            "messages": [{ "role": "user", "content": "hi" }],
            "tools": [{ "name": "t", "input_schema": { "type": "object" } }]
        }));
        let mapped = map_messages_request(&request).unwrap();
        let system = mapped.system_instruction.unwrap().parts[0]
            .text
            .clone()
            .unwrap();
        assert!(system.starts_with("Base.\n"));
        assert!(system.contains("Interleaved thinking is enabled"));
    }

    #[test]
    fn thinking_blocks_drop_and_tool_use_gets_skip_signature() {
        let request = parse(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 512,
            "messages": [
                { "role": "user", "content": "weather?" },
                { "role": "assistant", "content": [
                    { "type": "thinking", "thinking": "hmm", "signature": "sig" },
                    { "type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": { "city": "Paris" } }
                ]},
                { "role": "user", "content": [
                    { "type": "tool_result", "tool_use_id": "toolu_1", "content": "22C" }
                ]}
            ]
        }));
        let mapped = map_messages_request(&request).unwrap();

        let assistant_parts = &mapped.contents[1].parts;
        assert_eq!(assistant_parts.len(), 1);
        let call = assistant_parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(
            assistant_parts[0].thought_signature.as_deref(),
            Some(SKIP_SIGNATURE)
        );

        let response = mapped.contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "get_weather");
        assert_eq!(response.response, json!({ "result": "22C" }));
    }

    #[test]
    fn thinking_only_turn_is_padded_with_a_dot() {
        let request = parse(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 512,
            "messages": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": [
                    { "type": "thinking", "thinking": "hmm", "signature": "sig" }
                ]},
                { "role": "user", "content": "go on" }
            ]
        }));
        let mapped = map_messages_request(&request).unwrap();
        assert_eq!(mapped.contents[1].parts[0].text.as_deref(), Some("."));
    }

    #[test]
    fn tool_result_shapes() {
        let request = parse(json!({
            "model": "claude-x",
            "max_tokens": 16,
            "messages": [
                { "role": "assistant", "content": [
                    { "type": "tool_use", "id": "toolu_a", "name": "f", "input": {} }
                ]},
                { "role": "user", "content": [
                    { "type": "tool_result", "tool_use_id": "toolu_a", "content": [
                        { "type": "text", "text": "line1" },
                        { "type": "text", "text": "line2" }
                    ]}
                ]},
                { "role": "user", "content": [
                    { "type": "tool_result", "tool_use_id": "toolu_a", "content": [] }
                ]}
            ]
        }));
        let mapped = map_messages_request(&request).unwrap();
        let joined = mapped.contents[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(joined.response, json!({ "result": "line1\nline2" }));
        let empty = mapped.contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(empty.response, json!({ "result": "Success" }));
    }

    #[test]
    fn tool_choice_maps_to_gemini_modes() {
        for (choice, mode) in [
            (json!({ "type": "auto" }), "AUTO"),
            (json!({ "type": "any" }), "ANY"),
            (json!({ "type": "none" }), "NONE"),
        ] {
            let request = parse(json!({
                "model": "claude-x",
                "max_tokens": 16,
                "messages": [{ "role": "user", "content": "hi" }],
                "tool_choice": choice
            }));
            let mapped = map_messages_request(&request).unwrap();
            assert_eq!(
                mapped.tool_config.unwrap().function_calling_config.mode,
                mode
            );
        }

        let request = parse(json!({
            "model": "claude-x",
            "max_tokens": 16,
            "messages": [{ "role": "user", "content": "hi" }],
            "tool_choice": { "type": "tool", "name": "f" }
        }));
        let config = map_messages_request(&request)
            .unwrap()
            .tool_config
            .unwrap()
            .function_calling_config;
        assert_eq!(config.mode, "ANY");
        assert_eq!(config.allowed_function_names.unwrap(), vec!["f"]);
    }

    #[test]
    fn thinking_param_maps_to_budget() {
        let request = parse(json!({
            "model": "claude-x",
            "max_tokens": 16,
            "messages": [{ "role": "user", "content": "hi" }],
            "thinking": { "type": "enabled", "budget_tokens": 2048 }
        }));
        let mapped = map_messages_request(&request).unwrap();
        let thinking = mapped.generation_config.unwrap().thinking_config.unwrap();
        assert_eq!(thinking.thinking_budget, 2048);
        assert!(thinking.include_thoughts);
    }
}
