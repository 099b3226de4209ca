//! OpenAI Chat Completions request -> Gemini request translation.

use serde_json::Value;

use crate::error::ProxyError;
use crate::models::ModelFamily;
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionCallingConfig, GeminiFunctionDeclaration, GeminiGenerationConfig,
    GeminiPart, GeminiRequest, GeminiToolConfig, GeminiToolDeclaration,
};
use crate::protocol::mapping::{
    pad_empty_turn, parse_tool_arguments, push_text_part, thinking_config_for_effort,
};
use crate::schema::normalize_tool_schema;
use crate::state::signature_cache::SignatureCache;
use crate::util::split_data_url;

use super::{OpenAiChatRequest, OpenAiMessage, OpenAiTool, OpenAiToolChoice};

/// Translate an OpenAI chat request into a Gemini request body.
///
/// # Errors
///
/// Returns `ProxyError::InvalidRequest` when `messages` is missing or empty.
pub fn map_chat_request(
    request: &OpenAiChatRequest,
    signatures: &SignatureCache,
) -> Result<GeminiRequest, ProxyError> {
    if request.messages.is_empty() {
        return Err(ProxyError::InvalidRequest("messages is required".into()));
    }

    let family = ModelFamily::of(request.model.as_deref().unwrap_or_default());
    let mut system_text = String::new();
    let mut contents: Vec<GeminiContent> = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        match message.role.as_str() {
            "system" | "developer" => {
                collect_system_text(&mut system_text, message.content.as_ref());
            }
            "tool" => {
                contents.push(map_tool_result_message(message, &request.messages));
            }
            "assistant" => {
                contents.push(map_assistant_message(message, signatures, family));
            }
            _ => {
                contents.push(map_user_message(message));
            }
        }
    }

    let tools = map_tools(request.tools.as_deref());
    let tool_config = map_tool_choice(request.tool_choice.as_ref());
    let generation_config = build_generation_config(request);

    Ok(GeminiRequest {
        contents,
        system_instruction: system_instruction_from(system_text),
        tools,
        tool_config,
        generation_config,
        session_id: None,
    })
}

pub(crate) fn system_instruction_from(system_text: String) -> Option<GeminiContent> {
    if system_text.is_empty() {
        return None;
    }
    Some(GeminiContent {
        role: None,
        parts: vec![GeminiPart::text(system_text)],
    })
}

/// Concatenate the text of a system/developer message; non-text parts drop.
pub(crate) fn collect_system_text(system_text: &mut String, content: Option<&Value>) {
    let Some(content) = content else { return };
    match content {
        Value::String(text) => {
            if !text.is_empty() {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(text);
            }
        }
        Value::Array(parts) => {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        if !system_text.is_empty() {
                            system_text.push('\n');
                        }
                        system_text.push_str(text);
                    }
                }
            }
        }
        _ => {}
    }
}

fn map_user_message(message: &OpenAiMessage) -> GeminiContent {
    let mut parts = Vec::new();
    match &message.content {
        Some(Value::String(text)) => push_text_part(&mut parts, text, false),
        Some(Value::Array(items)) => {
            let multi = items.len() > 1;
            for item in items {
                match item.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            push_text_part(&mut parts, text, multi);
                        }
                    }
                    Some("image_url") => {
                        let url = item
                            .get("image_url")
                            .and_then(|iu| iu.get("url"))
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if let Some((mime, data)) = split_data_url(url) {
                            parts.push(GeminiPart::inline_data(mime, data));
                        }
                        // Remote image references are dropped: the upstream
                        // cannot fetch them.
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    pad_empty_turn(&mut parts);
    GeminiContent {
        role: Some("user".to_string()),
        parts,
    }
}

fn map_assistant_message(
    message: &OpenAiMessage,
    signatures: &SignatureCache,
    family: ModelFamily,
) -> GeminiContent {
    let mut parts = Vec::new();
    match &message.content {
        Some(Value::String(text)) => {
            if !text.is_empty() {
                push_text_part(&mut parts, text, false);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        push_text_part(&mut parts, text, true);
                    }
                }
            }
        }
        _ => {}
    }

    for tool_call in message.tool_calls.iter().flatten() {
        let mut part = GeminiPart::function_call(
            tool_call.function.name.clone(),
            parse_tool_arguments(&tool_call.function.arguments),
        );
        // Re-attach the signature the upstream issued with this call, so a
        // thinking model accepts its own echoed reasoning trace.
        part.thought_signature = signatures
            .for_tool_call(&tool_call.id)
            .or_else(|| signatures.for_family(family));
        parts.push(part);
    }

    pad_empty_turn(&mut parts);
    GeminiContent {
        role: Some("model".to_string()),
        parts,
    }
}

fn map_tool_result_message(message: &OpenAiMessage, history: &[OpenAiMessage]) -> GeminiContent {
    let tool_call_id = message.tool_call_id.as_deref().unwrap_or_default();
    let name = find_tool_name(history, tool_call_id).unwrap_or_else(|| tool_call_id.to_string());

    let payload = match &message.content {
        Some(Value::String(text)) => Value::String(text.clone()),
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
            Value::String(joined)
        }
        Some(other) => other.clone(),
        None => Value::String(String::new()),
    };

    GeminiContent {
        role: Some("user".to_string()),
        parts: vec![GeminiPart::function_response(
            name,
            crate::protocol::mapping::function_response_value(&payload),
        )],
    }
}

/// Find the function name for a tool-call id by scanning prior assistant
/// messages.
pub(crate) fn find_tool_name(history: &[OpenAiMessage], tool_call_id: &str) -> Option<String> {
    for message in history {
        for tool_call in message.tool_calls.iter().flatten() {
            if tool_call.id == tool_call_id {
                return Some(tool_call.function.name.clone());
            }
        }
    }
    None
}

pub(crate) fn map_tools(tools: Option<&[OpenAiTool]>) -> Option<Vec<GeminiToolDeclaration>> {
    let tools = tools?;
    let declarations: Vec<GeminiFunctionDeclaration> = tools
        .iter()
        .filter(|tool| tool.type_ == "function")
        .map(|tool| GeminiFunctionDeclaration {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool
                .function
                .parameters
                .as_ref()
                .map(normalize_tool_schema),
        })
        .collect();
    if declarations.is_empty() {
        return None;
    }
    Some(vec![GeminiToolDeclaration {
        function_declarations: declarations,
    }])
}

pub(crate) fn map_tool_choice(choice: Option<&OpenAiToolChoice>) -> Option<GeminiToolConfig> {
    let config = match choice? {
        OpenAiToolChoice::Mode(mode) => match mode.as_str() {
            "none" => GeminiFunctionCallingConfig {
                mode: "NONE".to_string(),
                allowed_function_names: None,
            },
            "required" | "any" => GeminiFunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: None,
            },
            _ => GeminiFunctionCallingConfig {
                mode: "AUTO".to_string(),
                allowed_function_names: None,
            },
        },
        OpenAiToolChoice::Function(function) => GeminiFunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![function.function.name.clone()]),
        },
    };
    Some(GeminiToolConfig {
        function_calling_config: config,
    })
}

fn build_generation_config(request: &OpenAiChatRequest) -> Option<GeminiGenerationConfig> {
    let max_output_tokens = request.max_completion_tokens.or(request.max_tokens);
    let thinking_config = request
        .reasoning_effort
        .as_deref()
        .and_then(thinking_config_for_effort);

    if request.temperature.is_none() && max_output_tokens.is_none() && thinking_config.is_none() {
        return None;
    }
    Some(GeminiGenerationConfig {
        temperature: request.temperature,
        top_p: None,
        max_output_tokens,
        thinking_config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(request: serde_json::Value) -> OpenAiChatRequest {
        serde_json::from_value(request).unwrap()
    }

    #[test]
    fn rejects_empty_messages() {
        let request = parse(json!({ "model": "gemini-2.5-pro", "messages": [] }));
        let err = map_chat_request(&request, &SignatureCache::new()).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[test]
    fn system_messages_become_system_instruction() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "developer", "content": "Answer in French." },
                { "role": "user", "content": "Hello" }
            ]
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        let system = mapped.system_instruction.unwrap();
        assert_eq!(
            system.parts[0].text.as_deref(),
            Some("Be brief.\nAnswer in French.")
        );
        assert_eq!(mapped.contents.len(), 1);
        assert_eq!(mapped.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn assistant_maps_to_model_role() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello!" }
            ]
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        assert_eq!(mapped.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn multi_part_user_text_is_newline_terminated() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "first" },
                    { "type": "text", "text": "second" }
                ]
            }]
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        assert_eq!(mapped.contents[0].parts[0].text.as_deref(), Some("first\n"));
        assert_eq!(mapped.contents[0].parts[1].text.as_deref(), Some("second\n"));
    }

    #[test]
    fn data_url_images_become_inline_data_and_remote_urls_drop() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "look" },
                    { "type": "image_url", "image_url": { "url": "data:image/png;base64,QUJD" } },
                    { "type": "image_url", "image_url": { "url": "https://example.com/a.png" } }
                ]
            }]
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        let parts = &mapped.contents[0].parts;
        assert_eq!(parts.len(), 2);
        let inline = parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "QUJD");
    }

    #[test]
    fn tool_calls_and_results_round_trip_names() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                { "role": "user", "content": "weather?" },
                {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
                    }]
                },
                { "role": "tool", "tool_call_id": "call_abc", "content": "22C" }
            ]
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();

        let call = mapped.contents[1].parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.args, json!({ "city": "Paris" }));

        let response = mapped.contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "get_weather");
        assert_eq!(response.response, json!({ "result": "22C" }));
        assert_eq!(mapped.contents[2].role.as_deref(), Some("user"));
    }

    #[test]
    fn cached_signatures_reattach_to_echoed_tool_calls() {
        let signatures = SignatureCache::new();
        let sig = "s".repeat(128);
        signatures.store_for_tool_call("call_abc", &sig);

        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                { "role": "user", "content": "weather?" },
                {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{}" }
                    }]
                },
                { "role": "tool", "tool_call_id": "call_abc", "content": "ok" }
            ]
        }));
        let mapped = map_chat_request(&request, &signatures).unwrap();
        assert_eq!(
            mapped.contents[1].parts[0].thought_signature.as_deref(),
            Some(sig.as_str())
        );
    }

    #[test]
    fn tools_are_normalized_and_choice_maps_to_any() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [{ "role": "user", "content": "hi" }],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "f",
                    "parameters": {
                        "type": "object",
                        "$schema": "x",
                        "properties": { "v": { "type": ["string", "null"] } }
                    }
                }
            }],
            "tool_choice": { "type": "function", "function": { "name": "f" } }
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        let declaration = &mapped.tools.unwrap()[0].function_declarations[0];
        let parameters = declaration.parameters.as_ref().unwrap();
        assert!(parameters.get("$schema").is_none());
        assert_eq!(parameters["properties"]["v"]["nullable"], true);

        let config = mapped.tool_config.unwrap().function_calling_config;
        assert_eq!(config.mode, "ANY");
        assert_eq!(config.allowed_function_names.unwrap(), vec!["f"]);
    }

    #[test]
    fn reasoning_effort_sets_thinking_budget() {
        let request = parse(json!({
            "model": "gemini-2.5-pro",
            "messages": [{ "role": "user", "content": "hi" }],
            "reasoning_effort": "high"
        }));
        let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();
        let thinking = mapped
            .generation_config
            .unwrap()
            .thinking_config
            .unwrap();
        assert_eq!(thinking.thinking_budget, 24576);
        assert!(thinking.include_thoughts);
    }
}
