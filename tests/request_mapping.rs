//! Request-mapping matrix across the three dialects, plus the error
//! surfaces for invalid requests and rate limits.

use std::sync::Arc;

use gemini_relay::error::{format_error, ProxyError};
use gemini_relay::models::ModelFamily;
use gemini_relay::protocol::anthropic::request::map_messages_request;
use gemini_relay::protocol::anthropic::AnthropicRequest;
use gemini_relay::protocol::chunk::ChunkAccumulator;
use gemini_relay::protocol::openai_chat::request::map_chat_request;
use gemini_relay::protocol::openai_chat::response::encode_chat_response;
use gemini_relay::protocol::openai_chat::OpenAiChatRequest;
use gemini_relay::protocol::openai_responses::request::map_responses_request;
use gemini_relay::protocol::openai_responses::ResponsesRequest;
use gemini_relay::protocol::IngressApi;
use gemini_relay::schema::normalize_tool_schema;
use gemini_relay::state::signature_cache::SignatureCache;
use gemini_relay::upstream::stream::PartStreamEmitter;
use serde_json::json;

// ---------------------------------------------------------------------------
// Missing max_tokens
// ---------------------------------------------------------------------------

#[test]
fn missing_max_tokens_surfaces_before_any_upstream_call() {
    let request: AnthropicRequest = serde_json::from_value(json!({
        "model": "claude-3-5-sonnet-20241022",
        "messages": [{ "role": "user", "content": "hi" }]
    }))
    .unwrap();

    let err = map_messages_request(&request).unwrap_err();
    let (status, body) = format_error(&err, IngressApi::Anthropic);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "type": "error",
            "error": { "type": "invalid_request_error", "message": "max_tokens is required" }
        })
    );
}

// ---------------------------------------------------------------------------
// Rate-limit surface on the Anthropic path
// ---------------------------------------------------------------------------

#[test]
fn rate_limit_is_a_400_invalid_request_on_anthropic() {
    let err = ProxyError::RateLimit {
        status: 429,
        reset_after_ms: Some(45_000),
        message: "RESOURCE_EXHAUSTED: Rate limited on gemini-2.5-pro. Quota will reset after 45 second(s). Next available: 2026-08-01T00:00:45Z".into(),
    };

    let (status, body) = format_error(&err, IngressApi::Anthropic);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("RESOURCE_EXHAUSTED: Rate limited on gemini-2.5-pro."));
    assert!(message.contains("45 second(s)"));

    // The same error is a 500 for OpenAI clients.
    let (status, _) = format_error(&err, IngressApi::OpenAiChat);
    assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
}

// ---------------------------------------------------------------------------
// Schema normalization
// ---------------------------------------------------------------------------

#[test]
fn schema_normalization_example() {
    let input = json!({
        "type": "object",
        "properties": {
            "x": { "type": ["string", "null"] },
            "y": { "oneOf": [{ "const": "a" }, { "const": "b" }] }
        },
        "$schema": "http://json-schema.org/draft-07/schema#",
        "definitions": { "Spare": { "type": "integer" } }
    });
    let expected = json!({
        "type": "object",
        "properties": {
            "x": { "type": "string", "nullable": true },
            "y": { "type": "string", "enum": ["a", "b"] }
        }
    });

    let once = normalize_tool_schema(&input);
    assert_eq!(once, expected);
    assert_eq!(normalize_tool_schema(&once), expected);
}

// ---------------------------------------------------------------------------
// Round trip: OpenAI chat request -> Gemini -> OpenAI chat response with an
// echoing upstream.
// ---------------------------------------------------------------------------

#[test]
fn openai_round_trip_with_echoing_upstream() {
    let request: OpenAiChatRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-flash",
        "messages": [
            { "role": "system", "content": "echo" },
            { "role": "user", "content": "first" },
            { "role": "assistant", "content": "ignored" },
            { "role": "user", "content": "repeat after me" }
        ]
    }))
    .unwrap();

    let mapped = map_chat_request(&request, &SignatureCache::new()).unwrap();

    // The upstream echoes the last user turn.
    let last_user_text = mapped
        .contents
        .iter()
        .rev()
        .find(|content| content.role.as_deref() == Some("user"))
        .and_then(|content| content.parts[0].text.clone())
        .unwrap();
    assert_eq!(last_user_text, "repeat after me");

    let record = serde_json::from_value(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": last_user_text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 4, "candidatesTokenCount": 4 }
    }))
    .unwrap();

    let mut emitter =
        PartStreamEmitter::new(ModelFamily::Gemini, Arc::new(SignatureCache::new()));
    let mut chunks = Vec::new();
    emitter.on_record(&record, &mut chunks);

    let mut acc = ChunkAccumulator::new();
    for chunk in &chunks {
        acc.push(chunk);
    }
    let body = encode_chat_response(&acc, "gemini-2.5-flash", "chatcmpl-rt", 1);

    assert_eq!(body["choices"][0]["message"]["content"], "repeat after me");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

// ---------------------------------------------------------------------------
// Dialect matrix: the same conversation maps to equivalent Gemini bodies.
// ---------------------------------------------------------------------------

#[test]
fn all_three_dialects_produce_equivalent_gemini_turns() {
    let signatures = SignatureCache::new();

    let chat: OpenAiChatRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-pro",
        "messages": [
            { "role": "system", "content": "sys" },
            { "role": "user", "content": "question" }
        ]
    }))
    .unwrap();
    let from_chat = map_chat_request(&chat, &signatures).unwrap();

    let responses: ResponsesRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-pro",
        "instructions": "sys",
        "input": "question"
    }))
    .unwrap();
    let from_responses = map_responses_request(&responses, &signatures).unwrap();

    let anthropic: AnthropicRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-pro",
        "max_tokens": 1024,
        "system": "sys",
        "messages": [{ "role": "user", "content": "question" }]
    }))
    .unwrap();
    let from_anthropic = map_messages_request(&anthropic).unwrap();

    for mapped in [&from_chat, &from_responses, &from_anthropic] {
        assert_eq!(mapped.contents.len(), 1);
        assert_eq!(mapped.contents[0].role.as_deref(), Some("user"));
        assert_eq!(mapped.contents[0].parts[0].text.as_deref(), Some("question"));
        assert_eq!(
            mapped.system_instruction.as_ref().unwrap().parts[0]
                .text
                .as_deref(),
            Some("sys")
        );
    }
}

// ---------------------------------------------------------------------------
// Tool flow across dialects: declarations normalize, history names resolve.
// ---------------------------------------------------------------------------

#[test]
fn tool_history_resolves_names_in_every_dialect() {
    let signatures = SignatureCache::new();
    let schema = json!({
        "type": "object",
        "properties": { "city": { "type": ["string", "null"] } },
        "additionalProperties": false
    });

    let chat: OpenAiChatRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-pro",
        "messages": [
            { "role": "user", "content": "weather?" },
            { "role": "assistant", "tool_calls": [{
                "id": "call_1", "type": "function",
                "function": { "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
            }]},
            { "role": "tool", "tool_call_id": "call_1", "content": "22C" }
        ],
        "tools": [{ "type": "function", "function": { "name": "get_weather", "parameters": schema } }]
    }))
    .unwrap();
    let mapped = map_chat_request(&chat, &signatures).unwrap();
    let declaration = &mapped.tools.as_ref().unwrap()[0].function_declarations[0];
    let parameters = declaration.parameters.as_ref().unwrap();
    assert!(parameters.get("additionalProperties").is_none());
    assert_eq!(parameters["properties"]["city"]["nullable"], true);
    assert_eq!(
        mapped.contents[2].parts[0].function_response.as_ref().unwrap().name,
        "get_weather"
    );

    let responses: ResponsesRequest = serde_json::from_value(json!({
        "model": "gemini-2.5-pro",
        "input": [
            { "role": "user", "content": "weather?" },
            { "type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" },
            { "type": "function_call_output", "call_id": "call_1", "output": "22C" }
        ]
    }))
    .unwrap();
    let mapped = map_responses_request(&responses, &signatures).unwrap();
    assert_eq!(
        mapped.contents[2].parts[0].function_response.as_ref().unwrap().response,
        json!({ "result": "22C" })
    );
}
