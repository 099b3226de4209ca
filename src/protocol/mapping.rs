//! Helpers shared by the three dialect-to-Gemini request mappers.

use serde_json::Value;

use crate::protocol::chunk::FinishReason;
use crate::protocol::gemini::{GeminiPart, GeminiThinkingConfig};

/// Map a `reasoning_effort` / `reasoning.effort` level to a thinking config.
#[must_use]
pub fn thinking_config_for_effort(effort: &str) -> Option<GeminiThinkingConfig> {
    let budget = match effort {
        "low" => 1024,
        "medium" => 8192,
        "high" => 24576,
        _ => return None,
    };
    Some(GeminiThinkingConfig {
        thinking_budget: budget,
        include_thoughts: true,
    })
}

/// Append a text part to a turn.
///
/// Gemini merges adjacent text parts without a separator, so inside a
/// multi-part turn each text part is terminated with `\n` unless it already
/// ends with one.
pub fn push_text_part(parts: &mut Vec<GeminiPart>, text: &str, multi_part: bool) {
    if multi_part && !text.ends_with('\n') {
        let mut terminated = String::with_capacity(text.len() + 1);
        terminated.push_str(text);
        terminated.push('\n');
        parts.push(GeminiPart::text(terminated));
    } else {
        parts.push(GeminiPart::text(text));
    }
}

/// Gemini rejects turns with zero parts; pad with a bare `.` text part.
pub fn pad_empty_turn(parts: &mut Vec<GeminiPart>) {
    if parts.is_empty() {
        parts.push(GeminiPart::text("."));
    }
}

/// Wrap a tool-result payload as a Gemini function response object:
/// strings pass through, everything else is stringified.
#[must_use]
pub fn function_response_value(payload: &Value) -> Value {
    let result = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    serde_json::json!({ "result": result })
}

/// Parse a tool call's JSON-string arguments; malformed input degrades to an
/// empty object rather than failing the whole request.
#[must_use]
pub fn parse_tool_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

/// Map an upstream `finishReason` string to the normalized finish reason.
/// Tool-call presence wins over the upstream label.
#[must_use]
pub fn finish_reason_from_gemini(reason: &str, emitted_tool_calls: bool) -> FinishReason {
    if emitted_tool_calls {
        return FinishReason::ToolCalls;
    }
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}
