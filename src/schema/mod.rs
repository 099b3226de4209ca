//! JSON-Schema normalization for Gemini function declarations.
//!
//! Gemini's function-declaration validator accepts only a small subset of
//! draft-07: no `$ref`/`definitions`, no `allOf`/`oneOf`/`anyOf`, no union
//! `type` arrays, string-typed enums only, and a fixed keyword vocabulary.
//! This module reduces arbitrary tool parameter schemas to that subset.

use serde_json::{Map, Value};

/// Keywords the Gemini validator rejects outright.
const UNSUPPORTED_KEYWORDS: [&str; 12] = [
    "exclusiveMinimum",
    "exclusiveMaximum",
    "propertyNames",
    "minProperties",
    "maxProperties",
    "default",
    "$schema",
    "$id",
    "additionalProperties",
    "title",
    "examples",
    "definitions",
];

/// Normalize a tool parameter schema to the Gemini-accepted subset.
///
/// The transformation is idempotent: a second pass over the output yields a
/// structurally equal schema.
#[must_use]
pub fn normalize_tool_schema(schema: &Value) -> Value {
    let definitions = match schema.get("definitions") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let mut ref_stack = Vec::new();
    normalize_value(schema, &definitions, &mut ref_stack)
}

fn normalize_value(value: &Value, defs: &Map<String, Value>, ref_stack: &mut Vec<String>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_value(item, defs, ref_stack))
                .collect(),
        ),
        Value::Object(map) => normalize_object(map, defs, ref_stack),
        other => other.clone(),
    }
}

fn normalize_object(
    map: &Map<String, Value>,
    defs: &Map<String, Value>,
    ref_stack: &mut Vec<String>,
) -> Value {
    // $ref replaces the whole object with the resolved definition.
    if let Some(Value::String(reference)) = map.get("$ref") {
        return resolve_ref(reference, defs, ref_stack);
    }

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) || key == "$ref" || key == "allOf" {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }

    // allOf members merge into the surrounding object, last writer wins.
    if let Some(Value::Array(members)) = map.get("allOf") {
        for member in members {
            if let Value::Object(merged) = normalize_value(member, defs, ref_stack) {
                for (key, value) in merged {
                    out.insert(key, value);
                }
            }
        }
    }

    // oneOf / anyOf collapse to an enum when every member is a const,
    // otherwise to the first member that carries a type.
    let union = out.remove("oneOf").or_else(|| out.remove("anyOf"));
    if let Some(Value::Array(members)) = union {
        let consts: Vec<&Value> = members.iter().filter_map(|m| m.get("const")).collect();
        if !members.is_empty() && consts.len() == members.len() {
            out.insert("type".to_string(), Value::String("string".to_string()));
            out.insert(
                "enum".to_string(),
                Value::Array(consts.iter().map(|v| Value::String(stringify(v))).collect()),
            );
        } else {
            let chosen = members
                .iter()
                .find(|member| member.get("type").is_some())
                .map(|member| normalize_value(member, defs, ref_stack));
            match chosen {
                Some(Value::Object(member)) => {
                    for (key, value) in member {
                        out.insert(key, value);
                    }
                }
                _ => {
                    out.insert("type".to_string(), Value::String("string".to_string()));
                }
            }
        }
    }

    // const collapses to a single-element enum.
    if let Some(const_value) = out.remove("const") {
        out.insert(
            "enum".to_string(),
            Value::Array(vec![Value::String(stringify(&const_value))]),
        );
    }

    // Union type arrays: ["T", "null"] becomes nullable T.
    if let Some(Value::Array(types)) = out.get("type").cloned() {
        let non_null: Vec<&str> = types
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .collect();
        let has_null = types.iter().filter_map(Value::as_str).any(|t| t == "null");
        let picked = non_null.first().copied().unwrap_or("string");
        out.insert("type".to_string(), Value::String(picked.to_string()));
        if has_null && non_null.len() == 1 {
            out.insert("nullable".to_string(), Value::Bool(true));
        }
    }

    // Enums must be string-typed with string values.
    if let Some(Value::Array(values)) = out.get("enum").cloned() {
        out.insert("type".to_string(), Value::String("string".to_string()));
        out.insert(
            "enum".to_string(),
            Value::Array(
                values
                    .iter()
                    .map(|v| Value::String(stringify(v)))
                    .collect(),
            ),
        );
    }

    // Recurse into whatever survived. `properties` is a name -> schema map,
    // not itself a schema; its values are normalized individually so a
    // property named e.g. "default" or "enum" is left alone.
    let keys: Vec<String> = out.keys().cloned().collect();
    for key in keys {
        if key == "enum" {
            continue;
        }
        if key == "properties" {
            if let Some(Value::Object(props)) = out.get(&key) {
                let normalized = props
                    .iter()
                    .map(|(name, schema)| (name.clone(), normalize_value(schema, defs, ref_stack)))
                    .collect();
                out.insert(key, Value::Object(normalized));
            }
            continue;
        }
        if let Some(value) = out.get(&key) {
            let normalized = normalize_value(value, defs, ref_stack);
            out.insert(key, normalized);
        }
    }

    Value::Object(out)
}

fn resolve_ref(reference: &str, defs: &Map<String, Value>, ref_stack: &mut Vec<String>) -> Value {
    let Some(name) = reference.strip_prefix("#/definitions/") else {
        return Value::Object(Map::new());
    };
    // Cyclic definitions cannot be inlined; the validator gets an open object.
    if ref_stack.iter().any(|seen| seen == name) {
        return Value::Object(Map::new());
    }
    let Some(target) = defs.get(name) else {
        return Value::Object(Map::new());
    };
    ref_stack.push(name.to_string());
    let resolved = normalize_value(target, defs, ref_stack);
    ref_stack.pop();
    resolved
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
