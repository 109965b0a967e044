//! JSON Schema checks for tool parameters and arguments
//!
//! Only the subset of JSON Schema the gateway relies on is understood:
//! object parameters, `required`, and primitive `type` checks on top-level
//! properties. Anything richer is left to the handler.

use serde_json::{Map, Value};

use crate::error::LlmError;

/// Keywords stripped from schemas sent to vLLM's guided decoding
pub const VLLM_UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "additionalProperties",
    "patternProperties",
    "unevaluatedProperties",
    "dependentSchemas",
    "format",
    "examples",
];

/// Keywords Google rejects in function declarations
pub const GOOGLE_UNSUPPORTED_KEYWORDS: &[&str] = &["$schema", "$id", "$comment", "additionalProperties"];

/// Keys whose values map user-chosen names to subschemas
const NAMED_SCHEMA_MAPS: &[&str] = &["properties", "$defs", "definitions"];

/// Check that a tool's parameter schema is an object schema
///
/// # Errors
///
/// Returns a configuration error naming the tool and the offending part
pub fn validate_parameters(tool: &str, parameters: &Value) -> Result<(), LlmError> {
    let Some(schema) = parameters.as_object() else {
        return Err(LlmError::configuration(format!("tool {tool}: parameters must be a JSON object")));
    };

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(LlmError::configuration(format!(
            "tool {tool}: parameters must have type \"object\""
        )));
    }

    if let Some(properties) = schema.get("properties")
        && !properties.is_object()
    {
        return Err(LlmError::configuration(format!("tool {tool}: properties must be an object")));
    }

    if let Some(required) = schema.get("required") {
        let all_strings = required.as_array().is_some_and(|items| items.iter().all(Value::is_string));
        if !all_strings {
            return Err(LlmError::configuration(format!(
                "tool {tool}: required must be an array of strings"
            )));
        }
    }

    Ok(())
}

/// Check parsed arguments against a parameter schema
///
/// Returns a human-readable reason on the first mismatch.
pub fn validate_arguments(parameters: &Value, arguments: &Map<String, Value>) -> Result<(), String> {
    let required = parameters
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);

    for name in required {
        if !arguments.contains_key(name) {
            return Err(format!("missing required argument: {name}"));
        }
    }

    let Some(properties) = parameters.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in arguments {
        let Some(expected) = properties.get(name).and_then(|p| p.get("type")) else {
            continue;
        };

        let matches = match expected {
            Value::String(ty) => type_matches(ty, value),
            Value::Array(types) => types.iter().filter_map(Value::as_str).any(|ty| type_matches(ty, value)),
            _ => true,
        };

        if !matches {
            return Err(format!("argument {name} must be of type {expected}"));
        }
    }

    Ok(())
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Copy of `schema` with the given keywords removed at every depth
///
/// Property names are never treated as keywords, so a property called
/// `format` survives while a `format` keyword inside its subschema does not.
pub fn strip_keywords(schema: &Value, keywords: &[&str]) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !keywords.contains(&key.as_str()))
                .map(|(key, value)| {
                    let value = match value {
                        Value::Object(named) if NAMED_SCHEMA_MAPS.contains(&key.as_str()) => Value::Object(
                            named
                                .iter()
                                .map(|(name, sub)| (name.clone(), strip_keywords(sub, keywords)))
                                .collect(),
                        ),
                        other => strip_keywords(other, keywords),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| strip_keywords(item, keywords)).collect()),
        other => other.clone(),
    }
}
