//! Lightweight JSON Schema checks for tool arguments and structured output.
//!
//! Covers `type`, `required`, `properties` (recursively) and array `items`.
//! Schema type names are matched case-insensitively so both `"string"` and
//! `"STRING"` are accepted.

use crate::error::{Result, TrellisError};

/// Validate tool-call arguments, reporting failures as tool errors.
pub fn validate_arguments(
    tool_name: &str,
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<()> {
    validate_against_schema(args, schema)
        .map_err(|msg| TrellisError::tool(tool_name, format!("invalid arguments: {msg}")))
}

/// Check `value` against `schema`, returning the first violation found.
pub fn validate_against_schema(
    value: &serde_json::Value,
    schema: &serde_json::Value,
) -> std::result::Result<(), String> {
    check(value, schema, "$")
}

fn check(
    value: &serde_json::Value,
    schema: &serde_json::Value,
    path: &str,
) -> std::result::Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(|v| v.as_str()) {
        if !value_matches_type(value, expected) {
            return Err(format!(
                "{path}: expected {}, got {}",
                expected.to_ascii_lowercase(),
                json_type_name(value)
            ));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
            if let Some(missing) = required
                .iter()
                .filter_map(|f| f.as_str())
                .find(|f| !obj.contains_key(*f))
            {
                return Err(format!("{path}: missing required field '{missing}'"));
            }
        }
        if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
            for (key, field) in obj {
                if let Some(field_schema) = properties.get(key) {
                    check(field, field_schema, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let (Some(items), Some(schema_items)) = (value.as_array(), schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item, schema_items, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected.to_ascii_lowercase().as_str() {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
