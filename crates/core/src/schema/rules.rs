//! The `rules` validation engine.
//!
//! A small declarative validator for flat-to-moderately-nested documents.
//! A schema is an object mapping field names to constraint objects:
//!
//! ```json
//! {
//!   "name": {"type": "string", "required": true, "minlength": 1},
//!   "age":  {"type": "integer", "min": 0, "max": 150},
//!   "role": {"type": "string", "allowed": ["admin", "user"]},
//!   "address": {"type": "dict", "schema": {"city": {"type": "string"}}}
//! }
//! ```
//!
//! Supported constraints: `type` (`string`, `integer`, `float`, `number`,
//! `boolean`, `list`, `dict`), `required`, `min`/`max` (numeric value),
//! `minlength`/`maxlength` (strings and lists), `allowed`, and a nested
//! `schema` for `dict` fields. Fields not named in the schema are
//! rejected.

use crate::error::{Error, Result};
use serde_json::Value;

/// Validate `data` against a rules schema, returning the list of
/// constraint violations (empty when the document is valid).
pub fn validate(data: &Value, schema: &Value) -> Result<Vec<String>> {
    let schema = schema
        .as_object()
        .ok_or_else(|| Error::InvalidSchema("rules schema must be an object".into()))?;
    let mut errors = Vec::new();
    let data = match data.as_object() {
        Some(map) => map,
        None => return Ok(vec![format!("document must be an object")]),
    };

    for (field, value) in data {
        if !schema.contains_key(field) {
            errors.push(format!("{field}: unknown field"));
        }
    }

    for (field, constraint) in schema {
        let constraint = constraint.as_object().ok_or_else(|| {
            Error::InvalidSchema(format!("constraint for {field:?} must be an object"))
        })?;
        let value = match data.get(field) {
            Some(v) => v,
            None => {
                if constraint.get("required").and_then(Value::as_bool) == Some(true) {
                    errors.push(format!("{field}: required field missing"));
                }
                continue;
            }
        };
        if let Some(expected) = constraint.get("type").and_then(Value::as_str) {
            if !type_matches(value, expected) {
                errors.push(format!("{field}: expected {expected}"));
                continue;
            }
        }
        if let Some(min) = constraint.get("min").and_then(Value::as_f64) {
            if value.as_f64().is_some_and(|v| v < min) {
                errors.push(format!("{field}: below minimum {min}"));
            }
        }
        if let Some(max) = constraint.get("max").and_then(Value::as_f64) {
            if value.as_f64().is_some_and(|v| v > max) {
                errors.push(format!("{field}: above maximum {max}"));
            }
        }
        if let Some(min) = constraint.get("minlength").and_then(Value::as_u64) {
            if length_of(value).is_some_and(|len| (len as u64) < min) {
                errors.push(format!("{field}: shorter than {min}"));
            }
        }
        if let Some(max) = constraint.get("maxlength").and_then(Value::as_u64) {
            if length_of(value).is_some_and(|len| (len as u64) > max) {
                errors.push(format!("{field}: longer than {max}"));
            }
        }
        if let Some(allowed) = constraint.get("allowed").and_then(Value::as_array) {
            if !allowed.contains(value) {
                errors.push(format!("{field}: value not allowed"));
            }
        }
        if let Some(nested) = constraint.get("schema") {
            let nested_errors = validate(value, nested)?;
            errors.extend(nested_errors.into_iter().map(|e| format!("{field}.{e}")));
        }
    }
    Ok(errors)
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "float" => value.is_f64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "list" => value.is_array(),
        "dict" => value.is_object(),
        _ => false,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "name": {"type": "string", "required": true, "minlength": 1},
            "age": {"type": "integer", "min": 0, "max": 150},
            "role": {"type": "string", "allowed": ["admin", "user"]},
            "tags": {"type": "list", "maxlength": 3},
            "address": {"type": "dict", "schema": {"city": {"type": "string", "required": true}}},
        })
    }

    #[test]
    fn valid_document_passes() {
        let doc = json!({
            "name": "alice",
            "age": 30,
            "role": "admin",
            "tags": ["a", "b"],
            "address": {"city": "berlin"},
        });
        assert!(validate(&doc, &schema()).unwrap().is_empty());
    }

    #[test]
    fn missing_required_field() {
        let errors = validate(&json!({"age": 1}), &schema()).unwrap();
        assert!(errors.iter().any(|e| e.contains("name")));
    }

    #[test]
    fn type_and_range_violations() {
        let errors = validate(&json!({"name": "a", "age": 200}), &schema()).unwrap();
        assert_eq!(errors, vec!["age: above maximum 150"]);

        let errors = validate(&json!({"name": "a", "age": "old"}), &schema()).unwrap();
        assert_eq!(errors, vec!["age: expected integer"]);
    }

    #[test]
    fn allowed_and_length_constraints() {
        let errors =
            validate(&json!({"name": "a", "role": "root", "tags": [1, 2, 3, 4]}), &schema())
                .unwrap();
        assert!(errors.iter().any(|e| e.contains("role")));
        assert!(errors.iter().any(|e| e.contains("tags")));
    }

    #[test]
    fn unknown_field_rejected() {
        let errors = validate(&json!({"name": "a", "extra": 1}), &schema()).unwrap();
        assert_eq!(errors, vec!["extra: unknown field"]);
    }

    #[test]
    fn nested_schema_errors_are_prefixed() {
        let errors = validate(&json!({"name": "a", "address": {}}), &schema()).unwrap();
        assert_eq!(errors, vec!["address.city: required field missing"]);
    }

    #[test]
    fn non_object_schema_is_invalid() {
        assert!(validate(&json!({}), &json!("nope")).is_err());
    }
}
