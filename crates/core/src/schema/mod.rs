//! Pluggable schema validation.
//!
//! Validation runs on every read and write unless explicitly bypassed.
//! Routing lives in a record's `meta`: `schema_version` selects a schema
//! from the collection's [`SchemaRegistry`] and `schema_type` names the
//! validation engine. Two engines are recognized:
//!
//! - `jsonschema`: JSON Schema via the `jsonschema` crate
//! - `rules`: a small declarative engine (see [`rules`])
//!
//! A process-wide switch gates all enforcement. It defaults to on and can
//! be pre-set with the `SCHEMA_CHECK` environment variable (`0`/`false`
//! disables) or flipped at runtime with [`set_validation_enabled`].

pub mod rules;

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

static SCHEMA_CHECK: Lazy<AtomicBool> = Lazy::new(|| {
    let enabled = match std::env::var("SCHEMA_CHECK") {
        Ok(v) => !(v == "0" || v.eq_ignore_ascii_case("false")),
        Err(_) => true,
    };
    AtomicBool::new(enabled)
});

/// True when schema enforcement is globally enabled
pub fn validation_enabled() -> bool {
    SCHEMA_CHECK.load(Ordering::Relaxed)
}

/// Globally enable or disable schema enforcement
pub fn set_validation_enabled(enabled: bool) {
    SCHEMA_CHECK.store(enabled, Ordering::Relaxed);
}

/// Schemas keyed by version string
///
/// One registry per collection. A record selects its schema through
/// `meta.schema_version`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Value>,
}

impl SchemaRegistry {
    /// Empty registry
    pub fn new() -> SchemaRegistry {
        SchemaRegistry::default()
    }

    /// Register (or replace) the schema for a version string
    pub fn register(&mut self, version: impl Into<String>, schema: Value) -> &mut Self {
        self.schemas.insert(version.into(), schema);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, version: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(version.into(), schema);
        self
    }

    /// Look up a schema by version
    pub fn get(&self, version: &str) -> Option<&Value> {
        self.schemas.get(version)
    }

    /// True when no schema is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Validate `data` against the schema routed by `meta`.
///
/// Returns `Ok(())` when enforcement is disabled, when `meta` carries no
/// schema routing fields, or when the routed engine accepts the document.
/// `extra` is a diagnostic label (typically the record key) attached to
/// any failure.
pub fn validate_document(
    data: &Value,
    meta: &Value,
    registry: &SchemaRegistry,
    extra: Option<&str>,
) -> Result<()> {
    if !validation_enabled() {
        return Ok(());
    }
    let meta_map = match meta.as_object() {
        Some(map) => map,
        None => return Ok(()),
    };
    let schema_type = meta_map.get("schema_type").and_then(Value::as_str);
    let schema_version = meta_map.get("schema_version").and_then(Value::as_str);
    let (schema_type, schema_version) = match (schema_type, schema_version) {
        (None, None) => return Ok(()),
        (Some(t), Some(v)) => (t, v),
        (Some(_), None) => {
            return Err(Error::InvalidSchema(
                "meta.schema_type present without meta.schema_version".into(),
            ))
        }
        (None, Some(_)) => {
            return Err(Error::InvalidSchema(
                "meta.schema_version present without meta.schema_type".into(),
            ))
        }
    };
    let schema = registry.get(schema_version).ok_or_else(|| {
        Error::InvalidSchema(format!("no schema registered for version {schema_version:?}"))
    })?;
    match schema_type {
        "jsonschema" => validate_jsonschema(data, schema, extra),
        "rules" => validate_rules(data, schema, extra),
        other => Err(Error::InvalidSchema(format!(
            "unrecognized schema engine {other:?}"
        ))),
    }
}

fn validate_jsonschema(data: &Value, schema: &Value, extra: Option<&str>) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::InvalidSchema(format!("jsonschema: {e}")))?;
    if validator.is_valid(data) {
        return Ok(());
    }
    let detail = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(Error::validation("jsonschema", detail, extra))
}

fn validate_rules(data: &Value, schema: &Value, extra: Option<&str>) -> Result<()> {
    let errors = rules::validate(data, schema)?;
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::validation("rules", errors.join("; "), extra))
}
