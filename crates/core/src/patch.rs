//! Bulk-update merge strategies.
//!
//! A [`Patch`] is the payload of a condition-matched `update`, in one of
//! the three documented modes:
//!
//! - `replace`: the payload fully replaces the column
//! - `jsonpath`: `(path, value)` pairs applied via path-addressed set,
//!   where a value may be a transform of the path's current value
//! - `nest`: a recursive deep merge. Scalars and null overwrite, lists
//!   concatenate, maps merge key-by-key, and transforms replace the
//!   existing value with a function of it.

use crate::error::{Error, Result};
use crate::path::{get_at_path, set_at_path, type_name, DocPath};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A value transform applied to the current value at a path
///
/// Receives `None` when the path has no current value.
pub type Transform = Arc<dyn Fn(Option<&Value>) -> Value + Send + Sync>;

/// One value in a `jsonpath`-mode patch
#[derive(Clone)]
pub enum PatchValue {
    /// Store this value at the path
    Set(Value),
    /// Replace the path's current value with a function of it
    Apply(Transform),
}

impl PatchValue {
    /// Convenience constructor for a transform value
    pub fn transform(f: impl Fn(Option<&Value>) -> Value + Send + Sync + 'static) -> PatchValue {
        PatchValue::Apply(Arc::new(f))
    }
}

impl fmt::Debug for PatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchValue::Set(v) => f.debug_tuple("Set").field(v).finish(),
            PatchValue::Apply(_) => f.write_str("Apply(<transform>)"),
        }
    }
}

/// One entry in a `nest`-mode overlay
#[derive(Clone)]
pub enum Overlay {
    /// Overwrite whatever is present (scalars and null)
    Value(Value),
    /// Merge key-by-key into the existing object
    Map(Vec<(String, Overlay)>),
    /// Concatenate onto the existing array
    Concat(Vec<Value>),
    /// Replace with a transform of the existing value
    Apply(Transform),
}

impl Overlay {
    /// Convert a plain JSON value into its overlay interpretation:
    /// objects merge, arrays concatenate, everything else overwrites.
    pub fn from_value(value: Value) -> Overlay {
        match value {
            Value::Object(map) => Overlay::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Overlay::from_value(v)))
                    .collect(),
            ),
            Value::Array(items) => Overlay::Concat(items),
            other => Overlay::Value(other),
        }
    }

    /// Convenience constructor for a transform entry
    pub fn transform(f: impl Fn(Option<&Value>) -> Value + Send + Sync + 'static) -> Overlay {
        Overlay::Apply(Arc::new(f))
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlay::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Overlay::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Overlay::Concat(items) => f.debug_tuple("Concat").field(items).finish(),
            Overlay::Apply(_) => f.write_str("Apply(<transform>)"),
        }
    }
}

/// Deep-merge an overlay into an existing object value
pub fn merge_nest(orig: &mut Value, overlay: &[(String, Overlay)]) -> Result<()> {
    let map = match orig.as_object_mut() {
        Some(map) => map,
        None => {
            return Err(Error::TypeMismatch(format!(
                "nest patch requires an object, found {}",
                type_name(orig)
            )))
        }
    };
    for (key, entry) in overlay {
        match entry {
            Overlay::Map(entries) => {
                let mut child = match map.get(key) {
                    Some(Value::Object(m)) => Value::Object(m.clone()),
                    _ => Value::Object(serde_json::Map::new()),
                };
                merge_nest(&mut child, entries)?;
                map.insert(key.clone(), child);
            }
            Overlay::Concat(items) => {
                let mut arr = match map.get(key) {
                    Some(Value::Array(a)) => a.clone(),
                    _ => Vec::new(),
                };
                arr.extend(items.iter().cloned());
                map.insert(key.clone(), Value::Array(arr));
            }
            Overlay::Value(v) => {
                map.insert(key.clone(), v.clone());
            }
            Overlay::Apply(f) => {
                let next = f(map.get(key));
                map.insert(key.clone(), next);
            }
        }
    }
    Ok(())
}

/// A bulk-update payload in one of the three patch modes
#[derive(Debug, Clone)]
pub enum Patch {
    /// Full replacement of the column
    Replace(Value),
    /// Path-addressed `(path, value)` pairs
    JsonPath(Vec<(String, PatchValue)>),
    /// Recursive deep merge
    Nest(Vec<(String, Overlay)>),
}

impl Patch {
    /// Build a `jsonpath` patch from `(path, value)` pairs
    pub fn jsonpath<I, S>(pairs: I) -> Patch
    where
        I: IntoIterator<Item = (S, PatchValue)>,
        S: Into<String>,
    {
        Patch::JsonPath(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a `nest` patch from a plain JSON object overlay
    pub fn nest(overlay: Value) -> Patch {
        match Overlay::from_value(overlay) {
            Overlay::Map(entries) => Patch::Nest(entries),
            other => Patch::Nest(vec![(String::new(), other)]),
        }
    }

    /// Apply this patch to the current column value, returning the
    /// mutated copy. The input is never modified in place.
    pub fn apply(&self, current: &Value) -> Result<Value> {
        match self {
            Patch::Replace(v) => Ok(v.clone()),
            Patch::JsonPath(pairs) => {
                let mut copy = current.clone();
                for (path, patch_value) in pairs {
                    let path = DocPath::parse(path)?;
                    let value = match patch_value {
                        PatchValue::Set(v) => v.clone(),
                        PatchValue::Apply(f) => f(get_at_path(&copy, &path)),
                    };
                    set_at_path(&mut copy, &path, value)?;
                }
                Ok(copy)
            }
            Patch::Nest(entries) => {
                let mut copy = current.clone();
                merge_nest(&mut copy, entries)?;
                Ok(copy)
            }
        }
    }
}
