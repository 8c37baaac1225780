//! Dotted-path addressing into JSON documents.
//!
//! Paths are compact dotted strings: `a.b.2.c` addresses key `a`, then key
//! `b`, then array index `2`, then key `c`. A segment that parses as an
//! unsigned integer is an array index; everything else is an object key.
//! Segments are trimmed, so `a. b .1` equals `a.b.1`.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step in a document path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

impl PathStep {
    fn from_segment(seg: &str) -> PathStep {
        match seg.parse::<usize>() {
            Ok(i) => PathStep::Index(i),
            Err(_) => PathStep::Key(seg.to_string()),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(k) => write!(f, "{k}"),
            PathStep::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A parsed path into a JSON document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    steps: Vec<PathStep>,
}

impl DocPath {
    /// Parse a dotted path; every segment must be non-empty
    pub fn parse(path: &str) -> Result<DocPath> {
        if path.trim().is_empty() {
            return Err(Error::Parse("empty path".into()));
        }
        let mut steps = Vec::new();
        for seg in path.split('.') {
            let seg = seg.trim();
            if seg.is_empty() {
                return Err(Error::Parse(format!("empty segment in path {path:?}")));
            }
            steps.push(PathStep::from_segment(seg));
        }
        Ok(DocPath { steps })
    }

    /// Build a path from pre-parsed steps
    pub fn from_steps(steps: Vec<PathStep>) -> DocPath {
        DocPath { steps }
    }

    /// The path steps
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the path has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl FromStr for DocPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<DocPath> {
        DocPath::parse(s)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

fn step_ref<'a>(value: &'a Value, step: &PathStep) -> Option<&'a Value> {
    match (value, step) {
        (Value::Object(map), PathStep::Key(k)) => map.get(k),
        (Value::Array(arr), PathStep::Index(i)) => arr.get(*i),
        _ => None,
    }
}

/// Read the value at `path`, or `None` when any step is absent
/// or traverses a non-container.
pub fn get_at_path<'a>(doc: &'a Value, path: &DocPath) -> Option<&'a Value> {
    let mut cur = doc;
    for step in path.steps() {
        cur = step_ref(cur, step)?;
    }
    Some(cur)
}

fn step_mut<'a>(value: &'a mut Value, step: &PathStep, path: &DocPath) -> Result<&'a mut Value> {
    match (value, step) {
        (Value::Object(map), PathStep::Key(k)) => map
            .get_mut(k)
            .ok_or_else(|| Error::TypeMismatch(format!("no value at {k:?} in path '{path}'"))),
        (Value::Array(arr), PathStep::Index(i)) => {
            let len = arr.len();
            arr.get_mut(*i).ok_or_else(|| {
                Error::TypeMismatch(format!("index {i} out of bounds ({len}) in path '{path}'"))
            })
        }
        (other, _) => Err(Error::TypeMismatch(format!(
            "cannot index into {} at path '{path}'",
            type_name(other)
        ))),
    }
}

/// Write `value` at `path`.
///
/// Intermediate containers must already exist; the final step may insert a
/// new object key but must address an existing index when the parent is an
/// array.
pub fn set_at_path(doc: &mut Value, path: &DocPath, value: Value) -> Result<()> {
    let (last, parents) = path
        .steps()
        .split_last()
        .ok_or_else(|| Error::Parse("empty path".into()))?;
    let mut cur = doc;
    for step in parents {
        cur = step_mut(cur, step, path)?;
    }
    match (cur, last) {
        (Value::Object(map), PathStep::Key(k)) => {
            map.insert(k.clone(), value);
            Ok(())
        }
        (Value::Array(arr), PathStep::Index(i)) => {
            if *i < arr.len() {
                arr[*i] = value;
                Ok(())
            } else {
                Err(Error::TypeMismatch(format!(
                    "index {i} out of bounds ({}) in path '{path}'",
                    arr.len()
                )))
            }
        }
        (other, _) => Err(Error::TypeMismatch(format!(
            "cannot assign into {} at path '{path}'",
            type_name(other)
        ))),
    }
}

/// Remove the value at `path`; the addressed value must exist.
pub fn delete_at_path(doc: &mut Value, path: &DocPath) -> Result<()> {
    let (last, parents) = path
        .steps()
        .split_last()
        .ok_or_else(|| Error::Parse("empty path".into()))?;
    let mut cur = doc;
    for step in parents {
        cur = step_mut(cur, step, path)?;
    }
    match (cur, last) {
        (Value::Object(map), PathStep::Key(k)) => {
            map.remove(k)
                .ok_or_else(|| Error::TypeMismatch(format!("no value at path '{path}'")))?;
            Ok(())
        }
        (Value::Array(arr), PathStep::Index(i)) => {
            if *i < arr.len() {
                arr.remove(*i);
                Ok(())
            } else {
                Err(Error::TypeMismatch(format!("no value at path '{path}'")))
            }
        }
        (other, _) => Err(Error::TypeMismatch(format!(
            "cannot delete from {} at path '{path}'",
            type_name(other)
        ))),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
