//! The compact condition language.
//!
//! A condition is a single string expression. `||` and `&&` split the
//! whole expression first (left side parsed recursively), then the
//! remaining text is classified:
//!
//! | Shape | Meaning |
//! |-------|---------|
//! | `*` | match all |
//! | contains `%` | raw key `LIKE` pattern |
//! | `(a,b,c)` | key is one of the listed values |
//! | `)a,b,c(` | key is none of the listed values |
//! | `~k` | key inequality |
//! | `^k$` | exact key equality |
//! | `^k` / `k$` | key prefix / suffix |
//! | bare token | exact key equality |
//! | anything else | a field-path condition on the JSON column |
//!
//! Field-path conditions split on the first operator present, in priority
//! order `>= <= > < != == = !: : ?`. A trailing `?` asserts path
//! existence; `:` / `!:` take a bracket list literal; dots in the
//! left-hand key address nested values with numeric segments as array
//! indices. Values are inferred to integer, float, boolean, or
//! (optionally quoted) string.

use docstore_core::{DocPath, Error, Result};
use serde_json::Value;
use std::fmt;

/// A literal value in a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// Boolean literal
    Bool(bool),
    /// String literal (quotes stripped)
    Str(String),
}

impl Scalar {
    /// Convert to a JSON value
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(*f),
            Scalar::Bool(b) => Value::from(*b),
            Scalar::Str(s) => Value::from(s.clone()),
        }
    }

    /// True for int/float literals
    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Comparison operator in a field condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=` / `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

/// Operation applied to a field path
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Compare the value at the path against a literal
    Cmp(CmpOp, Scalar),
    /// Value at the path is one of the listed literals
    In(Vec<Scalar>),
    /// Value at the path is none of the listed literals
    NotIn(Vec<Scalar>),
    /// The path exists
    Exists,
}

/// A condition on a JSON field path
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCond {
    /// Path into the `data` (or `meta`) column
    pub path: DocPath,
    /// Operation on the addressed value
    pub op: FieldOp,
}

/// Parsed condition expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    /// Match everything (no predicate)
    All,
    /// `key LIKE pattern`
    KeyLike(String),
    /// Key is one of the listed values
    KeyIn(Vec<String>),
    /// Key is none of the listed values
    KeyNotIn(Vec<String>),
    /// Key inequality
    KeyNe(String),
    /// Exact key equality
    KeyEq(String),
    /// Key prefix match
    KeyPrefix(String),
    /// Key suffix match
    KeySuffix(String),
    /// Field-path condition on the JSON column
    Field(FieldCond),
    /// Both sides must match
    And(Box<ConditionExpr>, Box<ConditionExpr>),
    /// Either side matches
    Or(Box<ConditionExpr>, Box<ConditionExpr>),
}

/// Characters that force field-path interpretation of a bare token
const FIELD_CHARS: [char; 7] = ['=', '>', '<', '!', ':', '.', '?'];

/// Operator priority for field conditions; the first operator found in
/// this order splits the expression.
const FIELD_OPS: [&str; 10] = [">=", "<=", ">", "<", "!=", "==", "=", "!:", ":", "?"];

/// Parse a condition expression
pub fn parse_condition(input: &str) -> Result<ConditionExpr> {
    let s = input.trim();
    if let Some((lhs, rhs)) = s.split_once("||") {
        return combine(lhs, rhs, false);
    }
    if let Some((lhs, rhs)) = s.split_once("&&") {
        return combine(lhs, rhs, true);
    }
    if s.is_empty() {
        return Err(Error::Parse("empty condition".into()));
    }
    if s == "*" {
        return Ok(ConditionExpr::All);
    }
    if s.contains('%') {
        return Ok(ConditionExpr::KeyLike(s.to_string()));
    }
    if s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        return Ok(ConditionExpr::KeyIn(key_list(&s[1..s.len() - 1])?));
    }
    if s.len() >= 2 && s.starts_with(')') && s.ends_with('(') {
        return Ok(ConditionExpr::KeyNotIn(key_list(&s[1..s.len() - 1])?));
    }
    if let Some(rest) = s.strip_prefix('~') {
        return Ok(ConditionExpr::KeyNe(rest.to_string()));
    }
    if s.len() >= 2 && s.starts_with('^') && s.ends_with('$') {
        return Ok(ConditionExpr::KeyEq(s[1..s.len() - 1].to_string()));
    }
    if let Some(rest) = s.strip_prefix('^') {
        return Ok(ConditionExpr::KeyPrefix(rest.to_string()));
    }
    if let Some(rest) = s.strip_suffix('$') {
        return Ok(ConditionExpr::KeySuffix(rest.to_string()));
    }
    if !s.contains(FIELD_CHARS) {
        return Ok(ConditionExpr::KeyEq(s.to_string()));
    }
    parse_field(s)
}

fn combine(lhs: &str, rhs: &str, and: bool) -> Result<ConditionExpr> {
    let left = parse_condition(lhs)?;
    let right = parse_condition(rhs)?;
    // the all-match sentinel degrades the join to the other side
    Ok(match (left, right) {
        (ConditionExpr::All, right) => right,
        (left, ConditionExpr::All) => left,
        (left, right) if and => ConditionExpr::And(Box::new(left), Box::new(right)),
        (left, right) => ConditionExpr::Or(Box::new(left), Box::new(right)),
    })
}

fn key_list(inner: &str) -> Result<Vec<String>> {
    let keys: Vec<String> = inner
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(Error::Parse(format!("empty key list in ({inner})")));
    }
    Ok(keys)
}

fn parse_field(s: &str) -> Result<ConditionExpr> {
    for op in FIELD_OPS {
        if op == "?" {
            if s.contains('?') {
                let stripped = s.strip_suffix('?').ok_or_else(|| {
                    Error::Parse(format!("'?' must be trailing in {s:?}"))
                })?;
                return Ok(ConditionExpr::Field(FieldCond {
                    path: field_path(stripped)?,
                    op: FieldOp::Exists,
                }));
            }
            continue;
        }
        let Some(idx) = s.find(op) else { continue };
        let (lhs, rhs) = (&s[..idx], &s[idx + op.len()..]);
        let path = field_path(lhs)?;
        let op = match op {
            ">=" => FieldOp::Cmp(CmpOp::Ge, numeric_scalar(op, rhs)?),
            "<=" => FieldOp::Cmp(CmpOp::Le, numeric_scalar(op, rhs)?),
            ">" => FieldOp::Cmp(CmpOp::Gt, numeric_scalar(op, rhs)?),
            "<" => FieldOp::Cmp(CmpOp::Lt, numeric_scalar(op, rhs)?),
            "!=" => FieldOp::Cmp(CmpOp::Ne, infer_scalar(rhs)),
            "==" | "=" => FieldOp::Cmp(CmpOp::Eq, infer_scalar(rhs)),
            "!:" => FieldOp::NotIn(list_literal(rhs)?),
            ":" => FieldOp::In(list_literal(rhs)?),
            _ => unreachable!(),
        };
        return Ok(ConditionExpr::Field(FieldCond { path, op }));
    }
    // no operator present: bare dotted path asserts existence
    Ok(ConditionExpr::Field(FieldCond {
        path: field_path(s)?,
        op: FieldOp::Exists,
    }))
}

fn field_path(raw: &str) -> Result<DocPath> {
    DocPath::parse(raw)
}

fn numeric_scalar(op: &str, raw: &str) -> Result<Scalar> {
    let scalar = infer_scalar(raw);
    if scalar.is_numeric() {
        Ok(scalar)
    } else {
        Err(Error::UnsupportedOperator(format!(
            "comparison '{op}' requires a numeric value, got {raw:?}"
        )))
    }
}

/// Infer a literal's type: integer, float, boolean, then string with
/// optional surrounding quotes stripped.
pub fn infer_scalar(raw: &str) -> Scalar {
    let t = raw.trim();
    if let Ok(i) = t.parse::<i64>() {
        return Scalar::Int(i);
    }
    if let Ok(f) = t.parse::<f64>() {
        return Scalar::Float(f);
    }
    match t {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        _ => {}
    }
    Scalar::Str(strip_quotes(t).to_string())
}

fn strip_quotes(t: &str) -> &str {
    if t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')))
    {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

fn list_literal(raw: &str) -> Result<Vec<Scalar>> {
    let t = raw.trim();
    let inner = t
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| Error::Parse(format!("expected [list] literal, got {raw:?}")))?;
    let items: Vec<Scalar> = inner
        .split(',')
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(infer_scalar)
        .collect();
    if items.is_empty() {
        return Err(Error::Parse(format!("empty list literal {raw:?}")));
    }
    Ok(items)
}
