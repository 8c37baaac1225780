//! Per-provider predicate SQL rendering.
//!
//! Renders [`ConditionExpr`] trees and map-shaped [`SearchFilter`]s into
//! [`SqlFilter`] fragments. Every literal value is bound as a parameter;
//! the only text interpolated into SQL is operator keywords and quoted
//! identifiers. PostgreSQL placeholders are numbered (`$1`, `$2`, ...)
//! and a fragment can be rendered with a start offset so it composes into
//! a larger statement.
//!
//! Dialect summary:
//!
//! | Operation | postgres | mysql | sqlite |
//! |-----------|----------|-------|--------|
//! | compare | `jsonb_path_exists(col, $n::jsonpath)` | `json_extract(col, ?) OP ?` | `json_extract(col, ?) OP ?` |
//! | exists | `jsonb_path_exists` | `json_contains_path` | `json_type(...) IS NOT NULL` |
//! | fuzzy | `like_regex ... flag "i"` | `json_search` | `LIKE` |
//! | any_in | `col #> $n::text[] ? $m` OR-joined | `json_contains` OR-joined | `json_each` EXISTS OR-joined |
//! | all_in | same, AND-joined | one `json_contains` | same, AND-joined |

use crate::condition::{CmpOp, ConditionExpr, FieldCond, FieldOp, Scalar};
use crate::filter::{EqMap, FieldFilter, SearchFilter};
use docstore_core::{DocPath, Error, PathStep, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Relational backend dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// SQLite (JSON1 functions)
    Sqlite,
    /// MySQL (`json_extract` family)
    Mysql,
    /// PostgreSQL (JSONB path operators)
    Postgres,
}

impl Provider {
    /// Canonical provider identifier
    pub fn name(self) -> &'static str {
        match self {
            Provider::Sqlite => "sqlite",
            Provider::Mysql => "mysql",
            Provider::Postgres => "postgres",
        }
    }

    /// Quote an identifier for this dialect
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Provider::Mysql => format!("`{ident}`"),
            _ => format!("\"{ident}\""),
        }
    }

    /// Placeholder text for the `n`-th (1-based) parameter of a statement
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Provider::Postgres => format!("${n}"),
            _ => "?".to_string(),
        }
    }

    /// `ESCAPE` clause matching [`like_escape`]'s backslash escaping
    pub fn like_escape_clause(self) -> &'static str {
        match self {
            Provider::Mysql => " ESCAPE '\\\\'",
            _ => " ESCAPE '\\'",
        }
    }

    /// Row-lock clause for mutating re-fetches; SQLite serializes writers
    /// at the transaction level instead.
    pub fn for_update_clause(self) -> &'static str {
        match self {
            Provider::Sqlite => "",
            _ => " FOR UPDATE",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Provider> {
        match s {
            "sqlite" => Ok(Provider::Sqlite),
            "mysql" => Ok(Provider::Mysql),
            "postgres" => Ok(Provider::Postgres),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON column a predicate applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Column {
    /// The document body
    #[default]
    Data,
    /// The document metadata
    Meta,
}

impl Column {
    /// Column name in the records table
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Data => "data",
            Column::Meta => "meta",
        }
    }
}

/// A bound SQL parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text
    Text(String),
}

impl From<&Scalar> for SqlParam {
    fn from(s: &Scalar) -> SqlParam {
        match s {
            Scalar::Int(i) => SqlParam::Int(*i),
            Scalar::Float(f) => SqlParam::Float(*f),
            Scalar::Bool(b) => SqlParam::Bool(*b),
            Scalar::Str(s) => SqlParam::Text(s.clone()),
        }
    }
}

/// A rendered predicate: SQL text plus its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    /// Predicate SQL (no leading `WHERE`)
    pub sql: String,
    /// Parameters bound by the predicate, in placeholder order
    pub params: Vec<SqlParam>,
}

struct SqlBuilder {
    provider: Provider,
    start: usize,
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    fn new(provider: Provider, start: usize) -> SqlBuilder {
        SqlBuilder {
            provider,
            start,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, param: SqlParam) {
        self.params.push(param);
        let n = self.start + self.params.len();
        let ph = self.provider.placeholder(n);
        self.sql.push_str(&ph);
    }

    fn bind_group(&mut self, params: impl IntoIterator<Item = SqlParam>) {
        self.push("(");
        for (i, p) in params.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(p);
        }
        self.push(")");
    }

    fn finish(self) -> SqlFilter {
        SqlFilter {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Escape LIKE wildcards (`%`, `_`) and backslashes in a fragment bound
/// into a LIKE pattern.
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `$."a"."b"[2]` path text for `json_extract`/`json_type`/`json_each`
fn json_path_text(path: &DocPath) -> String {
    let mut out = String::from("$");
    for step in path.steps() {
        match step {
            PathStep::Key(k) => {
                out.push_str(&format!(".\"{}\"", k.replace('"', "\\\"")));
            }
            PathStep::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

/// PostgreSQL jsonpath text, optionally with a filter predicate
fn pg_jsonpath(path: &DocPath, predicate: Option<&str>) -> String {
    let mut out = String::from("$");
    for step in path.steps() {
        match step {
            PathStep::Key(k) => {
                out.push('.');
                out.push_str(&serde_json::to_string(k).unwrap_or_else(|_| format!("\"{k}\"")));
            }
            PathStep::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    match predicate {
        Some(p) => format!("{out} ? ({p})"),
        None => out,
    }
}

/// PostgreSQL `text[]` literal for the `#>` / `#>>` operators
fn pg_text_array(path: &DocPath) -> String {
    let mut parts = Vec::with_capacity(path.len());
    for step in path.steps() {
        let raw = step.to_string();
        parts.push(format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\"")));
    }
    format!("{{{}}}", parts.join(","))
}

fn sql_cmp(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "=",
        CmpOp::Ne => "<>",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
    }
}

fn jsonpath_cmp(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
    }
}

fn jsonpath_literal(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\"")),
    }
}

fn value_to_scalar(value: &Value) -> Result<Scalar> {
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::Int(i))
            } else {
                Ok(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        other => Err(Error::UnsupportedOperator(format!(
            "unsupported value type in condition: {other}"
        ))),
    }
}

// ============================================================================
// Condition expression rendering
// ============================================================================

/// Render a parsed condition against `column`.
///
/// Returns `None` for the match-all sentinel. `start` offsets PostgreSQL
/// placeholder numbering when the fragment is composed into a statement
/// that already binds `start` parameters.
pub fn render_condition(
    expr: &ConditionExpr,
    column: Column,
    provider: Provider,
    start: usize,
) -> Result<Option<SqlFilter>> {
    if matches!(expr, ConditionExpr::All) {
        return Ok(None);
    }
    let mut b = SqlBuilder::new(provider, start);
    walk(expr, column, &mut b)?;
    Ok(Some(b.finish()))
}

fn walk(expr: &ConditionExpr, column: Column, b: &mut SqlBuilder) -> Result<()> {
    let key = b.provider.quote_ident("key");
    match expr {
        ConditionExpr::All => b.push("1=1"),
        ConditionExpr::KeyLike(pattern) => {
            b.push(&format!("{key} LIKE "));
            b.bind(SqlParam::Text(pattern.clone()));
        }
        ConditionExpr::KeyIn(keys) => {
            b.push(&format!("{key} IN "));
            b.bind_group(keys.iter().map(|k| SqlParam::Text(k.clone())));
        }
        ConditionExpr::KeyNotIn(keys) => {
            b.push(&format!("{key} NOT IN "));
            b.bind_group(keys.iter().map(|k| SqlParam::Text(k.clone())));
        }
        ConditionExpr::KeyNe(k) => {
            b.push(&format!("{key} <> "));
            b.bind(SqlParam::Text(k.clone()));
        }
        ConditionExpr::KeyEq(k) => {
            b.push(&format!("{key} = "));
            b.bind(SqlParam::Text(k.clone()));
        }
        ConditionExpr::KeyPrefix(p) => {
            b.push(&format!("{key} LIKE "));
            b.bind(SqlParam::Text(format!("{}%", like_escape(p))));
            b.push(b.provider.like_escape_clause());
        }
        ConditionExpr::KeySuffix(s) => {
            b.push(&format!("{key} LIKE "));
            b.bind(SqlParam::Text(format!("%{}", like_escape(s))));
            b.push(b.provider.like_escape_clause());
        }
        ConditionExpr::Field(cond) => render_field(cond, column, b)?,
        ConditionExpr::And(lhs, rhs) => {
            b.push("(");
            walk(lhs, column, b)?;
            b.push(") AND (");
            walk(rhs, column, b)?;
            b.push(")");
        }
        ConditionExpr::Or(lhs, rhs) => {
            b.push("(");
            walk(lhs, column, b)?;
            b.push(") OR (");
            walk(rhs, column, b)?;
            b.push(")");
        }
    }
    Ok(())
}

fn render_field(cond: &FieldCond, column: Column, b: &mut SqlBuilder) -> Result<()> {
    let col = column.as_str();
    match b.provider {
        Provider::Sqlite | Provider::Mysql => {
            let path = json_path_text(&cond.path);
            match &cond.op {
                FieldOp::Cmp(op, scalar) => {
                    b.push(&format!("json_extract({col}, "));
                    b.bind(SqlParam::Text(path));
                    b.push(&format!(") {} ", sql_cmp(*op)));
                    match (b.provider, scalar) {
                        // MySQL compares JSON booleans against the literals
                        (Provider::Mysql, Scalar::Bool(flag)) => b.push(&flag.to_string()),
                        _ => b.bind(SqlParam::from(scalar)),
                    }
                }
                FieldOp::Exists => match b.provider {
                    Provider::Mysql => {
                        b.push(&format!("json_contains_path({col}, 'one', "));
                        b.bind(SqlParam::Text(path));
                        b.push(")");
                    }
                    _ => {
                        b.push(&format!("json_type({col}, "));
                        b.bind(SqlParam::Text(path));
                        b.push(") IS NOT NULL");
                    }
                },
                FieldOp::In(items) | FieldOp::NotIn(items) => {
                    let negated = matches!(cond.op, FieldOp::NotIn(_));
                    b.push(&format!("json_extract({col}, "));
                    b.bind(SqlParam::Text(path));
                    b.push(if negated { ") NOT IN " } else { ") IN " });
                    b.bind_group(items.iter().map(SqlParam::from));
                }
            }
        }
        Provider::Postgres => match &cond.op {
            FieldOp::Cmp(op, scalar) => {
                let predicate =
                    format!("@ {} {}", jsonpath_cmp(*op), jsonpath_literal(scalar));
                b.push(&format!("jsonb_path_exists({col}, "));
                b.bind(SqlParam::Text(pg_jsonpath(&cond.path, Some(&predicate))));
                b.push("::jsonpath)");
            }
            FieldOp::Exists => {
                b.push(&format!("jsonb_path_exists({col}, "));
                b.bind(SqlParam::Text(pg_jsonpath(&cond.path, None)));
                b.push("::jsonpath)");
            }
            FieldOp::In(items) | FieldOp::NotIn(items) => {
                let negated = matches!(cond.op, FieldOp::NotIn(_));
                let cast = if items.iter().all(Scalar::is_numeric) {
                    "::double precision"
                } else if items.iter().all(|s| matches!(s, Scalar::Bool(_))) {
                    "::boolean"
                } else if items.iter().all(|s| matches!(s, Scalar::Str(_))) {
                    ""
                } else {
                    return Err(Error::UnsupportedOperator(
                        "list membership requires uniformly typed elements".into(),
                    ));
                };
                b.push(&format!("(({col} #>> "));
                b.bind(SqlParam::Text(pg_text_array(&cond.path)));
                b.push(&format!("::text[]){cast})"));
                b.push(if negated { " NOT IN " } else { " IN " });
                b.bind_group(items.iter().map(|s| match s {
                    Scalar::Int(i) => SqlParam::Float(*i as f64),
                    Scalar::Float(f) => SqlParam::Float(*f),
                    other => SqlParam::from(other),
                }));
            }
        },
    }
    Ok(())
}

// ============================================================================
// Map-shaped search filter rendering
// ============================================================================

/// Render a map-shaped search filter (conjunction of field operations).
pub fn render_search_filter(
    filter: &SearchFilter,
    column: Column,
    fuzzy: bool,
    provider: Provider,
    start: usize,
) -> Result<Option<SqlFilter>> {
    if filter.is_empty() {
        return Ok(None);
    }
    let mut b = SqlBuilder::new(provider, start);
    for (i, (path, entry)) in filter.entries().iter().enumerate() {
        if i > 0 {
            b.push(" AND ");
        }
        b.push("(");
        render_filter_entry(path, entry, column, fuzzy, &mut b)?;
        b.push(")");
    }
    Ok(Some(b.finish()))
}

/// Render `search_multi` conditions: a disjunction of equality-only
/// conjunctions.
pub fn render_multi(
    conditions: &[EqMap],
    column: Column,
    fuzzy: bool,
    provider: Provider,
    start: usize,
) -> Result<Option<SqlFilter>> {
    if conditions.is_empty() {
        return Ok(None);
    }
    let mut b = SqlBuilder::new(provider, start);
    for (i, map) in conditions.iter().enumerate() {
        if i > 0 {
            b.push(" OR ");
        }
        b.push("(");
        if map.is_empty() {
            b.push("1=1");
        }
        for (j, (path, value)) in map.iter().enumerate() {
            if j > 0 {
                b.push(" AND ");
            }
            b.push("(");
            render_filter_entry(path, &FieldFilter::Eq(value.clone()), column, fuzzy, &mut b)?;
            b.push(")");
        }
        b.push(")");
    }
    Ok(Some(b.finish()))
}

fn render_filter_entry(
    path: &str,
    entry: &FieldFilter,
    column: Column,
    fuzzy: bool,
    b: &mut SqlBuilder,
) -> Result<()> {
    let path = DocPath::parse(path)?;
    match entry {
        FieldFilter::Eq(value) => match value {
            Value::String(s) if fuzzy => render_fuzzy(&path, s, column, b),
            _ => {
                let scalar = value_to_scalar(value)?;
                render_field(
                    &FieldCond {
                        path,
                        op: FieldOp::Cmp(CmpOp::Eq, scalar),
                    },
                    column,
                    b,
                )
            }
        },
        FieldFilter::Cmp(op, value) => {
            let scalar = value_to_scalar(value)?;
            render_field(
                &FieldCond {
                    path,
                    op: FieldOp::Cmp(*op, scalar),
                },
                column,
                b,
            )
        }
        FieldFilter::OneOf(values) => {
            let items = values
                .iter()
                .map(value_to_scalar)
                .collect::<Result<Vec<_>>>()?;
            if items.is_empty() {
                b.push("1=0");
                return Ok(());
            }
            render_field(
                &FieldCond {
                    path,
                    op: FieldOp::In(items),
                },
                column,
                b,
            )
        }
        FieldFilter::AnyIn(values) => render_contains(&path, values, column, false, b),
        FieldFilter::AllIn(values) => render_contains(&path, values, column, true, b),
    }
}

fn render_fuzzy(path: &DocPath, needle: &str, column: Column, b: &mut SqlBuilder) -> Result<()> {
    let col = column.as_str();
    match b.provider {
        Provider::Sqlite => {
            b.push(&format!("json_extract({col}, "));
            b.bind(SqlParam::Text(json_path_text(path)));
            b.push(") LIKE ");
            b.bind(SqlParam::Text(format!("%{}%", like_escape(needle))));
            b.push(b.provider.like_escape_clause());
        }
        Provider::Mysql => {
            b.push(&format!("json_search({col}, 'all', "));
            b.bind(SqlParam::Text(format!("%{}%", like_escape(needle))));
            b.push(", NULL, ");
            b.bind(SqlParam::Text(json_path_text(path)));
            b.push(") IS NOT NULL");
        }
        Provider::Postgres => {
            let quoted = serde_json::to_string(&regex_escape(needle))
                .unwrap_or_else(|_| "\"\"".to_string());
            let predicate = format!("@ like_regex {quoted} flag \"i\"");
            b.push(&format!("jsonb_path_exists({col}, "));
            b.bind(SqlParam::Text(pg_jsonpath(path, Some(&predicate))));
            b.push("::jsonpath)");
        }
    }
    Ok(())
}

/// Stored-array containment: `any` (at least one supplied value present)
/// or `all` (every supplied value present).
fn render_contains(
    path: &DocPath,
    values: &[Value],
    column: Column,
    all: bool,
    b: &mut SqlBuilder,
) -> Result<()> {
    let col = column.as_str();
    if values.is_empty() {
        b.push(if all { "1=1" } else { "1=0" });
        return Ok(());
    }
    match b.provider {
        Provider::Sqlite => {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    b.push(if all { " AND " } else { " OR " });
                }
                let scalar = value_to_scalar(value)?;
                b.push(&format!("EXISTS (SELECT 1 FROM json_each({col}, "));
                b.bind(SqlParam::Text(json_path_text(path)));
                b.push(") WHERE json_each.value = ");
                b.bind(SqlParam::from(&scalar));
                b.push(")");
            }
        }
        Provider::Mysql => {
            if all {
                b.push(&format!("json_contains({col}, "));
                b.bind(SqlParam::Text(serde_json::to_string(values)?));
                b.push(", ");
                b.bind(SqlParam::Text(json_path_text(path)));
                b.push(")");
            } else {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        b.push(" OR ");
                    }
                    b.push(&format!("json_contains({col}, "));
                    b.bind(SqlParam::Text(serde_json::to_string(&vec![value])?));
                    b.push(", ");
                    b.bind(SqlParam::Text(json_path_text(path)));
                    b.push(")");
                }
            }
        }
        Provider::Postgres => {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    b.push(if all { " AND " } else { " OR " });
                }
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                b.push(&format!("({col} #> "));
                b.bind(SqlParam::Text(pg_text_array(path)));
                b.push("::text[] ? ");
                b.bind(SqlParam::Text(text));
                b.push(")");
            }
        }
    }
    Ok(())
}
