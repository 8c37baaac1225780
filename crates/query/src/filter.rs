//! Map-shaped search filters.
//!
//! `search` takes a filter mapping field paths to per-field operations;
//! all entries must match (conjunction). `search_multi` takes a list of
//! equality-only maps compiled to a disjunction of conjunctions.

use crate::condition::CmpOp;
use serde_json::Value;

/// Operation on one field in a search filter
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Equality; string values honor the search's fuzzy flag
    Eq(Value),
    /// Explicit comparison against a scalar value
    Cmp(CmpOp, Value),
    /// The stored scalar is one of the listed values
    OneOf(Vec<Value>),
    /// The stored array contains at least one of the supplied values
    AnyIn(Vec<Value>),
    /// The stored array contains every supplied value
    AllIn(Vec<Value>),
}

/// A conjunction of per-field operations, addressed by dotted paths
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchFilter {
    fields: Vec<(String, FieldFilter)>,
}

impl SearchFilter {
    /// Empty filter (matches everything)
    pub fn new() -> SearchFilter {
        SearchFilter::default()
    }

    /// Add a field operation (builder style)
    pub fn field(mut self, path: impl Into<String>, filter: FieldFilter) -> SearchFilter {
        self.fields.push((path.into(), filter));
        self
    }

    /// Shorthand for an equality entry
    pub fn eq(self, path: impl Into<String>, value: impl Into<Value>) -> SearchFilter {
        self.field(path, FieldFilter::Eq(value.into()))
    }

    /// The filter entries in insertion order
    pub fn entries(&self) -> &[(String, FieldFilter)] {
        &self.fields
    }

    /// True when no entry is present
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, FieldFilter)> for SearchFilter {
    fn from_iter<T: IntoIterator<Item = (S, FieldFilter)>>(iter: T) -> SearchFilter {
        SearchFilter {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One equality-only conjunction for `search_multi`
pub type EqMap = Vec<(String, Value)>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_keeps_insertion_order() {
        let filter = SearchFilter::new()
            .eq("name", "alice")
            .field("age", FieldFilter::Cmp(CmpOp::Ge, json!(18)));
        let entries = filter.entries();
        assert_eq!(entries[0].0, "name");
        assert_eq!(entries[1].0, "age");
        assert!(!filter.is_empty());
    }

    #[test]
    fn from_iterator() {
        let filter: SearchFilter =
            [("n", FieldFilter::Eq(json!(1)))].into_iter().collect();
        assert_eq!(filter.entries().len(), 1);
    }
}
