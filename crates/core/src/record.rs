//! The stored record model.
//!
//! A [`Record`] is one document row: generated id, unique key, JSON `data`,
//! JSON `meta`, and two timestamps. Timestamps persist with second
//! resolution as `YYYY-MM-DDTHH:MM:SS`, so their lexicographic order equals
//! their chronological order in every backend.

use crate::error::{Error, Result};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire/storage format for `create` and `update` timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Query ordering direction for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Oldest-updated first
    Asc,
    /// Newest-updated first (the default)
    #[default]
    Desc,
}

impl Order {
    /// SQL keyword for this direction
    pub fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// One stored document
///
/// Invariants maintained by the engine:
/// - `key` is unique within a collection (enforced at the storage layer)
/// - `update >= create`
/// - `data` and `meta` are always JSON-serializable values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Generated primary key
    pub id: i64,
    /// Unique record key
    pub key: String,
    /// Document body
    pub data: Value,
    /// Document metadata (schema routing and arbitrary tags)
    pub meta: Value,
    /// Creation timestamp, set once
    #[serde(with = "timestamp")]
    pub create: NaiveDateTime,
    /// Last-mutation timestamp, bumped on every write
    #[serde(with = "timestamp")]
    pub update: NaiveDateTime,
}

impl Record {
    /// Current UTC time truncated to second resolution
    pub fn now() -> NaiveDateTime {
        // round-trip through the wire format to drop sub-second precision
        parse_timestamp(&format_timestamp(&Utc::now().naive_utc()))
            .unwrap_or_else(|_| Utc::now().naive_utc())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, key: {}, data: {}, create: {}, update: {}",
            self.id,
            self.key,
            self.data,
            format_timestamp(&self.create),
            format_timestamp(&self.update),
        )
    }
}

/// Format a timestamp in the persisted wire shape
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp from the persisted wire shape
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| Error::Backend(format!("bad timestamp {s:?}: {e}")))
}

mod timestamp {
    use super::{format_timestamp, NaiveDateTime, TIMESTAMP_FORMAT};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(de)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_round_trip() {
        let now = Record::now();
        let text = format_timestamp(&now);
        assert_eq!(text.len(), 19);
        assert_eq!(parse_timestamp(&text).unwrap(), now);
    }

    #[test]
    fn record_serializes_wire_shape() {
        let ts = parse_timestamp("2024-05-01T12:00:00").unwrap();
        let rec = Record {
            id: 1,
            key: "k1".into(),
            data: json!({"n": 1}),
            meta: json!({}),
            create: ts,
            update: ts,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["create"], json!("2024-05-01T12:00:00"));
        assert_eq!(v["key"], json!("k1"));
    }

    #[test]
    fn order_keywords() {
        assert_eq!(Order::Asc.keyword(), "ASC");
        assert_eq!(Order::Desc.keyword(), "DESC");
        assert_eq!(Order::default(), Order::Desc);
    }
}
