//! A JSON document store layered on relational backends.
//!
//! Records live in one table per collection: a generated id, a unique
//! key, JSON `data` and `meta` columns, and create/update timestamps.
//! On top of that sit a compact condition language compiled to
//! parameterized per-provider SQL, optimistic-locked CRUD with conflict
//! retries, live record proxies, and pluggable schema validation.
//!
//! ```no_run
//! use docstore::{Matcher, SearchOptions, Store, StoreConfig};
//! use serde_json::json;
//!
//! # fn main() -> docstore::Result<()> {
//! let store = Store::open(StoreConfig::sqlite("app.sqlite"))?;
//! store.create("task_1", json!({"n": 3, "done": false}), None, false)?;
//!
//! let result = store.search(&Matcher::expr("n>2"), &SearchOptions::new())?;
//! for record in &result.records {
//!     println!("{record}");
//! }
//! # Ok(())
//! # }
//! ```

pub use docstore_core::*;
pub use docstore_engine::*;
pub use docstore_query::*;
