//! Record lifecycle engine: backends, stores, proxies, registry.
//!
//! [`Store`] is the entry point. Open one with a [`StoreConfig`], then
//! work through keyed CRUD ([`Store::get`], [`Store::add`],
//! [`Store::create`]), searches ([`Store::search`] with a [`Matcher`]),
//! and bulk mutation ([`Store::update`], [`Store::delete`]). Searches
//! return [`RecordView`]s that persist path-level edits back to the
//! store.
//!
//! SQLite is always available; the `postgres` and `mysql` features add
//! the server-backed providers.

pub mod backend;
pub mod config;
pub mod proxy;
pub mod registry;
pub mod store;

pub use backend::{AnyBackend, RawRow, Tx};
pub use config::StoreConfig;
pub use proxy::{RecordSet, RecordView};
pub use registry::StoreRegistry;
pub use store::{
    with_retry, Matcher, OrderBy, SearchMode, SearchOptions, SearchResult, Store, RETRY_ATTEMPTS,
};
