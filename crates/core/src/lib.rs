//! Core types for the docstore document store.
//!
//! This crate holds everything the query and engine layers share:
//! - [`Error`] / [`Result`]: the error surface of the whole workspace
//! - [`Record`]: one stored document (key, data, meta, timestamps)
//! - [`DocPath`]: dotted-path addressing into JSON documents
//! - [`Patch`] / [`Overlay`]: the three bulk-update merge strategies
//! - [`SliceBounds`]: relative/negative pagination bounds
//! - [`schema`]: pluggable schema validation with a process-wide toggle

pub mod error;
pub mod patch;
pub mod path;
pub mod record;
pub mod schema;
pub mod slice;

pub use error::{Error, Result};
pub use patch::{Overlay, Patch, PatchValue, Transform};
pub use path::{delete_at_path, get_at_path, set_at_path, DocPath, PathStep};
pub use record::{format_timestamp, parse_timestamp, Order, Record, TIMESTAMP_FORMAT};
pub use schema::{
    set_validation_enabled, validate_document, validation_enabled, SchemaRegistry,
};
pub use slice::SliceBounds;
