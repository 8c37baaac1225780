//! Condition language and predicate SQL rendering for docstore.
//!
//! Two halves:
//!
//! - [`condition`]: parses the compact condition language (`n>2`,
//!   `^prefix`, `a.b:[1,2] && flag=true`, ...) into a typed
//!   [`ConditionExpr`] tree.
//! - [`sql`]: renders condition trees and map-shaped search filters into
//!   backend-specific filter SQL with every literal value bound as a
//!   parameter.

pub mod condition;
pub mod filter;
pub mod sql;

pub use condition::{parse_condition, CmpOp, ConditionExpr, FieldCond, FieldOp, Scalar};
pub use filter::{EqMap, FieldFilter, SearchFilter};
pub use sql::{
    render_condition, render_multi, render_search_filter, Column, Provider, SqlFilter, SqlParam,
};
