//! tscribe query compilation.
//!
//! This crate turns filter trees and keyset-pagination requests into
//! parameterized SQL for three dialects. It never touches storage:
//! - [`Condition`] trees of simple comparisons joined by AND/OR/NOT
//! - Column paths into nested JSON (`config.temperature`, `tags[0]`, `a."b.c"`)
//! - Per-dialect rendering with type-hinted casts and placeholder numbering
//! - [`OrderBy`] terms, opaque [`Cursor`]s, and page plans
//!
//! Values are always returned as bound parameters, never spliced into SQL.

pub mod compile;
pub mod condition;
pub mod dialect;
pub mod error;
pub mod order;
pub mod pagination;
pub mod path;
pub mod value;

pub use compile::{compile, compile_for, CompiledFilter, KnownColumns};
pub use condition::{Column, CompoundCondition, Condition, ConditionValue, LogicalOperator, Operator, SimpleCondition};
pub use dialect::Dialect;
pub use error::{QueryError, Result};
pub use order::{normalize_order, order_clause, OrderBy, SortDirection};
pub use pagination::{cursor_condition, Cursor, Page, PageDirection, PagePlan, PageRequest};
pub use path::{parse_column_path, ColumnPath, PathSegment};
pub use value::ScalarValue;

/// Unique key column used as the final ordering tiebreaker.
pub const TIEBREAKER_COLUMN: &str = "transcript_id";
