//! Keyset pagination.
//!
//! A page is addressed by the sort key of the last row already seen rather
//! than by an offset. With ordering `(c1, c2, ..., transcript_id)` and a
//! cursor `(v1, v2, ...)`, the next forward page is
//!
//! ```text
//! c1 > v1
//! OR (c1 = v1 AND c2 > v2)
//! OR (c1 = v1 AND c2 = v2 AND c3 > v3) ...
//! ```
//!
//! with `>` flipped for descending columns and nulls treated as the greatest
//! value. Backward pages mirror the comparisons, run the query in reversed
//! order, and flip the rows back before returning them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::compile::{compile, compile_for, CompiledFilter, KnownColumns};
use crate::condition::{Column, Condition};
use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::order::{normalize_order, order_clause, OrderBy, SortDirection};
use crate::value::ScalarValue;

/// Which way a page request walks the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    #[default]
    Forward,
    Backward,
}

/// Sort-key values of a boundary row, keyed by column name.
///
/// Keys outside the active ordering are ignored and missing keys read as
/// null, so cursors from an older ordering still decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(BTreeMap<String, ScalarValue>);

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<ScalarValue>) {
        self.0.insert(column.into(), value.into());
    }

    /// Value for `column`, or null when the cursor does not carry it.
    pub fn value(&self, column: &str) -> ScalarValue {
        self.0.get(column).cloned().unwrap_or(ScalarValue::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Capture the sort key of a row.
    pub fn from_row(order: &[OrderBy], lookup: impl Fn(&str) -> ScalarValue) -> Self {
        Cursor(
            order
                .iter()
                .map(|term| (term.column.clone(), lookup(&term.base_column())))
                .collect(),
        )
    }

    /// Opaque URL-safe text form.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode the text form produced by [`Cursor::encode`].
    ///
    /// Non-scalar values are kept as their JSON text.
    pub fn decode(text: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| QueryError::InvalidCursor(format!("not base64: {e}")))?;
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::InvalidCursor(format!("not a JSON object: {e}")))?;
        Ok(Cursor(
            raw.iter()
                .map(|(k, v)| (k.clone(), ScalarValue::from_json(v)))
                .collect(),
        ))
    }
}

/// Page request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(default)]
    pub direction: PageDirection,
}

impl PageRequest {
    /// First page, walking forward.
    pub fn first(limit: usize) -> Self {
        PageRequest {
            limit,
            cursor: None,
            direction: PageDirection::Forward,
        }
    }

    /// Trailing page, walking backward.
    pub fn last(limit: usize) -> Self {
        PageRequest {
            limit,
            cursor: None,
            direction: PageDirection::Backward,
        }
    }

    pub fn after(limit: usize, cursor: Cursor) -> Self {
        PageRequest {
            limit,
            cursor: Some(cursor),
            direction: PageDirection::Forward,
        }
    }

    pub fn before(limit: usize, cursor: Cursor) -> Self {
        PageRequest {
            limit,
            cursor: Some(cursor),
            direction: PageDirection::Backward,
        }
    }

    /// Continue in the same direction from `cursor`.
    pub fn next(&self, cursor: Cursor) -> Self {
        PageRequest {
            limit: self.limit,
            cursor: Some(cursor),
            direction: self.direction,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the following page; `None` when this page came back short.
    pub next_cursor: Option<Cursor>,
    /// Rows matching the filter across all pages.
    pub total_count: u64,
}

/// `column` is strictly beyond `value` when walking `direction`, nulls last.
fn beyond(column: &str, value: &ScalarValue, direction: SortDirection) -> Condition {
    let col = Column::new(column);
    match (direction, value.is_null()) {
        (SortDirection::Asc, false) => col.gt(value.clone()) | col.is_null(),
        (SortDirection::Asc, true) => Condition::never(column),
        (SortDirection::Desc, false) => col.lt(value.clone()),
        (SortDirection::Desc, true) => col.is_not_null(),
    }
}

/// Predicate selecting rows strictly past `cursor` in `order`.
///
/// `order` must already be normalized (see [`normalize_order`]).
pub fn cursor_condition(order: &[OrderBy], cursor: &Cursor, direction: PageDirection) -> Condition {
    let mut branches = Vec::with_capacity(order.len());
    for (i, term) in order.iter().enumerate() {
        let walk = match direction {
            PageDirection::Forward => term.direction,
            PageDirection::Backward => term.direction.reversed(),
        };
        let equal_prefix = order[..i]
            .iter()
            .map(|prior| Column::new(&prior.column).eq(cursor.value(&prior.column)));
        let branch = equal_prefix.chain(std::iter::once(beyond(
            &term.column,
            &cursor.value(&term.column),
            walk,
        )));
        if let Some(branch) = Condition::all(branch) {
            branches.push(branch);
        }
    }
    Condition::any(branches).unwrap_or_else(|| Condition::never(crate::TIEBREAKER_COLUMN))
}

/// Everything needed to run one page query.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    /// Normalized ordering in the caller's direction.
    pub order: Vec<OrderBy>,
    /// Filter combined with the cursor predicate.
    pub condition: Option<Condition>,
    pub limit: usize,
    /// The query runs in reversed order; rows are flipped back in [`PagePlan::finish`].
    pub reverse: bool,
}

impl PagePlan {
    pub fn new(filter: Option<&Condition>, order: &[OrderBy], request: &PageRequest) -> Result<Self> {
        if request.limit == 0 {
            return Err(QueryError::ZeroLimit);
        }
        let order = normalize_order(order)?;
        let keyset = request
            .cursor
            .as_ref()
            .map(|cursor| cursor_condition(&order, cursor, request.direction));
        let condition = match (filter.cloned(), keyset) {
            (Some(filter), Some(keyset)) => Some(filter & keyset),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };
        Ok(PagePlan {
            order,
            condition,
            limit: request.limit,
            reverse: request.direction == PageDirection::Backward,
        })
    }

    /// Compiled `WHERE` body; empty SQL when nothing filters.
    pub fn where_sql(&self, dialect: Dialect) -> Result<CompiledFilter> {
        match &self.condition {
            Some(condition) => compile(condition, dialect),
            None => Ok(CompiledFilter {
                sql: String::new(),
                params: Vec::new(),
            }),
        }
    }

    /// [`PagePlan::where_sql`] against the columns of a concrete table.
    pub fn where_sql_for(&self, dialect: Dialect, known: &KnownColumns) -> Result<CompiledFilter> {
        match &self.condition {
            Some(condition) => compile_for(condition, dialect, known),
            None => Ok(CompiledFilter {
                sql: String::new(),
                params: Vec::new(),
            }),
        }
    }

    /// `ORDER BY` clause as executed (reversed for backward pages).
    pub fn order_sql(&self) -> String {
        order_clause(&self.order, self.reverse)
    }

    /// Cursor for a row under this plan's ordering.
    pub fn cursor_for(&self, lookup: impl Fn(&str) -> ScalarValue) -> Cursor {
        Cursor::from_row(&self.order, lookup)
    }

    /// Assemble the page from rows fetched in execution order.
    pub fn finish<T>(&self, mut items: Vec<T>, total_count: u64, cursor_of: impl Fn(&T) -> Cursor) -> Page<T> {
        if self.reverse {
            items.reverse();
        }
        let next_cursor = if items.len() < self.limit {
            None
        } else if self.reverse {
            items.first().map(&cursor_of)
        } else {
            items.last().map(&cursor_of)
        };
        Page {
            items,
            next_cursor,
            total_count,
        }
    }
}
