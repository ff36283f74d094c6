//! Result ordering.
//!
//! Nulls sort as the greatest value in every dialect: `ASC NULLS LAST` and
//! `DESC NULLS FIRST`. Stating this explicitly keeps page boundaries identical
//! across dialects whose defaults differ.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dialect::quote_ident;
use crate::error::{QueryError, Result};
use crate::path::parse_column_path;
use crate::TIEBREAKER_COLUMN;

/// Sort direction of one ordering column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One `(column, direction)` ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `column`, `column:asc`, or `column:desc`.
    pub fn parse(term: &str) -> Result<Self> {
        let (column, direction) = match term.rsplit_once(':') {
            Some((column, dir)) => {
                let direction = match dir.trim().to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    _ => return Err(QueryError::InvalidSort(term.to_string())),
                };
                (column.trim(), direction)
            }
            None => (term.trim(), SortDirection::Asc),
        };
        if column.is_empty() {
            return Err(QueryError::InvalidSort(term.to_string()));
        }
        Ok(OrderBy {
            column: column.to_string(),
            direction,
        })
    }

    /// Unquoted column name, as the table knows it.
    ///
    /// `"my col"` names the column `my col`. Terms that do not parse as a
    /// column path are used verbatim.
    pub fn base_column(&self) -> String {
        parse_column_path(&self.column)
            .map(|path| path.base)
            .unwrap_or_else(|_| self.column.clone())
    }

    fn render(&self, reverse: bool) -> String {
        let direction = if reverse {
            self.direction.reversed()
        } else {
            self.direction
        };
        let nulls = match direction {
            SortDirection::Asc => "NULLS LAST",
            SortDirection::Desc => "NULLS FIRST",
        };
        format!("{} {direction} {nulls}", quote_ident(&self.base_column()))
    }
}

impl FromStr for OrderBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        OrderBy::parse(s)
    }
}

/// Apply the default ordering and the unique-key tiebreaker.
///
/// An empty ordering becomes `transcript_id ASC`; otherwise `transcript_id ASC`
/// is appended unless the caller already orders by it. Nested paths are
/// rejected because their extracted values sort differently per dialect.
pub fn normalize_order(order: &[OrderBy]) -> Result<Vec<OrderBy>> {
    let mut normalized = Vec::with_capacity(order.len() + 1);
    for term in order {
        if parse_column_path(&term.column)?.is_nested() {
            return Err(QueryError::UnsupportedOrderColumn(term.column.clone()));
        }
        normalized.push(term.clone());
    }
    if !normalized.iter().any(|term| term.base_column() == TIEBREAKER_COLUMN) {
        normalized.push(OrderBy::asc(TIEBREAKER_COLUMN));
    }
    Ok(normalized)
}

/// Render `ORDER BY ...` for `order`, optionally reversing every term.
pub fn order_clause(order: &[OrderBy], reverse: bool) -> String {
    if order.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = order.iter().map(|term| term.render(reverse)).collect();
    format!("ORDER BY {}", terms.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let order = normalize_order(&[]).unwrap();
        assert_eq!(order, vec![OrderBy::asc("transcript_id")]);
    }

    #[test]
    fn test_tiebreaker_appended_once() {
        let order = normalize_order(&[OrderBy::desc("score")]).unwrap();
        assert_eq!(order, vec![OrderBy::desc("score"), OrderBy::asc("transcript_id")]);

        let order = normalize_order(&[OrderBy::desc("transcript_id")]).unwrap();
        assert_eq!(order, vec![OrderBy::desc("transcript_id")]);
    }

    #[test]
    fn test_nested_order_rejected() {
        assert!(matches!(
            normalize_order(&[OrderBy::asc("metadata.x")]),
            Err(QueryError::UnsupportedOrderColumn(_))
        ));
    }

    #[test]
    fn test_parse_order_terms() {
        assert_eq!(OrderBy::parse("score:desc").unwrap(), OrderBy::desc("score"));
        assert_eq!(OrderBy::parse("model").unwrap(), OrderBy::asc("model"));
        assert!(OrderBy::parse("model:sideways").is_err());
        assert!(OrderBy::parse(":asc").is_err());
    }

    #[test]
    fn test_clause_rendering() {
        let order = [OrderBy::desc("score"), OrderBy::asc("transcript_id")];
        assert_eq!(
            order_clause(&order, false),
            "ORDER BY \"score\" DESC NULLS FIRST, \"transcript_id\" ASC NULLS LAST"
        );
        assert_eq!(
            order_clause(&order, true),
            "ORDER BY \"score\" ASC NULLS LAST, \"transcript_id\" DESC NULLS FIRST"
        );
    }

    #[test]
    fn test_quoted_column_rendered_once() {
        let term = OrderBy::asc("\"my col\"");
        assert_eq!(term.base_column(), "my col");
        assert_eq!(
            order_clause(&[term], false),
            "ORDER BY \"my col\" ASC NULLS LAST"
        );
        let order = normalize_order(&[OrderBy::desc("\"transcript_id\"")]).unwrap();
        assert_eq!(order.len(), 1);
    }
}
