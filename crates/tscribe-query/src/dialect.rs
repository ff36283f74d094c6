//! SQL dialects.
//!
//! The three dialects differ in placeholder style, in how a nested JSON value
//! is extracted, and in what type that extraction yields:
//!
//! | dialect  | placeholder | extraction                              | yields |
//! |----------|-------------|-----------------------------------------|--------|
//! | sqlite   | `?`         | `json_extract(col, '$.a.b')`            | typed  |
//! | duckdb   | `?`         | `json_extract_string(col, '$.a.b')`     | text   |
//! | postgres | `$1`, `$2`  | `col->'a'->>'b'`                        | text   |
//!
//! `LIKE` is case-sensitive and `ILIKE` is not in every dialect. SQLite only
//! honours that after [`Dialect::session_setup`] has run on the connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::path::{ColumnPath, PathSegment};
use crate::value::CastType;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    DuckDb,
    Postgres,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Sqlite, Dialect::DuckDb, Dialect::Postgres];

    /// Placeholder for the parameter at 1-based `position`.
    pub fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Sqlite | Dialect::DuckDb => "?".to_string(),
            Dialect::Postgres => format!("${position}"),
        }
    }

    /// Predicate that is always false.
    pub fn false_predicate(self) -> &'static str {
        "1 = 0"
    }

    /// Predicate that is always true.
    pub fn true_predicate(self) -> &'static str {
        "1 = 1"
    }

    /// Render a column reference, extracting a nested value when the path
    /// has segments.
    ///
    /// `cast` applies only to dialects whose extraction yields text. `as_text`
    /// requests an explicit text operand for pattern matching.
    pub fn column_expr(self, path: &ColumnPath, cast: Option<CastType>, as_text: bool) -> String {
        let base = quote_ident(&path.base);
        if !path.is_nested() {
            return base;
        }
        match self {
            Dialect::Sqlite => format!(
                "json_extract({base}, {})",
                sql_literal(&json_path(&path.segments))
            ),
            Dialect::DuckDb => {
                let extracted = format!(
                    "json_extract_string({base}, {})",
                    sql_literal(&json_path(&path.segments))
                );
                if as_text {
                    format!("CAST({extracted} AS VARCHAR)")
                } else {
                    match cast {
                        Some(CastType::Boolean) => format!("CAST({extracted} AS BOOLEAN)"),
                        Some(CastType::Integer) => format!("CAST({extracted} AS BIGINT)"),
                        Some(CastType::Double) => format!("CAST({extracted} AS DOUBLE)"),
                        None => extracted,
                    }
                }
            }
            Dialect::Postgres => {
                let mut expr = base;
                let last = path.segments.len() - 1;
                for (i, segment) in path.segments.iter().enumerate() {
                    expr.push_str(if i == last { "->>" } else { "->" });
                    expr.push_str(&pg_segment(segment));
                }
                match cast {
                    Some(CastType::Boolean) if !as_text => format!("({expr})::boolean"),
                    Some(CastType::Integer) if !as_text => format!("({expr})::bigint"),
                    Some(CastType::Double) if !as_text => format!("({expr})::double precision"),
                    _ => expr,
                }
            }
        }
    }

    /// Statements a connection must run before compiled filters match the
    /// documented semantics.
    ///
    /// SQLite's `LIKE` ignores ASCII case unless `case_sensitive_like` is on.
    pub fn session_setup(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some("PRAGMA case_sensitive_like = ON"),
            Dialect::DuckDb | Dialect::Postgres => None,
        }
    }

    /// Case-insensitive pattern match.
    pub fn ilike(self, expr: &str, placeholder: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        match self {
            Dialect::Sqlite => format!("LOWER({expr}) {not}LIKE LOWER({placeholder})"),
            Dialect::DuckDb | Dialect::Postgres => format!("{expr} {not}ILIKE {placeholder}"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(QueryError::UnknownDialect(other.to_string())),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn sql_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Build a `$.a[0]."b.c"` JSON path.
pub fn json_path(segments: &[PathSegment]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        if segment.is_index {
            path.push('[');
            path.push_str(&segment.key);
            path.push(']');
        } else if is_plain_key(&segment.key) {
            path.push('.');
            path.push_str(&segment.key);
        } else {
            path.push_str(".\"");
            path.push_str(&segment.key.replace('\\', "\\\\").replace('"', "\\\""));
            path.push('"');
        }
    }
    path
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn pg_segment(segment: &PathSegment) -> String {
    if segment.is_index {
        segment.key.clone()
    } else {
        sql_literal(&segment.key)
    }
}
