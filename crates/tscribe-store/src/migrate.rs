//! Column-name migration for tables and views.
//!
//! Renamed columns are bridged by adding the new name next to the old one:
//! a virtual generated column on tables, an extra projected alias on views.
//! Stored data is never rewritten.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use tscribe_query::dialect::quote_ident;

use crate::error::{Result, StoreError};

/// Legacy column names and their current replacements.
pub const LEGACY_ALIASES: [(&str, &str); 3] = [
    ("source", "source_type"),
    ("tokens", "total_tokens"),
    ("time", "total_time"),
];

/// Kind of object a migration applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Table,
    View,
}

/// Outcome of one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `None` when the target does not exist.
    pub kind: Option<TargetKind>,
    /// New column names that were added.
    pub added: Vec<String>,
}

/// Column names of `target`, ASCII-lowercased the way SQLite matches them.
fn column_names(conn: &Connection, target: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_xinfo({})", quote_ident(target)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .map(|name| name.map(|n| n.to_ascii_lowercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

static VIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:"(?:[^"]|"")*"|\[[^\]]*\]|`[^`]*`|[^\s(]+)\s*(?:\([^)]*\)\s*)?AS\s+(?P<body>.+?)\s*;?\s*$"#,
    )
    .expect("regex")
});

fn view_body(sql: &str) -> Option<&str> {
    VIEW_RE
        .captures(sql)
        .and_then(|c| c.name("body"))
        .map(|m| m.as_str())
}

/// Add `new` as an alias of `old` on `target` for each `(old, new)` pair.
///
/// A pair applies only when `old` exists and `new` does not. A target that is
/// neither a table nor a view is left alone and reported with `kind: None`.
pub fn migrate_columns(
    conn: &Connection,
    target: &str,
    mapping: &[(&str, &str)],
) -> Result<MigrationReport> {
    let found: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT type, sql FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
            [target],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((kind, sql)) = found else {
        debug!(target, "Migration target does not exist");
        return Ok(MigrationReport::default());
    };
    let kind = if kind == "view" {
        TargetKind::View
    } else {
        TargetKind::Table
    };

    let mut columns = column_names(conn, target)?;
    let mut pending: Vec<(&str, &str)> = Vec::new();
    for &(old, new) in mapping {
        let new_folded = new.to_ascii_lowercase();
        if columns.contains(&old.to_ascii_lowercase()) && !columns.contains(&new_folded) {
            pending.push((old, new));
            columns.insert(new_folded);
        }
    }
    if pending.is_empty() {
        return Ok(MigrationReport {
            kind: Some(kind),
            added: Vec::new(),
        });
    }

    let tx = conn.unchecked_transaction()?;
    match kind {
        TargetKind::Table => {
            for (old, new) in &pending {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} GENERATED ALWAYS AS ({}) VIRTUAL",
                    quote_ident(target),
                    quote_ident(new),
                    quote_ident(old)
                ))?;
            }
        }
        TargetKind::View => {
            let body = sql
                .as_deref()
                .and_then(view_body)
                .ok_or_else(|| StoreError::Migration {
                    target: target.to_string(),
                    message: "view definition could not be parsed".to_string(),
                })?;
            let aliases: Vec<String> = pending
                .iter()
                .map(|(old, new)| format!("{} AS {}", quote_ident(old), quote_ident(new)))
                .collect();
            tx.execute_batch(&format!(
                "DROP VIEW {view}; CREATE VIEW {view} AS SELECT *, {aliases} FROM ({body})",
                view = quote_ident(target),
                aliases = aliases.join(", "),
            ))?;
        }
    }
    tx.commit()?;

    let added: Vec<String> = pending.iter().map(|(_, new)| new.to_string()).collect();
    info!(target, kind = ?kind, added = ?added, "Migrated column names");
    Ok(MigrationReport {
        kind: Some(kind),
        added,
    })
}
