//! In-memory SQLite view of the logical index.
//!
//! Index rows are loaded into one table, `transcripts`, with a column per
//! unioned index column. Filters and page plans compile to the SQLite dialect
//! and run here, so metadata-only queries never open a data file.
//!
//! SQLite resolves column names ignoring ASCII case, so the table holds at
//! most one column per case-folded name. The first spelling loaded owns it.

use std::collections::{HashMap, HashSet};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Number, Value as Json};
use tracing::debug;
use tscribe_common::schema::{is_reserved_column, FILENAME, TRANSCRIPT_ID};
use tscribe_common::TranscriptInfo;
use tscribe_query::dialect::quote_ident;
use tscribe_query::{
    compile_for, normalize_order, order_clause, CompiledFilter, Condition, Dialect, KnownColumns,
    OrderBy, Page, PagePlan, PageRequest, ScalarValue,
};

use crate::error::Result;
use crate::index::IndexTable;
use crate::migrate::{migrate_columns, MigrationReport};
use crate::schema::METADATA;

/// Name of the table holding the logical index.
pub const TABLE: &str = "transcripts";

/// Largest number of ids bound in one `IN` list.
const ID_CHUNK: usize = 500;

fn to_sql(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => Value::Integer(i64::from(*b)),
        ScalarValue::Int(i) => Value::Integer(*i),
        ScalarValue::Float(f) => Value::Real(*f),
        ScalarValue::Text(s) => Value::Text(s.clone()),
    }
}

fn to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Integer(i) => ScalarValue::Int(*i),
        Value::Real(f) => ScalarValue::Float(*f),
        Value::Text(s) => ScalarValue::Text(s.clone()),
        Value::Null | Value::Blob(_) => ScalarValue::Null,
    }
}

fn sqlite_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Int64 | DataType::Boolean => "INTEGER",
        DataType::Float64 => "REAL",
        _ => "TEXT",
    }
}

/// Normalize a column to one of the types [`cell`] understands.
fn sqlite_ready(column: &ArrayRef) -> Result<ArrayRef> {
    match column.data_type() {
        DataType::Utf8 | DataType::Int64 | DataType::Float64 | DataType::Boolean => {
            Ok(column.clone())
        }
        _ => Ok(cast(column, &DataType::Utf8)?),
    }
}

fn cell(column: &ArrayRef, row: usize) -> Value {
    if column.is_null(row) {
        return Value::Null;
    }
    match column.data_type() {
        DataType::Int64 => Value::Integer(column.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => Value::Real(column.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Value::Integer(i64::from(column.as_boolean().value(row))),
        _ => Value::Text(column.as_string::<i32>().value(row).to_string()),
    }
}

/// One result row keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Value of `column` for cursors, matched ignoring ASCII case; absent
    /// columns are null.
    pub fn scalar(&self, column: &str) -> ScalarValue {
        self.values
            .get(column)
            .or_else(|| {
                self.values
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
                    .map(|(_, value)| value)
            })
            .map(to_scalar)
            .unwrap_or_default()
    }

    fn text(&self, column: &str) -> Option<String> {
        match self.values.get(column) {
            Some(Value::Text(s)) => Some(s.clone()),
            Some(Value::Integer(i)) => Some(i.to_string()),
            Some(Value::Real(f)) => Some(f.to_string()),
            _ => None,
        }
    }

    fn real(&self, column: &str) -> Option<f64> {
        match self.values.get(column) {
            Some(Value::Real(f)) => Some(*f),
            Some(Value::Integer(i)) => Some(*i as f64),
            Some(Value::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    fn integer(&self, column: &str) -> Option<i64> {
        match self.values.get(column) {
            Some(Value::Integer(i)) => Some(*i),
            Some(Value::Real(f)) if f.fract() == 0.0 => Some(*f as i64),
            Some(Value::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    fn boolean(&self, column: &str) -> Option<bool> {
        match self.values.get(column) {
            Some(Value::Integer(i)) => Some(*i != 0),
            Some(Value::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Metadata from the JSON column, or rebuilt from flattened columns when
    /// the row predates it.
    fn metadata(&self) -> Result<Map<String, Json>> {
        if let Some(Value::Text(raw)) = self.values.get(METADATA) {
            return Ok(serde_json::from_str(raw)?);
        }
        let mut map = Map::new();
        for (column, value) in &self.values {
            if is_reserved_column(column) {
                continue;
            }
            let json = match value {
                Value::Integer(i) => Json::from(*i),
                Value::Real(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
                Value::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| Json::String(s.clone())),
                Value::Null | Value::Blob(_) => continue,
            };
            map.insert(column.clone(), json);
        }
        Ok(map)
    }

    pub fn to_info(&self) -> Result<TranscriptInfo> {
        Ok(TranscriptInfo {
            transcript_id: self.text(TRANSCRIPT_ID).unwrap_or_default(),
            source_type: self.text("source_type"),
            source_id: self.text("source_id"),
            source_uri: self.text("source_uri"),
            model: self.text("model"),
            score: self.real("score"),
            success: self.boolean("success"),
            total_tokens: self.integer("total_tokens"),
            total_time: self.real("total_time"),
            error: self.text("error"),
            limit: self.text("limit"),
            metadata: self.metadata()?,
        })
    }
}

/// A column of the `transcripts` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Generated alias columns cannot be inserted into.
    pub generated: bool,
}

/// SQLite-backed query engine over one index snapshot.
pub struct QueryEngine {
    conn: Connection,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine").finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Empty engine with only the key columns.
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        if let Some(setup) = Dialect::Sqlite.session_setup() {
            conn.execute_batch(setup)?;
        }
        conn.execute_batch(&format!(
            "CREATE TABLE {} ({} TEXT PRIMARY KEY NOT NULL, {} TEXT)",
            quote_ident(TABLE),
            quote_ident(TRANSCRIPT_ID),
            quote_ident(FILENAME)
        ))?;
        Ok(QueryEngine { conn })
    }

    /// Engine holding every row of `table`.
    pub fn from_index(table: &IndexTable) -> Result<Self> {
        let mut engine = Self::new()?;
        for batch in &table.batches {
            engine.load_batch(batch)?;
        }
        Ok(engine)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Columns of `transcripts`, in table order.
    pub fn columns(&self) -> Result<Vec<TableColumn>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_xinfo({})", quote_ident(TABLE)))?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let hidden: i64 = row.get(6)?;
                Ok(TableColumn {
                    name,
                    generated: hidden == 2 || hidden == 3,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Column names for compiling filters against this table.
    pub fn known_columns(&self) -> Result<KnownColumns> {
        Ok(self.columns()?.into_iter().map(|c| c.name).collect())
    }

    /// Insert index rows, adding any columns the table lacks.
    ///
    /// A batch column whose name matches a table column, or an earlier batch
    /// column, only up to ASCII case is not loaded; its values stay reachable
    /// through `metadata`. A batch
    /// column that arrives for a generated alias replaces the alias with a
    /// stored column. Rows whose id is already present are skipped. Returns
    /// the number inserted.
    pub fn load_batch(&mut self, batch: &RecordBatch) -> Result<usize> {
        if batch.num_rows() == 0 {
            return Ok(0);
        }
        let existing: HashMap<String, TableColumn> = self
            .columns()?
            .into_iter()
            .map(|c| (c.name.to_ascii_lowercase(), c))
            .collect();

        let schema = batch.schema();
        // Per case-folded name, the one batch column to load: the exact
        // spelling of an existing table column, else the first spelling seen.
        let mut chosen: HashMap<String, usize> = HashMap::new();
        for (i, field) in schema.fields().iter().enumerate() {
            let folded = field.name().to_ascii_lowercase();
            let fits = existing
                .get(&folded)
                .map_or(true, |found| found.name == *field.name());
            if fits {
                chosen.entry(folded).or_insert(i);
            }
        }

        let mut targets: Vec<(String, ArrayRef)> = Vec::new();
        for (i, (field, column)) in schema.fields().iter().zip(batch.columns()).enumerate() {
            let name = field.name();
            let folded = name.to_ascii_lowercase();
            if chosen.get(&folded) != Some(&i) {
                debug!(column = %name, "Skipping index column that repeats another only in case");
                continue;
            }
            match existing.get(&folded) {
                Some(found) if found.generated => {
                    self.materialize(name, field.data_type())?;
                }
                Some(_) => {}
                None => {
                    self.conn.execute_batch(&format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote_ident(TABLE),
                        quote_ident(name),
                        sqlite_type(field.data_type())
                    ))?;
                    debug!(column = %name, "Added index column");
                }
            }
            targets.push((name.clone(), sqlite_ready(column)?));
        }
        if targets.is_empty() {
            return Ok(0);
        }

        let names: Vec<String> = targets.iter().map(|(n, _)| quote_ident(n)).collect();
        let placeholders: Vec<String> = (1..=targets.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote_ident(TABLE),
            names.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..batch.num_rows() {
                let values = targets.iter().map(|(_, column)| cell(column, row));
                inserted += stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        debug!(rows = inserted, "Loaded index rows into engine");
        Ok(inserted)
    }

    /// Turn the generated alias `name` into a stored column holding the
    /// values the alias produced, so rows can be inserted into it.
    fn materialize(&mut self, name: &str, data_type: &DataType) -> Result<()> {
        let table = quote_ident(TABLE);
        let column = quote_ident(name);
        let staging = quote_ident(&format!("{name}__stored"));
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {staging} {ty};
             UPDATE {table} SET {staging} = {column};
             ALTER TABLE {table} DROP COLUMN {column};
             ALTER TABLE {table} RENAME COLUMN {staging} TO {column};",
            ty = sqlite_type(data_type),
        ))?;
        tx.commit()?;
        debug!(column = name, "Materialized alias column");
        Ok(())
    }

    fn query_rows(&self, sql: &str, params: &[ScalarValue]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter().map(to_sql)), |row| {
                let mut values = HashMap::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    values.insert(name.clone(), row.get::<_, Value>(i)?);
                }
                Ok(Row { values })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn compiled(filter: Option<&Condition>, known: &KnownColumns) -> Result<CompiledFilter> {
        match filter {
            Some(condition) => Ok(compile_for(condition, Dialect::Sqlite, known)?),
            None => Ok(CompiledFilter {
                sql: String::new(),
                params: Vec::new(),
            }),
        }
    }

    /// Number of rows matching `filter`.
    pub fn count(&self, filter: Option<&Condition>) -> Result<u64> {
        let compiled = Self::compiled(filter, &self.known_columns()?)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} {}",
            quote_ident(TABLE),
            compiled.where_clause()
        );
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(compiled.params.iter().map(to_sql)),
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Matching rows in `order` (plus the id tiebreaker), up to `limit`.
    pub fn select_rows(
        &self,
        filter: Option<&Condition>,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let known = self.known_columns()?;
        let compiled = Self::compiled(filter, &known)?;
        let order = normalize_order(&present_terms(order, &known))?;
        let mut sql = format!(
            "SELECT * FROM {} {} {}",
            quote_ident(TABLE),
            compiled.where_clause(),
            order_clause(&order, false)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        self.query_rows(&sql, &compiled.params)
    }

    /// Matching transcripts without content.
    pub fn select(
        &self,
        filter: Option<&Condition>,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptInfo>> {
        self.select_rows(filter, order, limit)?
            .iter()
            .map(Row::to_info)
            .collect()
    }

    /// One keyset page; `total_count` counts every row matching `filter`.
    pub fn page(
        &self,
        filter: Option<&Condition>,
        order: &[OrderBy],
        request: &PageRequest,
    ) -> Result<Page<TranscriptInfo>> {
        let known = self.known_columns()?;
        let plan = PagePlan::new(filter, &present_terms(order, &known), request)?;
        let compiled = plan.where_sql_for(Dialect::Sqlite, &known)?;
        let sql = format!(
            "SELECT * FROM {} {} {} LIMIT {}",
            quote_ident(TABLE),
            compiled.where_clause(),
            plan.order_sql(),
            plan.limit
        );
        let rows = self.query_rows(&sql, &compiled.params)?;
        let total = self.count(filter)?;
        let page = plan.finish(rows, total, |row| plan.cursor_for(|column| row.scalar(column)));
        Ok(Page {
            items: page.items.iter().map(Row::to_info).collect::<Result<Vec<_>>>()?,
            next_cursor: page.next_cursor,
            total_count: page.total_count,
        })
    }

    /// `transcript_id → filename` for the ids present in the index.
    pub fn filenames(&self, ids: &[&str]) -> Result<HashMap<String, String>> {
        let mut out = HashMap::new();
        for chunk in ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {}, {} FROM {} WHERE {} IN ({placeholders})",
                quote_ident(TRANSCRIPT_ID),
                quote_ident(FILENAME),
                quote_ident(TABLE),
                quote_ident(TRANSCRIPT_ID),
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            for row in rows {
                if let (id, Some(filename)) = row? {
                    out.insert(id, filename);
                }
            }
        }
        Ok(out)
    }

    /// The subset of `ids` already in the index.
    pub fn existing_ids(&self, ids: &[&str]) -> Result<HashSet<String>> {
        Ok(self.filenames(ids)?.into_keys().collect())
    }

    /// Every data file name the snapshot references.
    pub fn referenced_filenames(&self) -> Result<HashSet<String>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL",
            quote_ident(FILENAME),
            quote_ident(TABLE),
            quote_ident(FILENAME)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }

    /// Alias legacy column names on the `transcripts` table.
    ///
    /// Where both names are already stored, rows that only carry the legacy
    /// value get it copied into the current column.
    pub fn migrate(&self, mapping: &[(&str, &str)]) -> Result<MigrationReport> {
        let stored: HashSet<String> = self
            .columns()?
            .into_iter()
            .filter(|c| !c.generated)
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        for &(old, new) in mapping {
            if !stored.contains(&old.to_ascii_lowercase()) || !stored.contains(&new.to_ascii_lowercase()) {
                continue;
            }
            let filled = self.conn.execute(
                &format!(
                    "UPDATE {table} SET {new} = {old} WHERE {new} IS NULL AND {old} IS NOT NULL",
                    table = quote_ident(TABLE),
                    new = quote_ident(new),
                    old = quote_ident(old),
                ),
                [],
            )?;
            if filled > 0 {
                debug!(old, new, rows = filled, "Filled renamed column from legacy values");
            }
        }
        migrate_columns(&self.conn, TABLE, mapping)
    }
}

/// Ordering terms on columns the table has. An absent column is null on
/// every row and cannot change the order.
fn present_terms(order: &[OrderBy], known: &KnownColumns) -> Vec<OrderBy> {
    order
        .iter()
        .filter(|term| {
            let present = known.contains(&term.base_column());
            if !present {
                debug!(column = %term.column, "Ignoring ordering on absent column");
            }
            present
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_index_batch;
    use arrow::array::StringArray;
    use arrow::datatypes::{Field, Schema};
    use serde_json::json;
    use std::sync::Arc;
    use tscribe_query::Column;

    fn text_column(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    fn info(id: &str, model: &str, score: Option<f64>, temperature: f64) -> TranscriptInfo {
        let mut info = TranscriptInfo::new(id);
        info.model = Some(model.to_string());
        info.score = score;
        info.success = Some(score.is_some());
        info.metadata.insert("temperature".into(), json!(temperature));
        info.metadata.insert("config".into(), json!({"temperature": temperature}));
        info
    }

    fn engine() -> QueryEngine {
        let rows = [
            info("a", "gpt-4", Some(0.9), 0.1),
            info("b", "claude", Some(0.4), 0.7),
            info("c", "claude", None, 0.9),
        ];
        let pairs: Vec<(&TranscriptInfo, &str)> = rows.iter().map(|i| (i, "f1.parquet")).collect();
        let mut engine = QueryEngine::new().unwrap();
        engine.load_batch(&build_index_batch(&pairs).unwrap()).unwrap();
        engine
    }

    #[test]
    fn test_count_and_filters() {
        let engine = engine();
        assert_eq!(engine.count(None).unwrap(), 3);
        assert_eq!(engine.count(Some(&Column::new("model").eq("claude"))).unwrap(), 2);
        assert_eq!(engine.count(Some(&Column::new("temperature").gt(0.5))).unwrap(), 2);
        assert_eq!(
            engine
                .count(Some(&Column::new("metadata.config.temperature").lt(0.5)))
                .unwrap(),
            1
        );
        assert_eq!(engine.count(Some(&Column::new("success").eq(true))).unwrap(), 2);
    }

    #[test]
    fn test_select_orders_and_decodes() {
        let engine = engine();
        let infos = engine
            .select(None, &[OrderBy::desc("score")], None)
            .unwrap();
        let ids: Vec<_> = infos.iter().map(|i| i.transcript_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(infos[1].model.as_deref(), Some("gpt-4"));
        assert_eq!(infos[1].score, Some(0.9));
        assert_eq!(infos[1].success, Some(true));
        assert_eq!(infos[1].metadata["config"], json!({"temperature": 0.1}));
    }

    #[test]
    fn test_page_reports_filtered_total() {
        let engine = engine();
        let filter = Column::new("model").eq("claude");
        let page = engine
            .page(Some(&filter), &[], &PageRequest::first(1))
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_count, 2);
        let next = engine
            .page(Some(&filter), &[], &PageRequest::first(1).next(page.next_cursor.unwrap()))
            .unwrap();
        assert_eq!(next.items[0].transcript_id, "c");
    }

    #[test]
    fn test_duplicate_ids_ignored_and_columns_added() {
        let mut engine = engine();
        let mut extra = TranscriptInfo::new("d");
        extra.metadata.insert("task".into(), json!("math"));
        let dup = TranscriptInfo::new("a");
        let batch = build_index_batch(&[(&extra, "f2.parquet"), (&dup, "f2.parquet")]).unwrap();
        assert_eq!(engine.load_batch(&batch).unwrap(), 1);
        assert_eq!(engine.count(Some(&Column::new("task").eq("math"))).unwrap(), 1);
        assert_eq!(engine.filenames(&["a", "d", "zz"]).unwrap().len(), 2);
        assert_eq!(
            engine.referenced_filenames().unwrap(),
            HashSet::from(["f1.parquet".to_string(), "f2.parquet".to_string()])
        );
    }

    #[test]
    fn test_case_variant_columns_do_not_collide() {
        let mut engine = engine();
        let mut upper = TranscriptInfo::new("d");
        upper.metadata.insert("Temperature".into(), json!(5.0));
        upper.metadata.insert("Task".into(), json!("upper"));
        upper.metadata.insert("task".into(), json!("lower"));
        let batch = build_index_batch(&[(&upper, "f2.parquet")]).unwrap();
        assert_eq!(engine.load_batch(&batch).unwrap(), 1);

        let folded: Vec<String> = engine
            .columns()
            .unwrap()
            .into_iter()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        let unique: HashSet<&String> = folded.iter().collect();
        assert_eq!(unique.len(), folded.len());
        assert_eq!(engine.count(Some(&Column::new("temperature").gt(1.0))).unwrap(), 0);

        let infos = engine.select(Some(&Column::new("transcript_id").eq("d")), &[], None).unwrap();
        assert_eq!(infos[0].metadata["task"], json!("lower"));
        assert_eq!(infos[0].metadata["Temperature"], json!(5.0));
    }

    #[test]
    fn test_absent_columns_read_as_null() {
        let engine = engine();
        assert_eq!(engine.count(Some(&Column::new("task").eq("task"))).unwrap(), 0);
        assert_eq!(engine.count(Some(&Column::new("task").is_null())).unwrap(), 3);
        assert_eq!(engine.count(Some(&Column::new("MODEL").eq("claude"))).unwrap(), 2);

        let infos = engine
            .select(None, &[OrderBy::desc("task"), OrderBy::asc("Model")], None)
            .unwrap();
        let ids: Vec<_> = infos.iter().map(|i| i.transcript_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let page = engine
            .page(None, &[OrderBy::asc("MODEL")], &PageRequest::first(2))
            .unwrap();
        let cursor = page.next_cursor.unwrap();
        assert_eq!(cursor.value("MODEL"), ScalarValue::Text("claude".into()));
        let rest = engine
            .page(None, &[OrderBy::asc("MODEL")], &PageRequest::first(2).next(cursor))
            .unwrap();
        assert_eq!(rest.items[0].transcript_id, "a");
    }

    #[test]
    fn test_like_is_case_sensitive() {
        let engine = engine();
        assert_eq!(engine.count(Some(&Column::new("model").like("GPT%"))).unwrap(), 0);
        assert_eq!(engine.count(Some(&Column::new("model").like("gpt%"))).unwrap(), 1);
        assert_eq!(engine.count(Some(&Column::new("model").ilike("GPT%"))).unwrap(), 1);
    }

    #[test]
    fn test_stored_column_replaces_generated_alias() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSCRIPT_ID, DataType::Utf8, false),
            Field::new(FILENAME, DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
        ]));
        let legacy = RecordBatch::try_new(
            schema,
            vec![
                text_column(vec![Some("old")]),
                text_column(vec![Some("f0.parquet")]),
                text_column(vec![Some("eval")]),
            ],
        )
        .unwrap();
        let mut engine = QueryEngine::new().unwrap();
        engine.load_batch(&legacy).unwrap();
        engine.migrate(&[("source", "source_type")]).unwrap();
        assert!(engine.columns().unwrap().iter().any(|c| c.name == "source_type" && c.generated));

        let mut fresh = TranscriptInfo::new("new");
        fresh.source_type = Some("agent".into());
        let batch = build_index_batch(&[(&fresh, "f1.parquet")]).unwrap();
        assert_eq!(engine.load_batch(&batch).unwrap(), 1);

        assert!(engine.columns().unwrap().iter().any(|c| c.name == "source_type" && !c.generated));
        assert_eq!(engine.count(Some(&Column::new("source_type").eq("agent"))).unwrap(), 1);
        assert_eq!(engine.count(Some(&Column::new("source_type").eq("eval"))).unwrap(), 1);
        assert_eq!(engine.count(Some(&Column::new("source_type").is_null())).unwrap(), 0);
    }

    #[test]
    fn test_migrate_fills_current_column_from_legacy() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSCRIPT_ID, DataType::Utf8, false),
            Field::new(FILENAME, DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
            Field::new("source_type", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                text_column(vec![Some("old"), Some("new")]),
                text_column(vec![Some("f0.parquet"), Some("f1.parquet")]),
                text_column(vec![Some("eval"), None]),
                text_column(vec![None, Some("agent")]),
            ],
        )
        .unwrap();
        let mut engine = QueryEngine::new().unwrap();
        engine.load_batch(&batch).unwrap();
        engine.migrate(&[("source", "source_type")]).unwrap();
        assert_eq!(engine.count(Some(&Column::new("source_type").eq("eval"))).unwrap(), 1);
        assert_eq!(engine.count(Some(&Column::new("source_type").eq("agent"))).unwrap(), 1);
    }

    #[test]
    fn test_metadata_rebuilt_without_json_column() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSCRIPT_ID, DataType::Utf8, false),
            Field::new(FILENAME, DataType::Utf8, false),
            Field::new("task", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                text_column(vec![Some("x")]),
                text_column(vec![Some("f.parquet")]),
                text_column(vec![Some("math")]),
            ],
        )
        .unwrap();
        let mut engine = QueryEngine::new().unwrap();
        engine.load_batch(&batch).unwrap();
        let infos = engine.select(None, &[], None).unwrap();
        assert_eq!(infos[0].metadata["task"], json!("math"));
    }
}
