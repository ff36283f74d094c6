//! Arrow schemas for data and index files.
//!
//! Data files hold complete transcripts. Content (`messages`, `events`) and
//! the full `metadata` map are stored as JSON text. Index files hold the same
//! fields minus content, plus `filename` and one typed column per top-level
//! metadata key so those keys can be filtered without JSON extraction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};
use tscribe_common::schema::{FILENAME, SCHEMA_VERSION, SCHEMA_VERSION_KEY, TRANSCRIPT_ID};
use tscribe_common::{ChatMessage, Event, Transcript, TranscriptInfo};

use crate::error::{Result, StoreError};

pub const METADATA: &str = "metadata";
pub const MESSAGES: &str = "messages";
pub const EVENTS: &str = "events";

/// Column type inferred for a flattened metadata key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Nested or mixed values, stored as JSON text.
    Json,
}

impl MetadataType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(MetadataType::Boolean),
            Value::Number(n) if n.is_i64() => Some(MetadataType::Int64),
            Value::Number(_) => Some(MetadataType::Float64),
            Value::String(_) => Some(MetadataType::Utf8),
            Value::Array(_) | Value::Object(_) => Some(MetadataType::Json),
        }
    }

    fn merge(self, other: Self) -> Self {
        use MetadataType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Json,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            MetadataType::Boolean => DataType::Boolean,
            MetadataType::Int64 => DataType::Int64,
            MetadataType::Float64 => DataType::Float64,
            MetadataType::Utf8 | MetadataType::Json => DataType::Utf8,
        }
    }

    fn array(self, infos: &[&TranscriptInfo], key: &str) -> ArrayRef {
        let values = infos.iter().map(|info| info.metadata.get(key).filter(|v| !v.is_null()));
        match self {
            MetadataType::Boolean => Arc::new(BooleanArray::from(
                values.map(|v| v.and_then(Value::as_bool)).collect::<Vec<_>>(),
            )),
            MetadataType::Int64 => Arc::new(Int64Array::from(
                values.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
            )),
            MetadataType::Float64 => Arc::new(Float64Array::from(
                values.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
            )),
            MetadataType::Utf8 => Arc::new(StringArray::from(
                values.map(|v| v.and_then(Value::as_str)).collect::<Vec<_>>(),
            )),
            MetadataType::Json => Arc::new(StringArray::from(
                values.map(|v| v.map(Value::to_string)).collect::<Vec<_>>(),
            )),
        }
    }
}

/// Infer one column type per top-level metadata key across a batch.
pub fn infer_metadata_columns(infos: &[&TranscriptInfo]) -> BTreeMap<String, MetadataType> {
    let mut columns: BTreeMap<String, Option<MetadataType>> = BTreeMap::new();
    for info in infos {
        for (key, value) in &info.metadata {
            let slot = columns.entry(key.clone()).or_insert(None);
            if let Some(ty) = MetadataType::of(value) {
                *slot = Some(match *slot {
                    Some(prev) => prev.merge(ty),
                    None => ty,
                });
            }
        }
    }
    columns
        .into_iter()
        .map(|(key, ty)| (key, ty.unwrap_or(MetadataType::Utf8)))
        .collect()
}

fn info_fields() -> Vec<Field> {
    vec![
        Field::new("source_type", DataType::Utf8, true),
        Field::new("source_id", DataType::Utf8, true),
        Field::new("source_uri", DataType::Utf8, true),
        Field::new("model", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
        Field::new("success", DataType::Boolean, true),
        Field::new("total_tokens", DataType::Int64, true),
        Field::new("total_time", DataType::Float64, true),
        Field::new("error", DataType::Utf8, true),
        Field::new("limit", DataType::Utf8, true),
        Field::new(METADATA, DataType::Utf8, true),
    ]
}

fn versioned(fields: Vec<Field>) -> Schema {
    Schema::new(fields).with_metadata(HashMap::from([(
        SCHEMA_VERSION_KEY.to_string(),
        SCHEMA_VERSION.to_string(),
    )]))
}

/// Schema of data files.
pub fn data_schema() -> SchemaRef {
    let mut fields = vec![Field::new(TRANSCRIPT_ID, DataType::Utf8, false)];
    fields.extend(info_fields());
    fields.push(Field::new(MESSAGES, DataType::Utf8, true));
    fields.push(Field::new(EVENTS, DataType::Utf8, true));
    Arc::new(versioned(fields))
}

/// Schema of index files for a batch with the given flattened metadata keys.
pub fn index_schema(metadata_columns: &BTreeMap<String, MetadataType>) -> SchemaRef {
    let mut fields = vec![
        Field::new(TRANSCRIPT_ID, DataType::Utf8, false),
        Field::new(FILENAME, DataType::Utf8, false),
    ];
    fields.extend(info_fields());
    for (key, ty) in metadata_columns {
        fields.push(Field::new(key, ty.data_type(), true));
    }
    Arc::new(versioned(fields))
}

fn info_arrays(infos: &[&TranscriptInfo]) -> Result<Vec<ArrayRef>> {
    let text = |f: fn(&TranscriptInfo) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from(infos.iter().map(|i| f(i)).collect::<Vec<_>>()))
    };
    let metadata = infos
        .iter()
        .map(|i| serde_json::to_string(&i.metadata))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(vec![
        text(|i| i.source_type.as_deref()),
        text(|i| i.source_id.as_deref()),
        text(|i| i.source_uri.as_deref()),
        text(|i| i.model.as_deref()),
        Arc::new(Float64Array::from(infos.iter().map(|i| i.score).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(infos.iter().map(|i| i.success).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(infos.iter().map(|i| i.total_tokens).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(infos.iter().map(|i| i.total_time).collect::<Vec<_>>())),
        text(|i| i.error.as_deref()),
        text(|i| i.limit.as_deref()),
        Arc::new(StringArray::from(metadata)),
    ])
}

/// Serialized content of one transcript.
#[derive(Debug, Clone)]
pub struct EncodedContent {
    pub messages: String,
    pub events: String,
}

impl EncodedContent {
    pub fn encode(transcript: &Transcript) -> Result<Self> {
        Ok(EncodedContent {
            messages: serde_json::to_string(&transcript.messages)?,
            events: serde_json::to_string(&transcript.events)?,
        })
    }

    /// Rough encoded size of a row holding this content.
    pub fn estimated_row_bytes(&self, info: &TranscriptInfo) -> usize {
        let metadata: usize = info
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum();
        self.messages.len() + self.events.len() + metadata + info.transcript_id.len() + 128
    }
}

/// Build a data-file batch from transcripts and their encoded content.
pub fn build_data_batch(rows: &[(&Transcript, &EncodedContent)]) -> Result<RecordBatch> {
    let infos: Vec<&TranscriptInfo> = rows.iter().map(|(t, _)| &t.info).collect();
    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(
        infos.iter().map(|i| i.transcript_id.as_str()).collect::<Vec<_>>(),
    ))];
    columns.extend(info_arrays(&infos)?);
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|(_, c)| c.messages.as_str()).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|(_, c)| c.events.as_str()).collect::<Vec<_>>(),
    )));
    Ok(RecordBatch::try_new(data_schema(), columns)?)
}

/// Build an index batch from `(info, filename)` rows.
pub fn build_index_batch(rows: &[(&TranscriptInfo, &str)]) -> Result<RecordBatch> {
    let infos: Vec<&TranscriptInfo> = rows.iter().map(|(i, _)| *i).collect();
    let metadata_columns = infer_metadata_columns(&infos);
    let schema = index_schema(&metadata_columns);

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            infos.iter().map(|i| i.transcript_id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(rows.iter().map(|(_, f)| *f).collect::<Vec<_>>())),
    ];
    columns.extend(info_arrays(&infos)?);
    for (key, ty) in &metadata_columns {
        columns.push(ty.array(&infos, key));
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Check that the unique-key column exists and is text.
pub fn check_id_column(schema: &Schema, path: &Path) -> Result<()> {
    let field = schema
        .field_with_name(TRANSCRIPT_ID)
        .map_err(|_| StoreError::ColumnType {
            path: path.to_path_buf(),
            column: TRANSCRIPT_ID.to_string(),
            expected: DataType::Utf8.to_string(),
            actual: "missing".to_string(),
        })?;
    if field.data_type() != &DataType::Utf8 {
        return Err(StoreError::ColumnType {
            path: path.to_path_buf(),
            column: TRANSCRIPT_ID.to_string(),
            expected: DataType::Utf8.to_string(),
            actual: field.data_type().to_string(),
        });
    }
    Ok(())
}

pub(crate) fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    let idx = batch.schema().index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<StringArray>()
}

fn col_f64<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
    let idx = batch.schema().index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<Float64Array>()
}

fn col_i64<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int64Array> {
    let idx = batch.schema().index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<Int64Array>()
}

fn col_bool<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a BooleanArray> {
    let idx = batch.schema().index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<BooleanArray>()
}

fn text_at(array: Option<&StringArray>, row: usize) -> Option<String> {
    array.filter(|a| a.is_valid(row)).map(|a| a.value(row).to_string())
}

/// Decode the rows of a data-file batch whose id is in `wanted`.
///
/// Missing optional columns decode as absent values.
pub fn transcripts_from_batch(
    batch: &RecordBatch,
    wanted: &HashSet<&str>,
    path: &Path,
) -> Result<Vec<Transcript>> {
    check_id_column(&batch.schema(), path)?;
    let Some(ids) = col_string(batch, TRANSCRIPT_ID) else {
        return Ok(Vec::new());
    };
    let source_type = col_string(batch, "source_type");
    let source_id = col_string(batch, "source_id");
    let source_uri = col_string(batch, "source_uri");
    let model = col_string(batch, "model");
    let score = col_f64(batch, "score");
    let success = col_bool(batch, "success");
    let total_tokens = col_i64(batch, "total_tokens");
    let total_time = col_f64(batch, "total_time");
    let error = col_string(batch, "error");
    let limit = col_string(batch, "limit");
    let metadata = col_string(batch, METADATA);
    let messages = col_string(batch, MESSAGES);
    let events = col_string(batch, EVENTS);

    let mut out = Vec::new();
    for row in 0..batch.num_rows() {
        if !ids.is_valid(row) || !wanted.contains(ids.value(row)) {
            continue;
        }
        let metadata: Map<String, Value> = match text_at(metadata, row) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Map::new(),
        };
        let messages: Vec<ChatMessage> = match text_at(messages, row) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let events: Vec<Event> = match text_at(events, row) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let info = TranscriptInfo {
            transcript_id: ids.value(row).to_string(),
            source_type: text_at(source_type, row),
            source_id: text_at(source_id, row),
            source_uri: text_at(source_uri, row),
            model: text_at(model, row),
            score: score.filter(|a| a.is_valid(row)).map(|a| a.value(row)),
            success: success.filter(|a| a.is_valid(row)).map(|a| a.value(row)),
            total_tokens: total_tokens.filter(|a| a.is_valid(row)).map(|a| a.value(row)),
            total_time: total_time.filter(|a| a.is_valid(row)).map(|a| a.value(row)),
            error: text_at(error, row),
            limit: text_at(limit, row),
            metadata,
        };
        out.push(info.with_content(messages, events));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(id: &str, metadata: Value) -> TranscriptInfo {
        let mut info = TranscriptInfo::new(id);
        info.metadata = metadata.as_object().cloned().unwrap_or_default();
        info
    }

    #[test]
    fn test_metadata_type_inference() {
        let a = info("a", json!({"n": 1, "x": 1, "flag": true, "s": "hi", "obj": {"k": 1}, "mixed": 1}));
        let b = info("b", json!({"n": 2, "x": 2.5, "flag": null, "mixed": "one"}));
        let columns = infer_metadata_columns(&[&a, &b]);
        assert_eq!(columns["n"], MetadataType::Int64);
        assert_eq!(columns["x"], MetadataType::Float64);
        assert_eq!(columns["flag"], MetadataType::Boolean);
        assert_eq!(columns["s"], MetadataType::Utf8);
        assert_eq!(columns["obj"], MetadataType::Json);
        assert_eq!(columns["mixed"], MetadataType::Json);
    }

    #[test]
    fn test_index_batch_flattens_metadata() {
        let a = info("a", json!({"temperature": 0.5, "tags": ["x"]}));
        let b = info("b", json!({"temperature": 1}));
        let batch = build_index_batch(&[(&a, "f1.parquet"), (&b, "f2.parquet")]).unwrap();
        let schema = batch.schema();
        assert_eq!(
            schema.field_with_name("temperature").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(schema.field_with_name("tags").unwrap().data_type(), &DataType::Utf8);
        assert!(schema.field_with_name(MESSAGES).is_err());
        let tags = col_string(&batch, "tags").unwrap();
        assert_eq!(tags.value(0), r#"["x"]"#);
        assert!(tags.is_null(1));
        assert_eq!(
            schema.metadata().get(SCHEMA_VERSION_KEY).map(String::as_str),
            Some(SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_data_batch_decodes_back() {
        let mut t = Transcript::new("t1");
        t.info.model = Some("gpt-4".to_string());
        t.info.score = Some(0.75);
        t.info.metadata.insert("k".to_string(), json!([1, 2]));
        t.messages.push(ChatMessage::user("hello"));
        let encoded = EncodedContent::encode(&t).unwrap();
        let batch = build_data_batch(&[(&t, &encoded)]).unwrap();

        let wanted: HashSet<&str> = ["t1"].into_iter().collect();
        let decoded = transcripts_from_batch(&batch, &wanted, Path::new("x")).unwrap();
        assert_eq!(decoded, vec![t]);

        let none: HashSet<&str> = HashSet::new();
        assert!(transcripts_from_batch(&batch, &none, Path::new("x")).unwrap().is_empty());
    }

    #[test]
    fn test_id_column_type_checked() {
        let schema = Schema::new(vec![Field::new(TRANSCRIPT_ID, DataType::Int64, false)]);
        assert!(matches!(
            check_id_column(&schema, Path::new("f")),
            Err(StoreError::ColumnType { .. })
        ));
    }
}
