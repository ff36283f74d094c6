//! Index discovery, loading, and appending.
//!
//! The logical index is the newest manifest plus every incremental written
//! after it. Older files are superseded and only kept until compaction
//! removes them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, BooleanArray};
use arrow::compute::{cast, concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};
use tscribe_common::id::{FileKind, FileStamp};
use tscribe_common::schema::{FILENAME, SCHEMA_VERSION, SCHEMA_VERSION_KEY, TRANSCRIPT_ID};
use tscribe_config::StoreConfig;

use crate::error::{Result, StoreError};
use crate::io::FileIo;
use crate::schema::{check_id_column, col_string};
use crate::writer::{decode_batches, encode_batch, writer_properties};

/// An index file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    pub path: PathBuf,
    pub stamp: FileStamp,
}

/// Every well-named index file under `_index`, oldest first.
///
/// A missing directory yields an empty list.
pub fn list_index_files(io: &FileIo) -> Result<Vec<IndexFile>> {
    let dir = io.index_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
        let name = entry.file_name();
        let Some(stamp) = FileStamp::parse(&name.to_string_lossy()) else {
            continue;
        };
        if stamp.kind.is_index() {
            files.push(IndexFile {
                path: entry.path(),
                stamp,
            });
        }
    }
    files.sort_by(|a, b| a.stamp.cmp(&b.stamp));
    Ok(files)
}

/// The minimal set of index files describing current state, oldest first.
///
/// That is the newest manifest plus every incremental with a strictly later
/// timestamp, or every incremental when no manifest exists.
pub fn discover(io: &FileIo) -> Result<Vec<IndexFile>> {
    let all = list_index_files(io)?;
    let manifest = all
        .iter()
        .filter(|f| f.stamp.kind == FileKind::Manifest)
        .max_by(|a, b| a.stamp.cmp(&b.stamp))
        .cloned();

    let mut selected: Vec<IndexFile> = Vec::new();
    if let Some(manifest) = &manifest {
        selected.push(manifest.clone());
    }
    selected.extend(all.into_iter().filter(|f| {
        f.stamp.kind == FileKind::Incremental
            && manifest
                .as_ref()
                .map_or(true, |m| f.stamp.timestamp > m.stamp.timestamp)
    }));
    debug!(
        location = %io.root().display(),
        manifest = manifest.as_ref().map(|m| m.stamp.file_name()).unwrap_or_default(),
        files = selected.len(),
        "Discovered index files"
    );
    Ok(selected)
}

/// The union of a set of index files.
#[derive(Debug, Clone)]
pub struct IndexTable {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl IndexTable {
    pub fn empty() -> Self {
        IndexTable {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// All rows as one batch.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Every data file name the index references.
    pub fn referenced_filenames(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for batch in &self.batches {
            if let Some(col) = col_string(batch, FILENAME) {
                for i in 0..col.len() {
                    if col.is_valid(i) {
                        names.insert(col.value(i).to_string());
                    }
                }
            }
        }
        names
    }
}

/// Type two files disagree on is widened to.
fn widen(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

/// Merge schemas by column name, in first-seen order.
pub fn union_schemas<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, DataType> = HashMap::new();
    for schema in schemas {
        for field in schema.fields() {
            let name = field.name();
            match types.get(name) {
                Some(existing) => {
                    let widened = widen(existing, field.data_type());
                    types.insert(name.clone(), widened);
                }
                None => {
                    order.push(name.clone());
                    types.insert(name.clone(), field.data_type().clone());
                }
            }
        }
    }
    let fields: Vec<Field> = order
        .into_iter()
        .map(|name| {
            let ty = types.remove(&name).unwrap_or(DataType::Utf8);
            Field::new(name, ty, true)
        })
        .collect();
    Schema::new(fields).with_metadata(HashMap::from([(
        SCHEMA_VERSION_KEY.to_string(),
        SCHEMA_VERSION.to_string(),
    )]))
}

/// Conform `batch` to `schema`: cast shared columns, null-fill missing ones.
pub fn align_batch(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.schema().index_of(field.name()) {
            Ok(idx) => {
                let column = batch.column(idx);
                if column.data_type() == field.data_type() {
                    Ok(column.clone())
                } else {
                    Ok(cast(column, field.data_type())?)
                }
            }
            Err(_) => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Read and union index files, dropping rows whose id was already seen.
///
/// Files are read in the given order, so the oldest copy of an id wins.
pub fn load(io: &FileIo, files: &[IndexFile]) -> Result<IndexTable> {
    let mut raw: Vec<RecordBatch> = Vec::new();
    for file in files {
        let bytes = io.read(&file.path)?;
        for batch in decode_batches(bytes, &file.path)? {
            check_id_column(&batch.schema(), &file.path)?;
            raw.push(batch);
        }
    }
    if raw.is_empty() {
        return Ok(IndexTable::empty());
    }

    let schema = Arc::new(union_schemas(raw.iter().map(|b| b.schema_ref().as_ref())));
    let mut seen: HashSet<String> = HashSet::new();
    let mut batches = Vec::with_capacity(raw.len());
    for batch in &raw {
        let aligned = align_batch(batch, &schema)?;
        let Some(ids) = col_string(&aligned, TRANSCRIPT_ID) else {
            continue;
        };
        let keep: BooleanArray = (0..ids.len())
            .map(|i| Some(ids.is_valid(i) && seen.insert(ids.value(i).to_string())))
            .collect();
        let kept = filter_record_batch(&aligned, &keep)?;
        if kept.num_rows() > 0 {
            batches.push(kept);
        }
    }
    debug!(files = files.len(), rows = batches.iter().map(|b| b.num_rows()).sum::<usize>(), "Loaded index");
    Ok(IndexTable { schema, batches })
}

/// Write `batch` as one new index file of `kind`.
pub fn append(io: &FileIo, batch: &RecordBatch, kind: FileKind, config: &StoreConfig) -> Result<IndexFile> {
    append_as(io, batch, io.new_stamp(kind), config)
}

/// Write `batch` as the index file named by `stamp`.
pub fn append_as(io: &FileIo, batch: &RecordBatch, stamp: FileStamp, config: &StoreConfig) -> Result<IndexFile> {
    let kind = stamp.kind;
    let path = io.path_for(&stamp);
    let bytes = encode_batch(batch, writer_properties(config.compression, config.index_row_group_rows))?;
    io.write(&path, &bytes)?;
    info!(path = %path.display(), kind = %kind, rows = batch.num_rows(), "Wrote index file");
    Ok(IndexFile { path, stamp })
}

/// Data files in the location that no index row references.
pub fn find_orphaned_data_files(io: &FileIo, referenced: &HashSet<String>) -> Result<Vec<PathBuf>> {
    let root = io.root();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(root, e)),
    };

    let mut orphans = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(root, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_data = FileStamp::parse(&name).is_some_and(|s| s.kind == FileKind::Data);
        if is_data && !referenced.contains(&name) {
            orphans.push(entry.path());
        }
    }
    orphans.sort();
    Ok(orphans)
}

/// Whether `path` exists as a data file under `root`.
pub(crate) fn data_file_exists(root: &Path, filename: &str) -> bool {
    root.join(filename).is_file()
}
