//! Parquet encoding and data-file writing.

use std::io::Cursor;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ParquetRecordBatchReaderBuilder};
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::{Compression as ParquetCompression, ZstdLevel};
use parquet::file::metadata::ParquetMetaData;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::{debug, info};
use tscribe_common::id::FileKind;
use tscribe_common::schema::{is_compatible, SCHEMA_VERSION, SCHEMA_VERSION_KEY};
use tscribe_common::Transcript;
use tscribe_config::{Compression, StoreConfig};

use crate::error::{Result, StoreError};
use crate::io::FileIo;
use crate::schema::{build_data_batch, EncodedContent};

/// Writer properties for one file.
pub fn writer_properties(compression: Compression, max_row_group_rows: usize) -> WriterProperties {
    let codec = match compression {
        Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
        Compression::Snappy => ParquetCompression::SNAPPY,
        Compression::None => ParquetCompression::UNCOMPRESSED,
    };
    let version = KeyValue {
        key: SCHEMA_VERSION_KEY.to_string(),
        value: Some(SCHEMA_VERSION.to_string()),
    };
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some(concat!("tscribe ", env!("CARGO_PKG_VERSION")).to_string()),
    };
    WriterProperties::builder()
        .set_compression(codec)
        .set_max_row_group_size(max_row_group_rows.max(1))
        .set_key_value_metadata(Some(vec![version, created_by]))
        .build()
}

/// Encode one batch as a complete Parquet file.
pub fn encode_batch(batch: &RecordBatch, props: WriterProperties) -> Result<Bytes> {
    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Reject a file written under a different major schema version.
///
/// Files without the version key are accepted.
pub fn check_schema_version(metadata: &ParquetMetaData, path: &Path) -> Result<()> {
    let version = metadata
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|kv| kv.key == SCHEMA_VERSION_KEY))
        .and_then(|kv| kv.value.as_deref());
    match version {
        Some(version) if !is_compatible(version) => Err(StoreError::IncompatibleSchema {
            path: path.to_path_buf(),
            version: version.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Decode every batch of the Parquet file read from `path`.
pub fn decode_batches(bytes: Bytes, path: &Path) -> Result<Vec<RecordBatch>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    check_schema_version(builder.metadata(), path)?;
    let reader = builder.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

/// Decode the named top-level columns of a Parquet file using pre-parsed metadata.
///
/// Names absent from the file are skipped.
pub fn decode_columns(
    bytes: Bytes,
    metadata: ArrowReaderMetadata,
    columns: &[&str],
    path: &Path,
) -> Result<Vec<RecordBatch>> {
    check_schema_version(metadata.metadata(), path)?;
    let schema = metadata.schema().clone();
    let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(bytes, metadata);
    let roots: Vec<usize> = columns
        .iter()
        .filter_map(|name| schema.index_of(name).ok())
        .collect();
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

/// A data file written by [`write_data_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// File name relative to the location root.
    pub filename: String,
    /// Positions in the input slice of the rows stored in this file.
    pub rows: Vec<usize>,
}

/// Split `sizes` into consecutive chunks whose sums stay within `budget`.
///
/// A single row larger than the budget gets a chunk of its own.
pub fn plan_chunks(sizes: &[usize], budget: usize) -> Vec<std::ops::Range<usize>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut acc = 0usize;
    for (i, size) in sizes.iter().enumerate() {
        if i > start && acc + size > budget {
            chunks.push(start..i);
            start = i;
            acc = 0;
        }
        acc += size;
    }
    if start < sizes.len() {
        chunks.push(start..sizes.len());
    }
    chunks
}

/// Rows per row group so a group stays near `budget` bytes.
pub fn row_group_rows(sizes: &[usize], budget: usize) -> usize {
    if sizes.is_empty() {
        return 1;
    }
    let avg = (sizes.iter().sum::<usize>() / sizes.len()).max(1);
    (budget / avg).max(1)
}

/// Write transcripts into one or more new data files.
pub fn write_data_files(
    io: &FileIo,
    transcripts: &[Transcript],
    config: &StoreConfig,
) -> Result<Vec<WrittenFile>> {
    let encoded = transcripts
        .iter()
        .map(EncodedContent::encode)
        .collect::<Result<Vec<_>>>()?;
    let sizes: Vec<usize> = transcripts
        .iter()
        .zip(&encoded)
        .map(|(t, e)| e.estimated_row_bytes(&t.info))
        .collect();

    let file_budget = usize::try_from(config.target_file_bytes()).unwrap_or(usize::MAX);
    let group_budget = usize::try_from(config.row_group_bytes()).unwrap_or(usize::MAX);

    let mut written = Vec::new();
    for range in plan_chunks(&sizes, file_budget) {
        let rows: Vec<(&Transcript, &EncodedContent)> = range
            .clone()
            .map(|i| (&transcripts[i], &encoded[i]))
            .collect();
        let batch = build_data_batch(&rows)?;
        let group_rows = row_group_rows(&sizes[range.clone()], group_budget);
        let bytes = encode_batch(&batch, writer_properties(config.compression, group_rows))?;

        let stamp = io.new_stamp(FileKind::Data);
        let path = io.path_for(&stamp);
        io.write(&path, &bytes)?;
        debug!(
            path = %path.display(),
            rows = batch.num_rows(),
            row_group_rows = group_rows,
            "Wrote data file"
        );
        written.push(WrittenFile {
            filename: stamp.file_name(),
            rows: range.collect(),
        });
    }
    info!(files = written.len(), rows = transcripts.len(), "Wrote transcript data");
    Ok(written)
}
