//! Bounded cache of parsed data-file footers.
//!
//! Entries are keyed by file identity `(path, len, mtime)`, so a file that is
//! replaced under the same name is never served stale metadata. The cache is
//! owned by one store and cleared whenever that store compacts.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions};
use tracing::trace;

use crate::error::{Result, StoreError};

/// Identity of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileKey {
    pub fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| StoreError::io(path, e))?;
        Ok(FileKey {
            path: path.to_path_buf(),
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Least-recently-used cache of reader metadata.
#[derive(Debug)]
pub struct SchemaCache {
    capacity: usize,
    entries: HashMap<FileKey, ArrowReaderMetadata>,
    order: VecDeque<FileKey>,
    hits: u64,
    misses: u64,
}

impl SchemaCache {
    pub fn new(capacity: usize) -> Self {
        SchemaCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Reader metadata for `key`, parsing it from `bytes` on a miss.
    pub fn metadata(&mut self, key: &FileKey, bytes: &Bytes) -> Result<ArrowReaderMetadata> {
        if let Some(meta) = self.entries.get(key).cloned() {
            self.hits += 1;
            self.touch(key);
            trace!(path = %key.path.display(), "Schema cache hit");
            return Ok(meta);
        }

        self.misses += 1;
        trace!(path = %key.path.display(), "Schema cache miss");
        let meta = ArrowReaderMetadata::load(bytes, ArrowReaderOptions::new())?;
        if self.capacity > 0 {
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.entries.insert(key.clone(), meta.clone());
            self.order.push_back(key.clone());
        }
        Ok(meta)
    }

    /// Arrow schema of the file, if cached.
    pub fn cached_schema(&self, key: &FileKey) -> Option<SchemaRef> {
        self.entries.get(key).map(|meta| meta.schema().clone())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &FileKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build_data_batch, EncodedContent};
    use crate::writer::{encode_batch, writer_properties};
    use tempfile::TempDir;
    use tscribe_common::Transcript;
    use tscribe_config::Compression;

    fn parquet_file(dir: &Path, name: &str) -> (FileKey, Bytes) {
        let t = Transcript::new(name);
        let encoded = EncodedContent::encode(&t).unwrap();
        let batch = build_data_batch(&[(&t, &encoded)]).unwrap();
        let bytes = encode_batch(&batch, writer_properties(Compression::None, 10)).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &bytes).unwrap();
        (FileKey::of(&path).unwrap(), bytes)
    }

    #[test]
    fn test_hits_and_misses() {
        let dir = TempDir::new().unwrap();
        let (key, bytes) = parquet_file(dir.path(), "a");
        let mut cache = SchemaCache::new(4);
        cache.metadata(&key, &bytes).unwrap();
        cache.metadata(&key, &bytes).unwrap();
        assert_eq!(cache.stats(), (1, 1));
        assert!(cache.cached_schema(&key).unwrap().field_with_name("events").is_ok());
    }

    #[test]
    fn test_bounded_lru_eviction() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = ["a", "b", "c"].iter().map(|n| parquet_file(dir.path(), n)).collect();
        let mut cache = SchemaCache::new(2);
        cache.metadata(&files[0].0, &files[0].1).unwrap();
        cache.metadata(&files[1].0, &files[1].1).unwrap();
        cache.metadata(&files[0].0, &files[0].1).unwrap();
        cache.metadata(&files[2].0, &files[2].1).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.cached_schema(&files[0].0).is_some());
        assert!(cache.cached_schema(&files[1].0).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_changed_file_is_a_new_key() {
        let dir = TempDir::new().unwrap();
        let (key, _) = parquet_file(dir.path(), "a");
        std::fs::write(dir.path().join("a"), b"different length").unwrap();
        let changed = FileKey::of(&dir.path().join("a")).unwrap();
        assert_ne!(key, changed);
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let dir = TempDir::new().unwrap();
        let (key, bytes) = parquet_file(dir.path(), "a");
        let mut cache = SchemaCache::new(0);
        cache.metadata(&key, &bytes).unwrap();
        assert!(cache.is_empty());
    }
}
