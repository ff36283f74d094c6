//! The transcript store: one storage location opened as a read snapshot.
//!
//! Opening a location validates its encryption state, discovers the current
//! index, and loads it into the query engine. Inserts append new data files
//! and one incremental index file; they never rewrite existing files.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};
use tscribe_common::id::FileKind;
use tscribe_common::{Transcript, TranscriptInfo};
use tscribe_config::StoreConfig;
use tscribe_crypt::{detect_encryption_state, CryptError, EncryptionKey};
use tscribe_query::{Condition, OrderBy, Page, PageRequest};

use crate::cache::{FileKey, SchemaCache};
use crate::compact::{self, CompactionReport};
use crate::engine::QueryEngine;
use crate::error::{Result, StoreError};
use crate::index::{self, data_file_exists, discover, load};
use crate::io::FileIo;
use crate::migrate::{self, MigrationReport, LEGACY_ALIASES};
use crate::schema::{build_index_batch, data_schema, transcripts_from_batch};
use crate::writer::{decode_columns, write_data_files};

/// Outcome of one insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    /// Rows written.
    pub inserted: usize,
    /// Rows dropped because their id was already present.
    pub duplicates: usize,
    pub data_files: Vec<String>,
    /// Incremental index file written, if any rows were inserted.
    pub index_file: Option<String>,
}

/// A storage location opened for reading and appending.
#[derive(Debug)]
pub struct TranscriptStore {
    io: FileIo,
    config: StoreConfig,
    engine: QueryEngine,
    cache: Mutex<SchemaCache>,
    encrypted: bool,
}

impl TranscriptStore {
    /// Open `location`, taking the key from the configured environment variable.
    pub fn open(location: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let key = EncryptionKey::from_env(&config.encryption_key_env)?;
        Self::open_with_key(location, config, key)
    }

    /// Open `location` with an explicit key.
    ///
    /// An encrypted location requires a key. A plain location stays plain even
    /// when a key is given; only an empty location adopts the key for new files.
    pub fn open_with_key(
        location: impl AsRef<Path>,
        config: StoreConfig,
        key: Option<EncryptionKey>,
    ) -> Result<Self> {
        config.validate()?;
        let location = location.as_ref().to_path_buf();
        let state = detect_encryption_state(&location)?;

        let key = match (state.is_encrypted(), key) {
            (Some(true), None) => {
                return Err(CryptError::MissingKey {
                    env_var: config.encryption_key_env.clone(),
                }
                .into())
            }
            (Some(false), Some(_)) => {
                warn!(
                    location = %location.display(),
                    "Location is not encrypted; ignoring encryption key"
                );
                None
            }
            (_, key) => key,
        };
        let encrypted = key.is_some();
        let io = FileIo::new(&location, key, config.encryption_key_env.clone());
        let engine = Self::load_engine(&io)?;
        let cache = Mutex::new(SchemaCache::new(config.schema_cache_capacity));

        info!(
            location = %location.display(),
            encrypted,
            rows = engine.count(None)?,
            "Opened transcript store"
        );
        Ok(TranscriptStore {
            io,
            config,
            engine,
            cache,
            encrypted,
        })
    }

    fn load_engine(io: &FileIo) -> Result<QueryEngine> {
        let files = discover(io)?;
        let table = load(io, &files)?;
        let engine = QueryEngine::from_index(&table)?;
        let report = engine.migrate(&LEGACY_ALIASES)?;
        if !report.added.is_empty() {
            debug!(columns = ?report.added, "Aliased legacy index columns");
        }
        Ok(engine)
    }

    pub fn location(&self) -> &Path {
        self.io.root()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether files in this location are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Append transcripts.
    ///
    /// Ids already in the snapshot, or repeated within `transcripts`, are
    /// dropped rather than overwritten.
    pub fn insert(&mut self, transcripts: Vec<Transcript>) -> Result<InsertReport> {
        for transcript in &transcripts {
            transcript.validate()?;
        }
        let total = transcripts.len();
        let ids: Vec<&str> = transcripts.iter().map(Transcript::id).collect();
        let existing = self.engine.existing_ids(&ids)?;

        let mut seen: HashSet<String> = HashSet::with_capacity(total);
        let fresh: Vec<Transcript> = transcripts
            .into_iter()
            .filter(|t| !existing.contains(t.id()) && seen.insert(t.id().to_string()))
            .collect();
        let duplicates = total - fresh.len();
        if fresh.is_empty() {
            debug!(duplicates, "Nothing new to insert");
            return Ok(InsertReport {
                duplicates,
                ..InsertReport::default()
            });
        }

        let written = write_data_files(&self.io, &fresh, &self.config)?;
        let mut rows: Vec<(&TranscriptInfo, &str)> = Vec::with_capacity(fresh.len());
        for file in &written {
            for &i in &file.rows {
                rows.push((fresh[i].info(), file.filename.as_str()));
            }
        }
        let batch = build_index_batch(&rows)?;
        let index_file = index::append(&self.io, &batch, FileKind::Incremental, &self.config)?;
        self.engine.load_batch(&batch)?;

        info!(
            inserted = fresh.len(),
            duplicates,
            data_files = written.len(),
            "Inserted transcripts"
        );
        Ok(InsertReport {
            inserted: fresh.len(),
            duplicates,
            data_files: written.into_iter().map(|f| f.filename).collect(),
            index_file: Some(index_file.stamp.file_name()),
        })
    }

    /// Matching transcripts without content.
    pub fn select(
        &self,
        filter: Option<&Condition>,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptInfo>> {
        self.engine.select(filter, order, limit)
    }

    /// One keyset page of matching transcripts without content.
    pub fn page(
        &self,
        filter: Option<&Condition>,
        order: &[OrderBy],
        request: &PageRequest,
    ) -> Result<Page<TranscriptInfo>> {
        self.engine.page(filter, order, request)
    }

    pub fn count(&self, filter: Option<&Condition>) -> Result<u64> {
        self.engine.count(filter)
    }

    /// Full transcript, or `None` if the id is not in the snapshot.
    pub fn read(&self, transcript_id: &str) -> Result<Option<Transcript>> {
        Ok(self.read_many(&[transcript_id])?.into_iter().next())
    }

    /// Full transcripts for `ids`, in request order, skipping unknown ids.
    ///
    /// Each referenced data file is read once.
    pub fn read_many(&self, ids: &[&str]) -> Result<Vec<Transcript>> {
        let filenames = self.engine.filenames(ids)?;
        let mut by_file: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for (id, filename) in &filenames {
            by_file.entry(filename.as_str()).or_default().insert(id.as_str());
        }

        let columns: Vec<String> = data_schema().fields().iter().map(|f| f.name().clone()).collect();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();

        let mut found: HashMap<String, Transcript> = HashMap::with_capacity(filenames.len());
        for (filename, wanted) in by_file {
            if !data_file_exists(self.io.root(), filename) {
                return Err(StoreError::MissingDataFile {
                    filename: filename.to_string(),
                });
            }
            let path = self.io.root().join(filename);
            let bytes = self.io.read(&path)?;
            let key = FileKey::of(&path)?;
            let metadata = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .metadata(&key, &bytes)?;
            for batch in decode_columns(bytes, metadata, &columns, &path)? {
                for transcript in transcripts_from_batch(&batch, &wanted, &path)? {
                    found.insert(transcript.id().to_string(), transcript);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(*id)).collect())
    }

    /// Compact the index, then reload the snapshot from the new manifest.
    pub fn compact(&mut self, delete_orphans: bool) -> Result<CompactionReport> {
        let report = compact::compact(&self.io, &self.config, delete_orphans)?;
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.engine = Self::load_engine(&self.io)?;
        Ok(report)
    }

    /// Data files the current on-disk index does not reference.
    pub fn find_orphaned_data_files(&self) -> Result<Vec<PathBuf>> {
        let table = load(&self.io, &discover(&self.io)?)?;
        index::find_orphaned_data_files(&self.io, &table.referenced_filenames())
    }

    /// Alias columns of a table or view in the query engine.
    pub fn migrate_columns(&self, target: &str, mapping: &[(&str, &str)]) -> Result<MigrationReport> {
        migrate::migrate_columns(self.engine.connection(), target, mapping)
    }

    /// `(hits, misses)` of the data-file schema cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stats()
    }
}
