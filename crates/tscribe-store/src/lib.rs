//! tscribe transcript storage.
//!
//! A storage location holds:
//! - Data files `transcripts_<ts>_<rand>[.enc].parquet` with full transcript content
//! - Index files under `_index/`: incrementals (`index_...`) and manifests (`_manifest_...`)
//!
//! [`TranscriptStore`] opens a location as a snapshot, answers metadata-only
//! queries from the index, and fetches content from data files on demand.
//! [`compact`] folds the index into a single manifest.

pub mod cache;
pub mod compact;
pub mod engine;
pub mod error;
pub mod index;
pub mod io;
pub mod migrate;
pub mod schema;
pub mod store;
pub mod writer;

pub use cache::{FileKey, SchemaCache};
pub use compact::{compact, CompactionReport};
pub use engine::{QueryEngine, Row};
pub use error::{Result, StoreError};
pub use index::{discover, find_orphaned_data_files, load, IndexFile, IndexTable};
pub use io::{FileIo, INDEX_DIR};
pub use migrate::{migrate_columns, MigrationReport, TargetKind, LEGACY_ALIASES};
pub use store::{InsertReport, TranscriptStore};
pub use writer::{write_data_files, WrittenFile};
