//! Transcript ids and file identities.
//!
//! Every file in a location is named once and never reused, so independent
//! writers cannot collide. A file name carries:
//! - its kind (data, incremental index, manifest)
//! - a sortable UTC timestamp with microsecond precision
//! - a random disambiguator
//! - an optional `.enc` marker ahead of the extension for encrypted files
//!
//! ```text
//! transcripts_20260115T143022123456_a1b2c3d4.parquet
//! _index/index_20260115T143022123456_a1b2c3d4.idx
//! _index/_manifest_20260115T143022123456_a1b2c3d4.enc.idx
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Marker inserted before the extension of encrypted files.
pub const ENCRYPTED_MARKER: &str = ".enc";

/// Extension of columnar data files.
pub const DATA_EXTENSION: &str = "parquet";

/// Extension of index files (incrementals and manifests).
pub const INDEX_EXTENSION: &str = "idx";

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6f";

/// Generate a new globally-unique transcript id.
pub fn new_transcript_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Kind of file in a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Immutable transcript rows including content.
    Data,
    /// Index rows added since the last manifest.
    Incremental,
    /// Full point-in-time snapshot of the index.
    Manifest,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            FileKind::Data => "transcripts_",
            FileKind::Incremental => "index_",
            FileKind::Manifest => "_manifest_",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            FileKind::Data => DATA_EXTENSION,
            FileKind::Incremental | FileKind::Manifest => INDEX_EXTENSION,
        }
    }

    /// Whether this kind lives under the `_index` directory.
    pub fn is_index(self) -> bool {
        matches!(self, FileKind::Incremental | FileKind::Manifest)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Data => write!(f, "data"),
            FileKind::Incremental => write!(f, "incremental"),
            FileKind::Manifest => write!(f, "manifest"),
        }
    }
}

/// Parsed identity of a data or index file name.
///
/// Ordering is by timestamp first, then by the random disambiguator, so a
/// sort over stamps is a sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileStamp {
    pub kind: FileKind,
    /// Sortable timestamp text (`YYYYMMDDTHHMMSSffffff`).
    pub timestamp: String,
    /// Random disambiguator (lowercase hex).
    pub random: String,
    pub encrypted: bool,
}

impl FileStamp {
    /// Create a fresh stamp for a new file written now.
    pub fn new(kind: FileKind, encrypted: bool) -> Self {
        Self::at(kind, Utc::now(), encrypted)
    }

    /// Create a stamp for a specific instant.
    pub fn at(kind: FileKind, when: DateTime<Utc>, encrypted: bool) -> Self {
        let random: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        FileStamp {
            kind,
            timestamp: when.format(STAMP_FORMAT).to_string(),
            random,
            encrypted,
        }
    }

    /// Parse a bare file name (no directory part).
    ///
    /// Accepts both the plain and the encrypted form of every kind.
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = FILE_NAME_RE.captures(file_name)?;
        let kind = match caps.name("prefix")?.as_str() {
            "transcripts_" => FileKind::Data,
            "index_" => FileKind::Incremental,
            "_manifest_" => FileKind::Manifest,
            _ => return None,
        };
        let extension = caps.name("ext")?.as_str();
        if extension != kind.extension() {
            return None;
        }
        Some(FileStamp {
            kind,
            timestamp: caps.name("ts")?.as_str().to_string(),
            random: caps.name("rand")?.as_str().to_string(),
            encrypted: caps.name("enc").is_some(),
        })
    }

    /// Render the file name this stamp describes.
    pub fn file_name(&self) -> String {
        format!(
            "{}{}_{}{}.{}",
            self.kind.prefix(),
            self.timestamp,
            self.random,
            if self.encrypted { ENCRYPTED_MARKER } else { "" },
            self.kind.extension()
        )
    }
}

impl PartialOrd for FileStamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileStamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.random.cmp(&other.random))
    }
}

impl fmt::Display for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>transcripts_|index_|_manifest_)(?P<ts>\d{8}T\d{12})_(?P<rand>[0-9a-f]+)(?P<enc>\.enc)?\.(?P<ext>parquet|idx)$",
    )
    .expect("regex")
});

/// Extract the embedded timestamp from an index or data file name.
///
/// Works for plain and encrypted names alike; returns `None` for names that
/// are not part of the layout.
pub fn extract_timestamp(file_name: &str) -> Option<String> {
    FileStamp::parse(file_name).map(|stamp| stamp.timestamp)
}
