//! Encryption state of a storage location.
//!
//! State is read from file names only: index files under `_index/` and data
//! files at the top level are classified by the `.enc` marker ahead of their
//! extension. Each category must be uniform.

use std::fs;
use std::path::Path;

use tscribe_common::id::{DATA_EXTENSION, ENCRYPTED_MARKER, INDEX_EXTENSION};
use tracing::debug;

use crate::error::{CryptError, Result};

/// Name of the index directory inside a location.
pub const INDEX_DIR: &str = "_index";

/// Encryption state of one category of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryState {
    /// No files of this category exist yet.
    Empty,
    Plain,
    Encrypted,
}

impl CategoryState {
    fn describe(self) -> &'static str {
        match self {
            CategoryState::Empty => "absent",
            CategoryState::Plain => "unencrypted",
            CategoryState::Encrypted => "encrypted",
        }
    }
}

/// Encryption state of a whole location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionState {
    pub index: CategoryState,
    pub data: CategoryState,
}

impl EncryptionState {
    /// `Some(true)` if encrypted, `Some(false)` if plain, `None` for an empty location.
    pub fn is_encrypted(&self) -> Option<bool> {
        match (self.index, self.data) {
            (CategoryState::Empty, CategoryState::Empty) => None,
            (CategoryState::Encrypted, _) | (_, CategoryState::Encrypted) => Some(true),
            _ => Some(false),
        }
    }
}

/// Classify a file name by extension.
///
/// Returns `Some(true)` for `<name>.enc.<ext>`, `Some(false)` for `<name>.<ext>`,
/// and `None` for other files.
pub fn classify(file_name: &str, extension: &str) -> Option<bool> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.ends_with(ENCRYPTED_MARKER))
}

fn category_state(dir: &Path, extension: &str, category: &'static str) -> Result<CategoryState> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CategoryState::Empty),
        Err(e) => return Err(CryptError::io(dir, e)),
    };

    let (mut encrypted, mut plain) = (0usize, 0usize);
    for entry in entries {
        let entry = entry.map_err(|e| CryptError::io(dir, e))?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        match classify(&name.to_string_lossy(), extension) {
            Some(true) => encrypted += 1,
            Some(false) => plain += 1,
            None => {}
        }
    }

    debug!(path = %dir.display(), category, encrypted, plain, "Scanned encryption state");
    match (encrypted, plain) {
        (0, 0) => Ok(CategoryState::Empty),
        (_, 0) => Ok(CategoryState::Encrypted),
        (0, _) => Ok(CategoryState::Plain),
        (encrypted, plain) => Err(CryptError::MixedEncryption {
            category,
            encrypted,
            plain,
        }),
    }
}

/// Detect the encryption state of `location`.
///
/// A missing location or a missing `_index` directory is an empty category,
/// not an error. Mixed categories, and index and data files that disagree,
/// are fatal.
pub fn detect_encryption_state(location: &Path) -> Result<EncryptionState> {
    let index = category_state(&location.join(INDEX_DIR), INDEX_EXTENSION, "index")?;
    let data = category_state(location, DATA_EXTENSION, "data")?;

    match (index, data) {
        (CategoryState::Encrypted, CategoryState::Plain)
        | (CategoryState::Plain, CategoryState::Encrypted) => Err(CryptError::InconsistentCategories {
            index: index.describe(),
            data: data.describe(),
        }),
        _ => Ok(EncryptionState { index, data }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("a.parquet", "parquet"), Some(false));
        assert_eq!(classify("a.enc.parquet", "parquet"), Some(true));
        assert_eq!(classify("a.idx", "parquet"), None);
        assert_eq!(classify(".parquet", "parquet"), None);
        assert_eq!(classify("aparquet", "parquet"), None);
    }

    #[test]
    fn test_missing_location_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = detect_encryption_state(&dir.path().join("nope")).unwrap();
        assert_eq!(state.index, CategoryState::Empty);
        assert_eq!(state.data, CategoryState::Empty);
        assert_eq!(state.is_encrypted(), None);
    }

    #[test]
    fn test_uniform_states() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("transcripts_1.enc.parquet"));
        touch(&dir.path().join("_index/index_1.enc.idx"));
        touch(&dir.path().join("README.md"));
        let state = detect_encryption_state(dir.path()).unwrap();
        assert_eq!(state.index, CategoryState::Encrypted);
        assert_eq!(state.data, CategoryState::Encrypted);
        assert_eq!(state.is_encrypted(), Some(true));
    }

    #[test]
    fn test_mixed_data_files_fail() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.parquet"));
        touch(&dir.path().join("b.enc.parquet"));
        match detect_encryption_state(dir.path()) {
            Err(CryptError::MixedEncryption {
                category,
                encrypted,
                plain,
            }) => {
                assert_eq!(category, "data");
                assert_eq!((encrypted, plain), (1, 1));
            }
            other => panic!("expected MixedEncryption, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_index_files_fail() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("_index/index_1.idx"));
        touch(&dir.path().join("_index/_manifest_2.enc.idx"));
        assert!(matches!(
            detect_encryption_state(dir.path()),
            Err(CryptError::MixedEncryption {
                category: "index",
                ..
            })
        ));
    }

    #[test]
    fn test_categories_must_agree() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.parquet"));
        touch(&dir.path().join("_index/index_1.enc.idx"));
        assert!(matches!(
            detect_encryption_state(dir.path()),
            Err(CryptError::InconsistentCategories { .. })
        ));
    }
}
