//! File access for one storage location.
//!
//! Every file is written to a hidden temporary name first and then renamed,
//! so readers only ever see complete files. Encrypted files are detected by
//! their `.enc` marker and unwrapped transparently on read.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use tscribe_common::id::{FileKind, FileStamp};
use tscribe_crypt::{decrypt_bytes, encrypt_bytes, CryptError, EncryptionKey};

use crate::error::{Result, StoreError};

/// Name of the index directory inside a location.
pub use tscribe_crypt::INDEX_DIR;

/// Reads and writes files of one location, encrypting when a key is set.
#[derive(Debug, Clone)]
pub struct FileIo {
    root: PathBuf,
    key: Option<EncryptionKey>,
    env_var: String,
}

impl FileIo {
    /// `key` enables encryption of new files; `env_var` is reported when an
    /// encrypted file is read without one.
    pub fn new(root: impl Into<PathBuf>, key: Option<EncryptionKey>, env_var: impl Into<String>) -> Self {
        FileIo {
            root: root.into(),
            key,
            env_var: env_var.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    /// Whether new files are written encrypted.
    pub fn encrypts(&self) -> bool {
        self.key.is_some()
    }

    /// Fresh identity for a new file of `kind`.
    pub fn new_stamp(&self, kind: FileKind) -> FileStamp {
        FileStamp::new(kind, self.encrypts())
    }

    /// Path of a file given its identity.
    pub fn path_for(&self, stamp: &FileStamp) -> PathBuf {
        if stamp.kind.is_index() {
            self.index_dir().join(stamp.file_name())
        } else {
            self.root.join(stamp.file_name())
        }
    }

    /// Read a whole file, decrypting it if its name carries the marker.
    pub fn read(&self, path: &Path) -> Result<Bytes> {
        let raw = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        if !is_encrypted_name(path) {
            return Ok(Bytes::from(raw));
        }
        let key = self.key.as_ref().ok_or_else(|| CryptError::MissingKey {
            env_var: self.env_var.clone(),
        })?;
        Ok(Bytes::from(decrypt_bytes(&raw, key)?))
    }

    /// Write `bytes` to `path` via a temporary sibling and a rename.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

        let payload = match (&self.key, is_encrypted_name(path)) {
            (Some(key), true) => encrypt_bytes(bytes, key)?,
            (None, true) => {
                return Err(CryptError::MissingKey {
                    env_var: self.env_var.clone(),
                }
                .into())
            }
            (_, false) => bytes.to_vec(),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.tmp"));
        fs::write(&tmp, &payload).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        debug!(path = %path.display(), bytes = payload.len(), "Wrote file");
        Ok(())
    }

    /// Remove a file, treating an already-missing file as removed.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

fn is_encrypted_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(FileStamp::parse)
        .map(|stamp| stamp.encrypted)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_write_read() {
        let dir = TempDir::new().unwrap();
        let io = FileIo::new(dir.path(), None, "KEY");
        let stamp = io.new_stamp(FileKind::Incremental);
        let path = io.path_for(&stamp);
        assert!(path.starts_with(dir.path().join(INDEX_DIR)));
        io.write(&path, b"rows").unwrap();
        assert_eq!(io.read(&path).unwrap().as_ref(), b"rows");
        assert_eq!(fs::read(&path).unwrap(), b"rows");
    }

    #[test]
    fn test_encrypted_write_read() {
        let dir = TempDir::new().unwrap();
        let key = EncryptionKey::new([5u8; 32]).unwrap();
        let io = FileIo::new(dir.path(), Some(key), "KEY");
        let stamp = io.new_stamp(FileKind::Data);
        assert!(stamp.encrypted);
        let path = io.path_for(&stamp);
        io.write(&path, b"content").unwrap();
        assert_ne!(fs::read(&path).unwrap(), b"content");
        assert_eq!(io.read(&path).unwrap().as_ref(), b"content");

        let keyless = FileIo::new(dir.path(), None, "MY_KEY");
        match keyless.read(&path) {
            Err(StoreError::Crypt(CryptError::MissingKey { env_var })) => assert_eq!(env_var, "MY_KEY"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn test_no_temporary_files_left() {
        let dir = TempDir::new().unwrap();
        let io = FileIo::new(dir.path(), None, "KEY");
        let path = io.path_for(&io.new_stamp(FileKind::Data));
        io.write(&path, b"x").unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with('.'));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let io = FileIo::new(dir.path(), None, "KEY");
        assert!(!io.remove(&dir.path().join("nothing.parquet")).unwrap());
    }
}
