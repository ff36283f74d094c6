//! Directory-to-directory encryption transforms.
//!
//! Columnar files (`.parquet` data files and `.idx` index files) are rewritten
//! through the envelope and renamed with or without the `.enc` marker. Every
//! other file is copied byte for byte, and the relative layout is preserved.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tscribe_common::id::{DATA_EXTENSION, ENCRYPTED_MARKER, INDEX_EXTENSION};
use walkdir::WalkDir;

use crate::envelope::{decrypt_bytes, encrypt_bytes};
use crate::error::{CryptError, Result};
use crate::key::EncryptionKey;
use crate::state::{classify, detect_encryption_state};

/// Direction of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Encrypt,
    Decrypt,
}

impl TransformMode {
    fn target_state(self) -> &'static str {
        match self {
            TransformMode::Encrypt => "encrypted",
            TransformMode::Decrypt => "unencrypted",
        }
    }
}

/// Summary of a completed transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Columnar files rewritten through the envelope.
    pub files_transformed: usize,
    /// Other files copied unchanged.
    pub files_copied: usize,
}

/// Encrypt every columnar file of `src` into `dst`.
pub fn encrypt_database(
    src: &Path,
    dst: &Path,
    key: &EncryptionKey,
    overwrite: bool,
) -> Result<TransformReport> {
    transform_database(src, dst, key, overwrite, TransformMode::Encrypt)
}

/// Decrypt every columnar file of `src` into `dst`.
pub fn decrypt_database(
    src: &Path,
    dst: &Path,
    key: &EncryptionKey,
    overwrite: bool,
) -> Result<TransformReport> {
    transform_database(src, dst, key, overwrite, TransformMode::Decrypt)
}

fn transform_database(
    src: &Path,
    dst: &Path,
    key: &EncryptionKey,
    overwrite: bool,
    mode: TransformMode,
) -> Result<TransformReport> {
    let src_resolved = fs::canonicalize(src).map_err(|e| CryptError::io(src, e))?;
    let dst_resolved = resolve(dst);
    if dst_resolved.starts_with(&src_resolved) {
        return Err(CryptError::DestinationInsideSource {
            path: dst.to_path_buf(),
        });
    }

    // Reject mixed sources before touching the destination.
    detect_encryption_state(src)?;
    prepare_destination(dst, overwrite)?;

    match copy_tree(src, dst, key, mode) {
        Ok(report) => {
            info!(
                src = %src.display(),
                dst = %dst.display(),
                mode = ?mode,
                transformed = report.files_transformed,
                copied = report.files_copied,
                "Transformed storage location"
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(dst) {
                warn!(dst = %dst.display(), error = %cleanup, "Failed to remove partial output");
            }
            Err(e)
        }
    }
}

fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolve(if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        })
        .join(name),
        _ => path.to_path_buf(),
    }
}

fn prepare_destination(dst: &Path, overwrite: bool) -> Result<()> {
    let non_empty = match fs::read_dir(dst) {
        Ok(mut entries) => entries.next().is_some(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(CryptError::io(dst, e)),
    };
    if non_empty {
        if !overwrite {
            return Err(CryptError::DestinationExists {
                path: dst.to_path_buf(),
            });
        }
        debug!(dst = %dst.display(), "Clearing destination");
        fs::remove_dir_all(dst).map_err(|e| CryptError::io(dst, e))?;
    }
    fs::create_dir_all(dst).map_err(|e| CryptError::io(dst, e))
}

/// Extension of a columnar file, if `name` is one.
fn columnar_extension(name: &str) -> Option<&'static str> {
    [DATA_EXTENSION, INDEX_EXTENSION]
        .into_iter()
        .find(|ext| classify(name, ext).is_some())
}

/// Insert or remove the `.enc` marker ahead of `extension`.
pub fn toggle_marker(name: &str, extension: &str, encrypted: bool) -> String {
    let stem = name
        .strip_suffix(extension)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(name);
    let base = stem.strip_suffix(ENCRYPTED_MARKER).unwrap_or(stem);
    if encrypted {
        format!("{base}{ENCRYPTED_MARKER}.{extension}")
    } else {
        format!("{base}.{extension}")
    }
}

fn copy_tree(
    src: &Path,
    dst: &Path,
    key: &EncryptionKey,
    mode: TransformMode,
) -> Result<TransformReport> {
    let mut report = TransformReport::default();

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            CryptError::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| CryptError::io(entry.path(), std::io::ErrorKind::InvalidInput.into()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| CryptError::io(&target, e))?;
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(extension) = columnar_extension(&name) else {
            fs::copy(entry.path(), &target).map_err(|e| CryptError::io(entry.path(), e))?;
            report.files_copied += 1;
            continue;
        };

        let encrypted = classify(&name, extension) == Some(true);
        let wants_encrypted = mode == TransformMode::Encrypt;
        if encrypted == wants_encrypted {
            return Err(CryptError::AlreadyInState {
                path: entry.path().to_path_buf(),
                state: mode.target_state(),
            });
        }

        let bytes = fs::read(entry.path()).map_err(|e| CryptError::io(entry.path(), e))?;
        let output = match mode {
            TransformMode::Encrypt => encrypt_bytes(&bytes, key)?,
            TransformMode::Decrypt => decrypt_bytes(&bytes, key)?,
        };
        let renamed = target.with_file_name(toggle_marker(&name, extension, wants_encrypted));
        fs::write(&renamed, output).map_err(|e| CryptError::io(&renamed, e))?;
        debug!(path = %renamed.display(), "Wrote transformed file");
        report.files_transformed += 1;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_marker() {
        assert_eq!(
            toggle_marker("transcripts_1_ab.parquet", "parquet", true),
            "transcripts_1_ab.enc.parquet"
        );
        assert_eq!(
            toggle_marker("index_1_ab.enc.idx", "idx", false),
            "index_1_ab.idx"
        );
        assert_eq!(toggle_marker("x.enc.idx", "idx", true), "x.enc.idx");
    }

    #[test]
    fn test_columnar_extension() {
        assert_eq!(columnar_extension("a.parquet"), Some("parquet"));
        assert_eq!(columnar_extension("a.enc.idx"), Some("idx"));
        assert_eq!(columnar_extension("notes.txt"), None);
    }
}
