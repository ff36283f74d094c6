//! Error types for encryption operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while encrypting, decrypting, or inspecting a location.
#[derive(Error, Debug)]
pub enum CryptError {
    /// Key length is not an AES key size
    #[error("invalid encryption key length: {actual} bytes (expected 16, 24, or 32 bytes for AES-128/192/256)")]
    InvalidKeyLength { actual: usize },

    /// Encrypted files exist but no key was supplied
    #[error("encrypted files found but no key is set; export {env_var} with the encryption key")]
    MissingKey { env_var: String },

    /// One category of files mixes encrypted and plain files
    #[error("mixed encryption state in {category} files: {encrypted} encrypted, {plain} unencrypted; re-encrypt or decrypt the location so all files agree")]
    MixedEncryption {
        category: &'static str,
        encrypted: usize,
        plain: usize,
    },

    /// Index and data files disagree about encryption
    #[error("index files are {index} but data files are {data}; the location must be uniformly encrypted or unencrypted")]
    InconsistentCategories {
        index: &'static str,
        data: &'static str,
    },

    /// A file is already in the state a transform would produce
    #[error("'{path}' is already {state}")]
    AlreadyInState { path: PathBuf, state: &'static str },

    /// Output directory exists and is not empty
    #[error("destination '{path}' already exists and is not empty; pass overwrite to replace it")]
    DestinationExists { path: PathBuf },

    /// Destination is the source directory or lies inside it
    #[error("destination '{path}' is the source directory or inside it")]
    DestinationInsideSource { path: PathBuf },

    /// Encryption header is missing or invalid
    #[error("invalid encryption header")]
    InvalidHeader,

    /// Encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed (wrong key or corrupted data)
    #[error("decryption failed (wrong key or corrupted file)")]
    DecryptionFailed,

    /// I/O error
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CryptError {
    /// Stable numeric code, aligned with the shared taxonomy.
    pub fn code(&self) -> u32 {
        match self {
            CryptError::InvalidKeyLength { .. } => 11,
            CryptError::MissingKey { .. } => 12,
            CryptError::MixedEncryption { .. } => 13,
            CryptError::InconsistentCategories { .. } => 14,
            CryptError::DestinationExists { .. } => 15,
            CryptError::DestinationInsideSource { .. } => 16,
            CryptError::AlreadyInState { .. } => 17,
            CryptError::InvalidHeader => 35,
            CryptError::EncryptionFailed => 36,
            CryptError::DecryptionFailed => 37,
            CryptError::Io { .. } => 60,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CryptError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for encryption operations.
pub type Result<T> = std::result::Result<T, CryptError>;
