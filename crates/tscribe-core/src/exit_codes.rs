//! Exit codes for the tscribe CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//! Codes below 10 are outcomes; 10 and above are errors.

use tscribe_crypt::CryptError;
use tscribe_store::StoreError;

/// Exit codes for tscribe operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// The requested transcript does not exist
    NotFound = 1,

    /// Invalid command-line arguments
    ArgsError = 2,

    /// Configuration error (including key and encryption-state problems)
    ConfigError = 10,

    /// Encryption or decryption failed
    CryptError = 11,

    /// Storage layout or file format error
    StorageError = 12,

    /// Filter or pagination error
    QueryError = 13,

    /// I/O error
    IoError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&CryptError> for ExitCode {
    fn from(err: &CryptError) -> Self {
        match err {
            CryptError::Io { .. } => ExitCode::IoError,
            CryptError::InvalidHeader | CryptError::EncryptionFailed | CryptError::DecryptionFailed => {
                ExitCode::CryptError
            }
            _ => ExitCode::ConfigError,
        }
    }
}

impl From<&StoreError> for ExitCode {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Crypt(e) => ExitCode::from(e),
            StoreError::Config(_) => ExitCode::ConfigError,
            StoreError::Query(_) => ExitCode::QueryError,
            StoreError::Io { .. } => ExitCode::IoError,
            StoreError::Sqlite(_) => ExitCode::InternalError,
            _ => ExitCode::StorageError,
        }
    }
}
