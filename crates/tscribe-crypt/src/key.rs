//! Symmetric keys.

use std::fmt;

use crate::error::{CryptError, Result};

/// Accepted AES key sizes in bytes.
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// A validated AES key.
///
/// The length is checked on construction so a bad key fails when a session
/// starts rather than at the first file read or write.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: Vec<u8>,
}

impl EncryptionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if !VALID_KEY_LENGTHS.contains(&bytes.len()) {
            return Err(CryptError::InvalidKeyLength {
                actual: bytes.len(),
            });
        }
        Ok(EncryptionKey { bytes })
    }

    /// Read a key from an environment variable, using its UTF-8 bytes.
    ///
    /// Returns `Ok(None)` when the variable is unset or empty.
    pub fn from_env(var: &str) -> Result<Option<Self>> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Self::new(value.into_bytes()).map(Some),
            _ => Ok(None),
        }
    }

    /// Like [`EncryptionKey::from_env`], but a missing key is an error naming the variable.
    pub fn require_env(var: &str) -> Result<Self> {
        Self::from_env(var)?.ok_or_else(|| CryptError::MissingKey {
            env_var: var.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// AES variant name for this key size.
    pub fn algorithm(&self) -> &'static str {
        match self.bytes.len() {
            16 => "AES-128-GCM",
            24 => "AES-192-GCM",
            _ => "AES-256-GCM",
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}
