//! At-rest encryption for tscribe storage locations.
//!
//! Provides:
//! - Eager validation of AES-128/192/256 keys
//! - An AES-GCM envelope around whole columnar files
//! - Per-category detection of a location's encryption state
//! - `encrypt_database` / `decrypt_database` directory transforms

pub mod envelope;
pub mod error;
pub mod key;
pub mod state;
pub mod transform;

pub use envelope::{decrypt_bytes, encrypt_bytes, is_encrypted};
pub use error::{CryptError, Result};
pub use key::{EncryptionKey, VALID_KEY_LENGTHS};
pub use state::{detect_encryption_state, CategoryState, EncryptionState, INDEX_DIR};
pub use transform::{decrypt_database, encrypt_database, TransformMode, TransformReport};
