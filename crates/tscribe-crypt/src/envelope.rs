//! AES-GCM file envelope.
//!
//! An encrypted file is an outer envelope over the exact plaintext bytes:
//!
//! ```text
//! MAGIC (8) | nonce (12) | ciphertext + tag
//! ```

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use rand_core::{OsRng, RngCore};

use crate::error::{CryptError, Result};
use crate::key::EncryptionKey;

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

const MAGIC: &[u8; 8] = b"TSCENC01";
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + NONCE_LEN;

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn for_key(key: &EncryptionKey) -> Result<Self> {
        let bytes = key.as_bytes();
        let invalid = |_| CryptError::InvalidKeyLength {
            actual: bytes.len(),
        };
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes).map(Cipher::Aes128).map_err(invalid),
            24 => Aes192Gcm::new_from_slice(bytes).map(Cipher::Aes192).map_err(invalid),
            32 => Aes256Gcm::new_from_slice(bytes).map(Cipher::Aes256).map_err(invalid),
            actual => Err(CryptError::InvalidKeyLength { actual }),
        }
    }

    fn encrypt(&self, nonce: &Nonce<U12>, plaintext: &[u8]) -> Option<Vec<u8>> {
        match self {
            Cipher::Aes128(c) => c.encrypt(nonce, plaintext).ok(),
            Cipher::Aes192(c) => c.encrypt(nonce, plaintext).ok(),
            Cipher::Aes256(c) => c.encrypt(nonce, plaintext).ok(),
        }
    }

    fn decrypt(&self, nonce: &Nonce<U12>, ciphertext: &[u8]) -> Option<Vec<u8>> {
        match self {
            Cipher::Aes128(c) => c.decrypt(nonce, ciphertext).ok(),
            Cipher::Aes192(c) => c.decrypt(nonce, ciphertext).ok(),
            Cipher::Aes256(c) => c.decrypt(nonce, ciphertext).ok(),
        }
    }
}

/// Return true if the buffer starts with the envelope header.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] == MAGIC
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt_bytes(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let cipher = Cipher::for_key(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .ok_or(CryptError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt an envelope produced by [`encrypt_bytes`].
pub fn decrypt_bytes(bytes: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    if bytes.len() <= HEADER_LEN || !is_encrypted(bytes) {
        return Err(CryptError::InvalidHeader);
    }
    let cipher = Cipher::for_key(key)?;
    let nonce = Nonce::from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
    cipher
        .decrypt(nonce, &bytes[HEADER_LEN..])
        .ok_or(CryptError::DecryptionFailed)
}
