//! Encryption of OAuth token material at rest.
//!
//! Tokens are sealed with AES-256-GCM under a key supplied by configuration.
//! Stored form is base64(nonce || ciphertext), with a fresh 96-bit nonce per value.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes)
const NONCE_SIZE: usize = 12;

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_SIZE} bytes of base64, got {0} bytes")]
    InvalidKeyLength(usize),

    #[error("encryption key is not valid base64: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),

    #[error("failed to generate nonce: {0}")]
    Rng(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key or corrupted value)")]
    Decrypt,

    #[error("invalid encrypted value: {0}")]
    InvalidFormat(String),
}

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(..)")
    }
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let key = BASE64.decode(encoded.trim())?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::fill(&mut nonce_bytes).map_err(|e| CryptoError::Rng(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        if combined.len() <= NONCE_SIZE {
            return Err(CryptoError::InvalidFormat(format!(
                "value too short ({} bytes)",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::InvalidFormat(e.to_string()))
    }
}
