//! Authenticated encryption of stored payloads.
//!
//! Every payload is sealed with AES-256-GCM under a key stretched from the
//! process secret with PBKDF2-HMAC-SHA256. A fresh salt and nonce are drawn
//! per payload and travel in the header:
//!
//! ```text
//! version (1) | salt (16) | nonce (12) | ciphertext + tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::config::{EncryptionConfig, MIN_KDF_ITERATIONS};
use crate::error::{AppError, Result};

const FORMAT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Symmetric encryptor bound to one process secret
#[derive(Clone)]
pub struct Encryptor {
    secret: Vec<u8>,
    iterations: u32,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Encryptor {
    pub fn new(secret: impl Into<Vec<u8>>, iterations: u32) -> Self {
        Self {
            secret: secret.into(),
            iterations: iterations.max(MIN_KDF_ITERATIONS),
        }
    }

    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.kdf_iterations)
    }

    /// Cheap key stretching so test suites stay fast
    #[cfg(test)]
    pub(crate) fn for_tests(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            iterations: 1_000,
        }
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; 32] {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.secret, salt, self.iterations, &mut key);
        key
    }

    /// Encrypt a payload under a freshly salted key
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Internal(format!("Cipher init failed: {}", e)))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| AppError::Internal("Encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt and authenticate a payload produced by [`Encryptor::encrypt`]
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < HEADER_LEN + TAG_LEN {
            return Err(AppError::Decryption("Ciphertext is truncated".to_string()));
        }
        if data[0] != FORMAT_VERSION {
            return Err(AppError::Decryption(format!(
                "Unsupported payload version {}",
                data[0]
            )));
        }

        let (salt, rest) = data[1..].split_at(SALT_LEN);
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Decryption(format!("Cipher init failed: {}", e)))?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| AppError::Decryption("Authentication tag mismatch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let enc = Encryptor::for_tests("secret");
        for payload in [&b""[..], b"x", b"hello world", &[0u8; 4096][..]] {
            let sealed = enc.encrypt(payload).unwrap();
            assert_eq!(sealed.len(), HEADER_LEN + payload.len() + TAG_LEN);
            assert_eq!(enc.decrypt(&sealed).unwrap(), payload);
        }
    }

    #[test]
    fn salt_and_nonce_are_fresh_per_payload() {
        let enc = Encryptor::for_tests("secret");
        let a = enc.encrypt(b"same bytes").unwrap();
        let b = enc.encrypt(b"same bytes").unwrap();
        assert_ne!(a[1..HEADER_LEN], b[1..HEADER_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = Encryptor::for_tests("secret").encrypt(b"payload").unwrap();
        let err = Encryptor::for_tests("other").decrypt(&sealed).unwrap_err();
        assert!(matches!(err, AppError::Decryption(_)));
    }

    #[test]
    fn tampering_is_detected() {
        let enc = Encryptor::for_tests("secret");
        let mut sealed = enc.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(enc.decrypt(&sealed), Err(AppError::Decryption(_))));

        let mut sealed = enc.encrypt(b"payload").unwrap();
        sealed[3] ^= 0xff; // inside the salt
        assert!(matches!(enc.decrypt(&sealed), Err(AppError::Decryption(_))));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let enc = Encryptor::for_tests("secret");
        assert!(matches!(enc.decrypt(b"short"), Err(AppError::Decryption(_))));

        let mut sealed = enc.encrypt(b"payload").unwrap();
        sealed[0] = 9;
        assert!(matches!(enc.decrypt(&sealed), Err(AppError::Decryption(_))));
    }

    #[test]
    fn iterations_have_a_floor() {
        let enc = Encryptor::new("secret", 10);
        assert_eq!(enc.iterations, MIN_KDF_ITERATIONS);
    }
}
