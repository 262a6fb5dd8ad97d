use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::crypto::Encryptor;
use crate::error::{AppError, Result};

/// Extension of every stored ciphertext object
pub const OBJECT_EXTENSION: &str = "enc";

const MAX_HINT_LEN: usize = 128;

/// Stored object as seen by a listing
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub path: String,
    pub modified_at: DateTime<Utc>,
}

/// Storage backend trait
///
/// Backends receive plaintext and are responsible for sealing it with the
/// [`Encryptor`] before it touches the medium. Paths returned by `store` are
/// opaque handles; callers persist them and hand them back unchanged.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Encrypt and persist data, returning the storage path
    async fn store(&self, data: Bytes, identifier_hint: &str) -> Result<String>;

    /// Read and decrypt data
    async fn retrieve(&self, path: &str) -> Result<Bytes>;

    /// Delete data; false if nothing was stored at `path`
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Check if an object exists (no decryption)
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Enumerate stored objects
    async fn list_objects(&self) -> Result<Vec<StoredObject>>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}

/// Validate an identifier hint. Only internally generated ids are accepted.
pub fn validate_hint(hint: &str) -> Result<()> {
    let valid = (2..=MAX_HINT_LEN).contains(&hint.len())
        && hint
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(AppError::StorageIo(format!(
            "Rejected storage identifier {:?}",
            hint
        )))
    }
}

/// Storage path for a hint: `<first two chars>/<hint>.enc`
pub fn object_path(hint: &str) -> Result<String> {
    validate_hint(hint)?;
    Ok(format!("{}/{}.{}", &hint[..2], hint, OBJECT_EXTENSION))
}

/// Check a storage path handed back by a caller and return its hint
pub fn parse_object_path(path: &str) -> Result<&str> {
    let invalid = || AppError::StorageIo(format!("Invalid storage path {:?}", path));

    let (shard, file) = path.split_once('/').ok_or_else(invalid)?;
    let hint = file
        .strip_suffix(OBJECT_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .ok_or_else(invalid)?;

    validate_hint(hint).map_err(|_| invalid())?;
    if shard.len() != 2 || !hint.starts_with(shard) {
        return Err(invalid());
    }
    Ok(hint)
}

/// Encrypt off the async executor; key stretching is CPU-heavy
pub async fn seal(encryptor: &Arc<Encryptor>, data: Bytes) -> Result<Vec<u8>> {
    let encryptor = Arc::clone(encryptor);
    tokio::task::spawn_blocking(move || encryptor.encrypt(&data)).await?
}

/// Decrypt off the async executor
pub async fn open(encryptor: &Arc<Encryptor>, data: Vec<u8>) -> Result<Bytes> {
    let encryptor = Arc::clone(encryptor);
    let plain = tokio::task::spawn_blocking(move || encryptor.decrypt(&data)).await??;
    Ok(Bytes::from(plain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_are_sharded() {
        assert_eq!(object_path("abcdef").unwrap(), "ab/abcdef.enc");
        assert_eq!(parse_object_path("ab/abcdef.enc").unwrap(), "abcdef");
    }

    #[test]
    fn traversal_is_rejected() {
        for hint in ["", "a", "../etc", "a/b", "hello.txt", "x\0y", "ab cd"] {
            assert!(object_path(hint).is_err(), "accepted {:?}", hint);
        }
        for path in [
            "../ab/abcd.enc",
            "/ab/abcd.enc",
            "ab/../abcd.enc",
            "ab/abcd.txt",
            "cd/abcd.enc",
            "ab/cd/abcd.enc",
            "abcd.enc",
        ] {
            assert!(parse_object_path(path).is_err(), "accepted {:?}", path);
        }
    }
}
