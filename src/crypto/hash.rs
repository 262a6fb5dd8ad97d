use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix marking a content-addressed identifier
pub const CONTENT_ID_PREFIX: &str = "Qm";

/// Content-addressed identifier: `Qm` followed by the hex SHA-256 of the bytes.
///
/// Two payloads share an id exactly when their bytes are identical, which makes
/// the id usable as the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Hash raw bytes into a content id
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(format!("{}{}", CONTENT_ID_PREFIX, hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let a = ContentId::of(b"hello world");
        let b = ContentId::of(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, ContentId::of(b"hello world!"));
    }

    #[test]
    fn empty_input_has_a_fixed_id() {
        assert_eq!(
            ContentId::of(&[]).as_str(),
            "Qme3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn id_has_prefix_and_full_digest() {
        let id = ContentId::of(b"abc");
        assert!(id.as_str().starts_with(CONTENT_ID_PREFIX));
        assert_eq!(id.as_str().len(), CONTENT_ID_PREFIX.len() + 64);
        assert_eq!(id.to_string(), id.as_str());
    }
}
