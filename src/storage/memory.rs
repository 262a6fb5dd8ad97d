//! In-memory storage backend.
//!
//! Keeps sealed objects in a `DashMap`. Nothing survives a restart, so this
//! suits tests and throwaway deployments.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::crypto::Encryptor;
use crate::error::{AppError, Result};
use crate::storage::provider::{object_path, open, parse_object_path, seal};
use crate::storage::{StorageBackend, StoredObject};

struct MemoryObject {
    data: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// In-memory storage backend
pub struct MemoryStorage {
    objects: DashMap<String, MemoryObject>,
    encryptor: Arc<Encryptor>,
}

impl MemoryStorage {
    pub fn new(encryptor: Arc<Encryptor>) -> Self {
        Self {
            objects: DashMap::new(),
            encryptor,
        }
    }

    /// Number of stored objects
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn store(&self, data: Bytes, identifier_hint: &str) -> Result<String> {
        let path = object_path(identifier_hint)?;
        let sealed = seal(&self.encryptor, data).await?;

        match self.objects.entry(path.clone()) {
            Entry::Occupied(_) => Err(AppError::StorageIo(
                "Storage object already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(MemoryObject {
                    data: sealed,
                    created_at: Utc::now(),
                });
                Ok(path)
            }
        }
    }

    async fn retrieve(&self, path: &str) -> Result<Bytes> {
        parse_object_path(path)?;
        let data = self
            .objects
            .get(path)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| AppError::NotFound("Stored file not found".to_string()))?;
        open(&self.encryptor, data).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        parse_object_path(path)?;
        Ok(self.objects.remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        parse_object_path(path)?;
        Ok(self.objects.contains_key(path))
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects
            .iter()
            .map(|entry| StoredObject {
                path: entry.key().clone(),
                modified_at: entry.value().created_at,
            })
            .collect())
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let storage = MemoryStorage::new(Arc::new(Encryptor::for_tests("mem")));

        let path = storage.store(Bytes::from_static(b"data"), "abc123").await.unwrap();
        assert_eq!(storage.len(), 1);
        assert!(storage.exists(&path).await.unwrap());
        assert_eq!(storage.retrieve(&path).await.unwrap(), Bytes::from_static(b"data"));

        assert!(storage.delete(&path).await.unwrap());
        assert!(!storage.delete(&path).await.unwrap());
        assert!(storage.is_empty());
        assert!(matches!(
            storage.retrieve(&path).await,
            Err(AppError::NotFound(_))
        ));
    }
}
