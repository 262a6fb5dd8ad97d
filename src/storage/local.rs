use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::crypto::Encryptor;
use crate::error::{AppError, Result};
use crate::storage::provider::{object_path, open, parse_object_path, seal, OBJECT_EXTENSION};
use crate::storage::{StorageBackend, StoredObject};

/// Local file system storage backend
pub struct LocalStorage {
    base_path: PathBuf,
    encryptor: Arc<Encryptor>,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>, encryptor: Arc<Encryptor>) -> Self {
        Self {
            base_path: base_path.into(),
            encryptor,
        }
    }

    fn get_full_path(&self, path: &str) -> Result<PathBuf> {
        parse_object_path(path)?;
        Ok(self.base_path.join(path))
    }

    /// Write to a temp file next to the target, then link it into place.
    /// Linking fails when the target exists, so objects are never overwritten.
    async fn write_new(&self, full_path: &PathBuf, data: &[u8]) -> Result<()> {
        let parent = full_path
            .parent()
            .ok_or_else(|| AppError::StorageIo("Storage path has no parent".to_string()))?;
        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));

        // A concurrent delete may prune the shard directory between these steps
        let mut file = None;
        for _ in 0..2 {
            fs::create_dir_all(parent).await?;
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await
            {
                Ok(f) => {
                    file = Some(f);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let mut file = file
            .ok_or_else(|| AppError::StorageIo("Failed to create storage file".to_string()))?;

        let written: Result<()> = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::hard_link(&temp_path, full_path)
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => {
                        AppError::StorageIo("Storage object already exists".to_string())
                    }
                    _ => e.into(),
                })
        }
        .await;

        // The temp name is never needed again, whether or not the link succeeded
        if let Err(e) = fs::remove_file(&temp_path).await {
            tracing::warn!("Failed to remove temp file {:?}: {}", temp_path, e);
        }
        written
    }
}

/// Collect the objects of one shard. Entries that vanish mid-listing, including
/// the whole shard pruned by a concurrent delete, are skipped.
async fn list_shard(dir: &Path, shard_name: &str, objects: &mut Vec<StoredObject>) -> Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(OBJECT_EXTENSION) {
            continue;
        }
        let path = format!("{}/{}", shard_name, file_name);
        if parse_object_path(&path).is_err() {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        objects.push(StoredObject {
            path,
            modified_at: DateTime::<Utc>::from(metadata.modified()?),
        });
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn store(&self, data: Bytes, identifier_hint: &str) -> Result<String> {
        let path = object_path(identifier_hint)?;
        let full_path = self.base_path.join(&path);

        let sealed = seal(&self.encryptor, data).await?;
        self.write_new(&full_path, &sealed).await?;

        tracing::debug!("Saved file to {:?}", full_path);
        Ok(path)
    }

    async fn retrieve(&self, path: &str) -> Result<Bytes> {
        let full_path = self.get_full_path(path)?;

        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound("Stored file not found".to_string())
            } else {
                AppError::StorageIo(format!("Failed to read {:?}: {}", full_path, e))
            }
        })?;

        open(&self.encryptor, data).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let full_path = self.get_full_path(path)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        tracing::debug!("Deleted file {:?}", full_path);

        // Try to remove the shard directory if it is now empty
        if let Some(dir) = full_path.parent() {
            if dir != self.base_path {
                if let Ok(mut entries) = fs::read_dir(dir).await {
                    if matches!(entries.next_entry().await, Ok(None)) {
                        let _ = fs::remove_dir(dir).await;
                    }
                }
            }
        }

        Ok(true)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.get_full_path(path)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();

        let mut shards = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(objects),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name().to_string_lossy().to_string();
            list_shard(&shard.path(), &shard_name, &mut objects).await?;
        }

        Ok(objects)
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn backend(dir: &std::path::Path) -> LocalStorage {
        LocalStorage::new(dir, Arc::new(Encryptor::for_tests("local-secret")))
    }

    #[tokio::test]
    async fn store_then_retrieve() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        let path = storage
            .store(Bytes::from_static(b"hello.txt!"), "0123456789abcdef")
            .await
            .unwrap();
        assert_eq!(path, "01/0123456789abcdef.enc");
        assert!(storage.exists(&path).await.unwrap());

        // Ciphertext on disk, plaintext out
        let raw = std::fs::read(dir.path().join(&path)).unwrap();
        assert!(!raw.windows(10).any(|w| w == b"hello.txt!"));
        assert_eq!(storage.retrieve(&path).await.unwrap(), Bytes::from_static(b"hello.txt!"));
    }

    #[tokio::test]
    async fn objects_are_immutable() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        let path = storage.store(Bytes::from_static(b"one"), "samehint").await.unwrap();
        let err = storage.store(Bytes::from_static(b"two"), "samehint").await.unwrap_err();
        assert!(matches!(err, AppError::StorageIo(_)));
        assert_eq!(storage.retrieve(&path).await.unwrap(), Bytes::from_static(b"one"));
    }

    #[tokio::test]
    async fn existing_files_are_never_overwritten() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        // Something already sits where the object would go
        std::fs::create_dir_all(dir.path().join("fe")).unwrap();
        let target = dir.path().join("fe/feedface.enc");
        std::fs::write(&target, b"pre-existing").unwrap();

        let err = storage
            .store(Bytes::from_static(b"new"), "feedface")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageIo(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"pre-existing");

        // No temp files left behind either way
        storage.store(Bytes::from_static(b"ok"), "fe00ba11").await.unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path().join("fe"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn pruned_shard_lists_as_empty() {
        let dir = tempdir().unwrap();
        let mut objects = Vec::new();
        list_shard(&dir.path().join("ab"), "ab", &mut objects)
            .await
            .unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        let path = storage.store(Bytes::from_static(b"bye"), "deadbeef").await.unwrap();
        assert!(storage.delete(&path).await.unwrap());
        assert!(!storage.delete(&path).await.unwrap());
        assert!(!storage.exists(&path).await.unwrap());
        assert!(matches!(
            storage.retrieve(&path).await,
            Err(AppError::NotFound(_))
        ));
        // Empty shard directory pruned
        assert!(!dir.path().join("de").exists());
    }

    #[tokio::test]
    async fn corruption_surfaces_as_decryption_error() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        let path = storage.store(Bytes::from_static(b"payload"), "cafebabe").await.unwrap();
        let full = dir.path().join(&path);
        let mut raw = std::fs::read(&full).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        std::fs::write(&full, raw).unwrap();

        assert!(matches!(
            storage.retrieve(&path).await,
            Err(AppError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn hostile_paths_never_reach_the_filesystem() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        assert!(storage.store(Bytes::from_static(b"x"), "../../etc/passwd").await.is_err());
        assert!(storage.retrieve("../secret.enc").await.is_err());
        assert!(storage.exists("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn listing_finds_stored_objects() {
        let dir = tempdir().unwrap();
        let storage = backend(dir.path());

        let a = storage.store(Bytes::from_static(b"a"), "aaaa1111").await.unwrap();
        let b = storage.store(Bytes::from_static(b"b"), "bbbb2222").await.unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"ignored").unwrap();

        let mut listed: Vec<String> = storage
            .list_objects()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.path)
            .collect();
        listed.sort();
        assert_eq!(listed, vec![a, b]);
    }
}
