use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::crypto::ContentId;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    category_for, format_timestamp, is_previewable, label_for, FileRecord, NewFile, ShareRole,
    StorageUsage,
};
use crate::services::AccessGate;
use crate::storage::StorageManager;

const MAX_NAME_LEN: usize = 255;

/// File service
pub struct FileService;

impl FileService {
    /// Validate, deduplicate, encrypt and record an upload
    pub async fn create_file(
        db: &Database,
        storage: &StorageManager,
        max_file_size: u64,
        new: NewFile,
        data: Bytes,
    ) -> Result<FileRecord> {
        let category = category_for(&new.mime_type).ok_or_else(|| {
            AppError::UnsupportedType(format!("File type '{}' not allowed", new.mime_type))
        })?;

        let size = data.len() as u64;
        if size > max_file_size {
            return Err(AppError::FileTooLarge {
                size,
                limit: max_file_size,
            });
        }
        if size == 0 {
            return Err(AppError::Validation("File is empty".to_string()));
        }

        Self::validate_name(&new.name)?;
        Self::validate_name(&new.original_name)?;

        let content_hash = ContentId::of(&data);

        // Fast path; the unique constraint below settles concurrent uploads
        if Self::hash_exists(db, &new.owner_id, &content_hash).await? {
            return Err(AppError::Duplicate);
        }

        // Store first: a failure after this point leaves at most orphaned bytes
        let hint = Uuid::new_v4().simple().to_string();
        let storage_path = storage.backend().store(data, &hint).await?;

        let ai_label = label_for(&new.original_name, category);
        let now = format_timestamp(Utc::now());
        let inserted = sqlx::query(
            r#"
            INSERT INTO files (
                owner_id, name, original_name, size, mime_type, category,
                storage_path, content_hash, ai_label, is_private, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&new.owner_id)
        .bind(&new.name)
        .bind(&new.original_name)
        .bind(size as i64)
        .bind(&new.mime_type)
        .bind(category)
        .bind(&storage_path)
        .bind(content_hash.as_str())
        .bind(ai_label)
        .bind(&now)
        .execute(db.pool())
        .await
        .map_err(AppError::from);

        let file_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) => {
                // Compensate so the failed upload does not leave an orphan behind
                if let Err(cleanup) = storage.backend().delete(&storage_path).await {
                    tracing::warn!(
                        storage_path = %storage_path,
                        error = %cleanup,
                        "Failed to remove bytes of rejected upload"
                    );
                }
                if e.is_unique_violation() {
                    tracing::debug!(
                        owner_id = %new.owner_id,
                        content_hash = %content_hash,
                        "Concurrent duplicate upload rejected"
                    );
                    return Err(AppError::Duplicate);
                }
                return Err(e);
            }
        };

        tracing::info!(
            owner_id = %new.owner_id,
            file_id,
            size,
            content_hash = %content_hash,
            "File stored"
        );

        Self::find_file(db, file_id)
            .await?
            .ok_or_else(|| AppError::Internal("Stored file record vanished".to_string()))
    }

    /// Display names are labels only, but they still end up in response headers
    fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty()
            || name.chars().count() > MAX_NAME_LEN
            || name.contains('/')
            || name.contains('\\')
            || name.chars().any(char::is_control)
        {
            return Err(AppError::Validation("Invalid file name".to_string()));
        }
        Ok(())
    }

    async fn hash_exists(db: &Database, owner_id: &str, content_hash: &ContentId) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM files WHERE owner_id = ? AND content_hash = ?")
                .bind(owner_id)
                .bind(content_hash.as_str())
                .fetch_one(db.pool())
                .await?;
        Ok(count.0 > 0)
    }

    /// All files owned by a user, newest first
    pub async fn list_files(db: &Database, owner_id: &str) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as(
            "SELECT * FROM files WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(db.pool())
        .await?;
        Ok(files)
    }

    /// Get a file the user owns; anything else is "not found"
    pub async fn get_file(db: &Database, file_id: i64, owner_id: &str) -> Result<FileRecord> {
        sqlx::query_as("SELECT * FROM files WHERE id = ? AND owner_id = ?")
            .bind(file_id)
            .bind(owner_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Lookup without an ownership check, for callers that already went through the gate
    async fn find_file(db: &Database, file_id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?;
        Ok(file)
    }

    /// Delete a file record and its stored bytes
    pub async fn delete_file(
        db: &Database,
        storage: &StorageManager,
        file_id: i64,
        owner_id: &str,
    ) -> Result<bool> {
        let file = match Self::get_file(db, file_id, owner_id).await {
            Ok(file) => file,
            Err(AppError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        // The record is authoritative; grants cascade with it
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND owner_id = ?")
            .bind(file_id)
            .bind(owner_id)
            .execute(db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        match storage.backend().delete(&file.storage_path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(file_id, "Stored bytes were already missing on delete");
            }
            Err(e) => {
                tracing::warn!(
                    file_id,
                    error = %e,
                    "Failed to delete stored bytes; left for the orphan sweep"
                );
            }
        }

        tracing::info!(owner_id, file_id, "File deleted");
        Ok(true)
    }

    /// Read and decrypt the bytes behind a record
    pub async fn read_contents(storage: &StorageManager, file: &FileRecord) -> Result<Bytes> {
        storage
            .backend()
            .retrieve(&file.storage_path)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound("File data not found".to_string()),
                other => other,
            })
    }

    /// Download a file the user owns or holds a viewer grant for
    pub async fn download(
        db: &Database,
        storage: &StorageManager,
        user_id: &str,
        file_id: i64,
    ) -> Result<(FileRecord, Bytes)> {
        AccessGate::authorize(db, user_id, file_id, ShareRole::Viewer).await?;

        let file = Self::find_file(db, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        let data = Self::read_contents(storage, &file).await?;
        Ok((file, data))
    }

    /// Like `download`, restricted to types that render inline
    pub async fn preview(
        db: &Database,
        storage: &StorageManager,
        user_id: &str,
        file_id: i64,
    ) -> Result<(FileRecord, Bytes)> {
        AccessGate::authorize(db, user_id, file_id, ShareRole::Viewer).await?;

        let file = Self::find_file(db, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        if !is_previewable(&file.mime_type) {
            return Err(AppError::UnsupportedType(
                "File type not previewable".to_string(),
            ));
        }
        let data = Self::read_contents(storage, &file).await?;
        Ok((file, data))
    }

    /// Metadata, including the content hash, for analyzers and owners
    pub async fn inspect(db: &Database, user_id: &str, file_id: i64) -> Result<FileRecord> {
        AccessGate::authorize(db, user_id, file_id, ShareRole::Analyzer).await?;

        Self::find_file(db, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Bytes and file count held by a user
    pub async fn storage_used(db: &Database, owner_id: &str) -> Result<StorageUsage> {
        let (file_count, bytes_used): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_one(db.pool())
        .await?;

        Ok(StorageUsage {
            file_count,
            bytes_used,
        })
    }
}
