//! Fixtures shared by unit tests.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::Encryptor;
use crate::db::Database;
use crate::models::{format_timestamp, NewFile};
use crate::storage::{MemoryStorage, StorageManager};

/// Fresh migrated in-memory database
pub async fn test_db() -> Database {
    let db = Database::in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    db
}

/// Memory-backed storage manager plus a handle on the underlying map
pub fn test_storage() -> (StorageManager, Arc<MemoryStorage>) {
    let objects = Arc::new(MemoryStorage::new(Arc::new(Encryptor::for_tests(
        "test-secret",
    ))));
    (StorageManager::new(objects.clone()), objects)
}

pub fn new_file(owner_id: &str, name: &str, mime_type: &str) -> NewFile {
    NewFile {
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        original_name: name.to_string(),
        mime_type: mime_type.to_string(),
    }
}

/// Insert a file record directly, without any stored bytes behind it
pub async fn seed_file(db: &Database, owner_id: &str, content_hash: &str) -> i64 {
    let hint = Uuid::new_v4().simple().to_string();
    sqlx::query(
        r#"
        INSERT INTO files (
            owner_id, name, original_name, size, mime_type, category,
            storage_path, content_hash, ai_label, is_private, created_at
        )
        VALUES (?, 'seed.txt', 'seed.txt', 4, 'text/plain', 'Document', ?, ?, 'Text Document', 1, ?)
        "#,
    )
    .bind(owner_id)
    .bind(format!("{}/{}.enc", &hint[..2], hint))
    .bind(content_hash)
    .bind(format_timestamp(Utc::now()))
    .execute(db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}
