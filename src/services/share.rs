use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{format_timestamp, FileRecord, ShareGrant, ShareRole};

/// Random bytes behind every share token
const TOKEN_BYTES: usize = 16;
const TOKEN_ATTEMPTS: usize = 10;
/// Ten years; keeps stored expiries inside four-digit RFC 3339 years
pub const MAX_EXPIRY_HOURS: i64 = 24 * 365 * 10;

pub struct ShareService;

impl ShareService {
    /// Generate an unguessable URL-safe token
    pub fn generate_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Create a share grant on a file the caller owns
    pub async fn create_grant(
        db: &Database,
        file_id: i64,
        owner_id: &str,
        target: Option<String>,
        role: ShareRole,
        expires_hours: Option<i64>,
    ) -> Result<ShareGrant> {
        // Verify file exists and belongs to user
        let file_owner: Option<String> =
            sqlx::query_scalar("SELECT owner_id FROM files WHERE id = ?")
                .bind(file_id)
                .fetch_optional(db.pool())
                .await?;

        let file_owner =
            file_owner.ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        if file_owner != owner_id {
            return Err(AppError::Permission(
                "Only the file owner can share it".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = match expires_hours {
            None => None,
            Some(hours) if hours <= 0 || hours > MAX_EXPIRY_HOURS => {
                return Err(AppError::Validation(format!(
                    "expires_hours must be between 1 and {}",
                    MAX_EXPIRY_HOURS
                )));
            }
            Some(hours) => {
                let expiry = Duration::try_hours(hours)
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or_else(|| {
                        AppError::Validation("expires_hours is out of range".to_string())
                    })?;
                Some(format_timestamp(expiry))
            }
        };

        let target = target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let created_at = format_timestamp(now);

        let mut last_error: Option<sqlx::Error> = None;
        for _ in 0..TOKEN_ATTEMPTS {
            let grant_id = Uuid::new_v4().to_string();
            let token = Self::generate_token();

            let result = sqlx::query(
                r#"
                INSERT INTO shares (
                    id, file_id, created_by, target, role, token, expires_at, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&grant_id)
            .bind(file_id)
            .bind(owner_id)
            .bind(&target)
            .bind(role.as_str())
            .bind(&token)
            .bind(&expires_at)
            .bind(&created_at)
            .execute(db.pool())
            .await;

            match result {
                Ok(_) => {
                    tracing::info!(
                        file_id,
                        role = role.as_str(),
                        public = target.is_none(),
                        "Share grant created"
                    );
                    return Self::get_grant(db, &grant_id).await;
                }
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    last_error = Some(sqlx::Error::Database(db_err));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "Failed to generate unique share token: {}",
            last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )))
    }

    /// Get grant by ID
    async fn get_grant(db: &Database, id: &str) -> Result<ShareGrant> {
        sqlx::query_as("SELECT * FROM shares WHERE id = ?")
            .bind(id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Share not found".to_string()))
    }

    /// Resolve a token to a live grant
    pub async fn resolve_grant(db: &Database, token: &str) -> Result<Option<ShareGrant>> {
        Self::resolve_grant_at(db, token, Utc::now()).await
    }

    /// Resolve a token as of `now`; expired grants are treated as absent
    pub async fn resolve_grant_at(
        db: &Database,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ShareGrant>> {
        let grant: Option<ShareGrant> = sqlx::query_as("SELECT * FROM shares WHERE token = ?")
            .bind(token)
            .fetch_optional(db.pool())
            .await?;

        Ok(grant.filter(|g| !g.is_expired_at(now)))
    }

    /// Resolve a token to its grant and the shared file
    pub async fn resolve_share(
        db: &Database,
        token: &str,
    ) -> Result<Option<(ShareGrant, FileRecord)>> {
        let Some(grant) = Self::resolve_grant(db, token).await? else {
            return Ok(None);
        };

        let file: Option<FileRecord> = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(grant.file_id)
            .fetch_optional(db.pool())
            .await?;

        Ok(file.map(|f| (grant, f)))
    }

    /// Delete a grant; only the owner of the shared file may do so
    pub async fn revoke_grant(db: &Database, token: &str, owner_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM shares \
             WHERE token = ? AND file_id IN (SELECT id FROM files WHERE owner_id = ?)",
        )
        .bind(token)
        .bind(owner_id)
        .execute(db.pool())
        .await?;

        let revoked = result.rows_affected() > 0;
        if revoked {
            tracing::info!(owner_id, "Share grant revoked");
        }
        Ok(revoked)
    }

    /// Live grants on files the user owns
    pub async fn list_grants(db: &Database, owner_id: &str) -> Result<Vec<ShareGrant>> {
        let grants: Vec<ShareGrant> = sqlx::query_as(
            r#"
            SELECT s.*
            FROM shares s
            JOIN files f ON s.file_id = f.id
            WHERE f.owner_id = ?
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(db.pool())
        .await?;

        let now = Utc::now();
        Ok(grants.into_iter().filter(|g| !g.is_expired_at(now)).collect())
    }

    /// Physically remove grants whose expiry lies before `now`
    pub async fn purge_expired(db: &Database, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM shares WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(format_timestamp(now))
                .execute(db.pool())
                .await?;
        Ok(result.rows_affected())
    }
}
