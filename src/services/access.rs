use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{ShareGrant, ShareRole};

/// Authorization over files: ownership first, then live share grants
pub struct AccessGate;

impl AccessGate {
    /// Check whether a user may act on a file with at least `required` privilege
    pub async fn can_access(
        db: &Database,
        user_id: &str,
        file_id: i64,
        required: ShareRole,
    ) -> Result<bool> {
        Self::can_access_at(db, user_id, file_id, required, Utc::now()).await
    }

    pub async fn can_access_at(
        db: &Database,
        user_id: &str,
        file_id: i64,
        required: ShareRole,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let owner: Option<String> = sqlx::query_scalar("SELECT owner_id FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(db.pool())
            .await?;

        let Some(owner) = owner else {
            return Ok(false);
        };
        if owner == user_id {
            return Ok(true);
        }

        let grants: Vec<ShareGrant> = sqlx::query_as(
            "SELECT * FROM shares WHERE file_id = ? AND (target IS NULL OR target = ?)",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_all(db.pool())
        .await?;

        Ok(grants.iter().any(|grant| {
            !grant.is_expired_at(now)
                && grant
                    .get_role()
                    .map_or(false, |role| role.satisfies(required))
        }))
    }

    /// Like `can_access`, but a refusal is reported as a missing file so
    /// callers cannot probe for ids they have no right to see.
    pub async fn authorize(
        db: &Database,
        user_id: &str,
        file_id: i64,
        required: ShareRole,
    ) -> Result<()> {
        if Self::can_access(db, user_id, file_id, required).await? {
            Ok(())
        } else {
            tracing::debug!(user_id, file_id, role = required.as_str(), "Access denied");
            Err(AppError::NotFound("File not found".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ShareService;
    use crate::test_support::{seed_file, test_db};
    use chrono::Duration;

    #[tokio::test]
    async fn owner_always_has_access() {
        let db = test_db().await;
        let file_id = seed_file(&db, "alice", "Qmowner").await;

        for role in [ShareRole::Viewer, ShareRole::Analyzer, ShareRole::Owner] {
            assert!(AccessGate::can_access(&db, "alice", file_id, role).await.unwrap());
        }
        assert!(!AccessGate::can_access(&db, "bob", file_id, ShareRole::Viewer).await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_denied() {
        let db = test_db().await;
        assert!(!AccessGate::can_access(&db, "alice", 404, ShareRole::Viewer).await.unwrap());
        assert!(matches!(
            AccessGate::authorize(&db, "alice", 404, ShareRole::Viewer).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn targeted_grant_respects_role_and_recipient() {
        let db = test_db().await;
        let file_id = seed_file(&db, "alice", "Qmtargeted").await;
        ShareService::create_grant(
            &db,
            file_id,
            "alice",
            Some("bob".into()),
            ShareRole::Analyzer,
            None,
        )
        .await
        .unwrap();

        assert!(AccessGate::can_access(&db, "bob", file_id, ShareRole::Viewer).await.unwrap());
        assert!(AccessGate::can_access(&db, "bob", file_id, ShareRole::Analyzer).await.unwrap());
        assert!(!AccessGate::can_access(&db, "bob", file_id, ShareRole::Owner).await.unwrap());
        assert!(!AccessGate::can_access(&db, "carol", file_id, ShareRole::Viewer).await.unwrap());
    }

    #[tokio::test]
    async fn public_grant_covers_everyone_until_expiry() {
        let db = test_db().await;
        let file_id = seed_file(&db, "alice", "Qmpublic").await;
        ShareService::create_grant(&db, file_id, "alice", None, ShareRole::Viewer, Some(1))
            .await
            .unwrap();

        let now = Utc::now();
        assert!(AccessGate::can_access_at(&db, "carol", file_id, ShareRole::Viewer, now)
            .await
            .unwrap());
        assert!(!AccessGate::can_access_at(&db, "carol", file_id, ShareRole::Analyzer, now)
            .await
            .unwrap());
        assert!(!AccessGate::can_access_at(
            &db,
            "carol",
            file_id,
            ShareRole::Viewer,
            now + Duration::hours(2)
        )
        .await
        .unwrap());
    }
}
