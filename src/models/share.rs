use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{parse_timestamp, FileRecord};

/// Role carried by a share grant, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    Viewer,
    Analyzer,
    Owner,
}

impl ShareRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareRole::Viewer => "viewer",
            ShareRole::Analyzer => "analyzer",
            ShareRole::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "viewer" => Some(ShareRole::Viewer),
            "analyzer" => Some(ShareRole::Analyzer),
            "owner" => Some(ShareRole::Owner),
            _ => None,
        }
    }

    /// True when this role carries at least the privilege of `required`
    pub fn satisfies(&self, required: ShareRole) -> bool {
        *self >= required
    }
}

/// Share grant model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShareGrant {
    pub id: String,
    pub file_id: i64,
    pub created_by: String,
    pub target: Option<String>,
    pub role: String,
    pub token: String,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl ShareGrant {
    pub fn get_role(&self) -> Option<ShareRole> {
        ShareRole::from_str(&self.role)
    }

    /// A grant lapses once `now` is past its expiry; an unreadable expiry counts as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match &self.expires_at {
            None => false,
            Some(raw) => match parse_timestamp(raw) {
                Some(expiry) => expiry < now,
                None => true,
            },
        }
    }

    pub fn is_public(&self) -> bool {
        self.target.is_none()
    }
}

/// Request to create a share
#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub file_id: i64,
    pub target: Option<String>,
    #[serde(default = "default_role")]
    pub role: ShareRole,
    pub expires_hours: Option<i64>,
}

fn default_role() -> ShareRole {
    ShareRole::Viewer
}

/// What a public link reveals about its file
#[derive(Debug, Serialize)]
pub struct PublicShareInfo {
    pub file: FileRecord,
    pub role: String,
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_timestamp;
    use chrono::Duration;

    fn grant(expires_at: Option<String>) -> ShareGrant {
        ShareGrant {
            id: "g".into(),
            file_id: 1,
            created_by: "alice".into(),
            target: None,
            role: "viewer".into(),
            token: "t".into(),
            expires_at,
            created_at: format_timestamp(Utc::now()),
        }
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(ShareRole::Owner > ShareRole::Analyzer);
        assert!(ShareRole::Analyzer > ShareRole::Viewer);
        assert!(ShareRole::Analyzer.satisfies(ShareRole::Viewer));
        assert!(!ShareRole::Viewer.satisfies(ShareRole::Analyzer));
        assert_eq!(ShareRole::from_str("Analyzer"), Some(ShareRole::Analyzer));
        assert_eq!(ShareRole::from_str("admin"), None);
    }

    #[test]
    fn expiry_is_computed() {
        let now = Utc::now();
        assert!(!grant(None).is_expired_at(now));
        assert!(grant(Some(format_timestamp(now - Duration::seconds(1)))).is_expired_at(now));
        assert!(!grant(Some(format_timestamp(now + Duration::hours(1)))).is_expired_at(now));
        assert!(grant(Some("garbage".into())).is_expired_at(now));
        // Still live at the exact expiry instant
        assert!(!grant(Some(format_timestamp(now))).is_expired_at(now));
        assert!(grant(Some("+13434-09-27T18:06:12.310592Z".into())).is_expired_at(now));
    }

    #[test]
    fn role_defaults_to_viewer() {
        let req: CreateShareRequest = serde_json::from_str(r#"{"file_id": 3}"#).unwrap();
        assert_eq!(req.role, ShareRole::Viewer);
        assert!(req.target.is_none());
    }
}
