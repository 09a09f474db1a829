//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoCategoryRecord {
    pub id: i64,
    pub stub: String,
    pub name: String,
    pub description: Option<String>,
    pub photo_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: i64,
    pub stub: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PhotoRecord {
    /// Visible on the public site.
    pub fn is_public(&self) -> bool {
        self.active && !self.deleted
    }
}

/// Stored user row, including the password hash. Never leaves the application layer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub stub: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub stub: String,
    pub email: String,
    pub active: bool,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            stub: record.stub,
            email: record.email,
            active: record.active,
            deleted: record.deleted,
            created_at: record.created_at,
        }
    }
}
