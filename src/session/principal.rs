use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::User;

/// Identity resolved for one request.
///
/// Serialized with a `type` discriminator so the token payload reads
/// `{"type":"anonymous","id":"…"}` or `{"type":"user","id":7,"username":"…","created":"…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Principal {
    #[serde(rename = "anonymous")]
    Anonymous { id: String },
    #[serde(rename = "user")]
    Authenticated {
        id: i64,
        username: String,
        #[serde(rename = "created", with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
    },
}

impl Principal {
    /// A visitor with a fresh random id.
    pub fn anonymous() -> Self {
        Self::Anonymous {
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Authenticated { username, .. } => Some(username),
            Self::Anonymous { .. } => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous { .. } => "anonymous",
            Self::Authenticated { .. } => "user",
        }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self::Authenticated {
            id: user.id,
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("authentication required")]
    Unauthenticated,
}

/// Gate for user-only surfaces.
pub fn authorize(principal: &Principal) -> Result<(), AuthorizationError> {
    match principal {
        Principal::Authenticated { .. } => Ok(()),
        Principal::Anonymous { .. } => Err(AuthorizationError::Unauthenticated),
    }
}
