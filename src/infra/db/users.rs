use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateUserParams, RepoError, UsersRepo, UsersWriteRepo},
    domain::entities::UserRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "id, username, stub, email, password_hash, active, deleted, created";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    stub: String,
    email: String,
    password_hash: String,
    active: bool,
    deleted: bool,
    created: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            stub: row.stub,
            email: row.email,
            password_hash: row.password_hash,
            active: row.active,
            deleted: row.deleted,
            created_at: row.created,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1 AND NOT deleted"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM users WHERE email = $1 AND NOT deleted"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }
}

#[async_trait]
impl UsersWriteRepo for PostgresRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, stub, email, password_hash, active, deleted) \
             VALUES ($1, $2, $3, $4, FALSE, FALSE) RETURNING {COLUMNS}"
        ))
        .bind(params.username)
        .bind(params.stub)
        .bind(params.email)
        .bind(params.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}
