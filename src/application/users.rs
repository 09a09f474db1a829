use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UsersRepo, UsersWriteRepo};
use crate::domain::entities::User;

const STUB_LEN: usize = 11;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid {field}")]
    Invalid { field: &'static str },
    #[error("user not found")]
    NotFound,
    #[error("user already exists")]
    AlreadyExists,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for UserServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { .. } => Self::AlreadyExists,
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserCommand {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct UserService {
    reader: Arc<dyn UsersRepo>,
    writer: Arc<dyn UsersWriteRepo>,
}

impl UserService {
    pub fn new(reader: Arc<dyn UsersRepo>, writer: Arc<dyn UsersWriteRepo>) -> Self {
        Self { reader, writer }
    }

    /// Checks a login form. Unknown email, wrong password and disabled accounts
    /// all fail the same way.
    pub async fn get_by_login(&self, email: &str, password: &str) -> Result<User, UserServiceError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(UserServiceError::Invalid { field: "email" });
        }
        if password.is_empty() {
            return Err(UserServiceError::Invalid { field: "password" });
        }

        let Some(record) = self.reader.find_user_by_email(email).await? else {
            return Err(UserServiceError::InvalidCredentials);
        };
        if !verify_password(password, &record.password_hash) {
            return Err(UserServiceError::InvalidCredentials);
        }
        if !record.active || record.deleted {
            return Err(UserServiceError::InvalidCredentials);
        }
        Ok(record.into())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        if id <= 0 {
            return Err(UserServiceError::Invalid { field: "id" });
        }
        self.reader
            .find_user_by_id(id)
            .await?
            .map(User::from)
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn create(&self, command: CreateUserCommand) -> Result<User, UserServiceError> {
        let username = command.username.trim();
        let email = command.email.trim();
        if username.is_empty() {
            return Err(UserServiceError::Invalid { field: "username" });
        }
        if email.is_empty() {
            return Err(UserServiceError::Invalid { field: "email" });
        }
        if command.password.is_empty() {
            return Err(UserServiceError::Invalid { field: "password" });
        }

        let record = self
            .writer
            .create_user(CreateUserParams {
                username: username.to_string(),
                stub: generate_stub(),
                email: email.to_string(),
                password_hash: hash_password(&command.password),
            })
            .await?;
        Ok(record.into())
    }
}

/// Lowercase hex SHA-256 of the password, the format stored in `users.password_hash`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let computed = hash_password(password);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

fn generate_stub() -> String {
    let mut stub = Uuid::new_v4().simple().to_string();
    stub.truncate(STUB_LEN);
    stub
}
