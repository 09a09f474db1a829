//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{PhotoCategoryRecord, PhotoRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub name: String,
    pub stub: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: i64,
    pub stub: String,
    pub name: String,
    pub description: Option<String>,
    pub photo_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct CreatePhotoParams {
    pub name: String,
    pub stub: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePhotoParams {
    pub id: i64,
    pub stub: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
    pub edited: bool,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub stub: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait PhotoCategoriesRepo: Send + Sync {
    /// Every category, ordered by name.
    async fn list_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError>;

    /// Active, non-deleted categories, ordered by name.
    async fn list_public_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError>;

    async fn find_category_by_id(&self, id: i64)
    -> Result<Option<PhotoCategoryRecord>, RepoError>;

    /// Deleted categories never match.
    async fn find_category_by_stub(
        &self,
        stub: &str,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError>;
}

#[async_trait]
pub trait PhotoCategoriesWriteRepo: Send + Sync {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<PhotoCategoryRecord, RepoError>;

    /// Returns `None` when no row has the given id.
    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError>;
}

#[async_trait]
pub trait PhotosRepo: Send + Sync {
    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, RepoError>;

    async fn list_public_photos(&self) -> Result<Vec<PhotoRecord>, RepoError>;

    async fn list_photos_by_category(&self, category_id: i64)
    -> Result<Vec<PhotoRecord>, RepoError>;

    async fn list_public_photos_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PhotoRecord>, RepoError>;

    async fn find_photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError>;

    /// Deleted photos never match.
    async fn find_photo_by_stub(&self, stub: &str) -> Result<Option<PhotoRecord>, RepoError>;

    /// Oldest photo that is neither edited nor deleted.
    async fn find_oldest_unedited(&self) -> Result<Option<PhotoRecord>, RepoError>;
}

#[async_trait]
pub trait PhotosWriteRepo: Send + Sync {
    async fn create_photo(&self, params: CreatePhotoParams) -> Result<PhotoRecord, RepoError>;

    async fn update_photo(
        &self,
        params: UpdatePhotoParams,
    ) -> Result<Option<PhotoRecord>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait UsersWriteRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;
}
