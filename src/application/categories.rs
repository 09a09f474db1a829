use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{
    CreateCategoryParams, PhotoCategoriesRepo, PhotoCategoriesWriteRepo, RepoError,
    UpdateCategoryParams,
};
use crate::cache::{CacheConfig, ReadCaches};
use crate::domain::entities::PhotoCategoryRecord;

const STUB_CONSTRAINT: &str = "photo_categories_stub_key";

#[derive(Debug, Error)]
pub enum CategoryServiceError {
    #[error("invalid {field}")]
    Invalid { field: &'static str },
    #[error("photo category not found")]
    NotFound,
    #[error("photo category stub already exists")]
    StubAlreadyExists,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for CategoryServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } if constraint == STUB_CONSTRAINT => {
                Self::StubAlreadyExists
            }
            RepoError::NotFound => Self::NotFound,
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCategoryCommand {
    pub name: String,
    pub stub: String,
    pub description: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryCommand {
    pub id: i64,
    pub name: Option<String>,
    pub stub: Option<String>,
    pub description: Option<String>,
    pub photo_id: Option<i64>,
    pub active: Option<bool>,
    pub deleted: Option<bool>,
}

/// Cached reads and invalidating writes over photo categories.
#[derive(Clone)]
pub struct PhotoCategoryService {
    reader: Arc<dyn PhotoCategoriesRepo>,
    writer: Arc<dyn PhotoCategoriesWriteRepo>,
    caches: Arc<ReadCaches<PhotoCategoryRecord>>,
}

impl PhotoCategoryService {
    pub fn new(
        reader: Arc<dyn PhotoCategoriesRepo>,
        writer: Arc<dyn PhotoCategoriesWriteRepo>,
        caches: Arc<ReadCaches<PhotoCategoryRecord>>,
    ) -> Self {
        Self {
            reader,
            writer,
            caches,
        }
    }

    pub fn caches_for(config: &CacheConfig) -> Arc<ReadCaches<PhotoCategoryRecord>> {
        Arc::new(ReadCaches::new(
            "categories.lists",
            "categories.items",
            config,
        ))
    }

    pub async fn get_all(
        &self,
        for_public: bool,
    ) -> Result<Vec<PhotoCategoryRecord>, CategoryServiceError> {
        let listed = if for_public {
            self.caches
                .lists()
                .get_or_populate("public", || async {
                    self.reader.list_public_categories().await.map(Some)
                })
                .await?
        } else {
            self.caches
                .lists()
                .get_or_populate("all", || async {
                    self.reader.list_categories().await.map(Some)
                })
                .await?
        };
        Ok(listed.unwrap_or_default())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<PhotoCategoryRecord, CategoryServiceError> {
        if id <= 0 {
            return Err(CategoryServiceError::Invalid { field: "id" });
        }
        self.caches
            .items()
            .get_or_populate(&id_key(id), || self.reader.find_category_by_id(id))
            .await?
            .ok_or(CategoryServiceError::NotFound)
    }

    pub async fn get_by_stub(&self, stub: &str) -> Result<PhotoCategoryRecord, CategoryServiceError> {
        if stub.trim().is_empty() {
            return Err(CategoryServiceError::Invalid { field: "stub" });
        }
        self.caches
            .items()
            .get_or_populate(&stub_key(stub), || self.reader.find_category_by_stub(stub))
            .await?
            .ok_or(CategoryServiceError::NotFound)
    }

    pub async fn create(
        &self,
        command: CreateCategoryCommand,
    ) -> Result<PhotoCategoryRecord, CategoryServiceError> {
        let name = required(command.name, "name")?;
        let stub = required(command.stub, "stub")?;
        let description = command.description.and_then(non_blank);

        let created = self
            .writer
            .create_category(CreateCategoryParams {
                name,
                stub,
                description,
            })
            .await?;

        self.caches.lists().clear();
        debug!(
            target = "holmok::application::categories",
            id = created.id,
            stub = %created.stub,
            "category created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        command: UpdateCategoryCommand,
    ) -> Result<PhotoCategoryRecord, CategoryServiceError> {
        if command.id <= 0 {
            return Err(CategoryServiceError::Invalid { field: "id" });
        }
        let current = self
            .reader
            .find_category_by_id(command.id)
            .await?
            .ok_or(CategoryServiceError::NotFound)?;

        let stub = match command.stub {
            Some(stub) => required(stub, "stub")?,
            None => current.stub.clone(),
        };
        let name = match command.name {
            Some(name) => required(name, "name")?,
            None => current.name.clone(),
        };

        let updated = self
            .writer
            .update_category(UpdateCategoryParams {
                id: command.id,
                stub,
                name,
                description: command.description.or(current.description),
                photo_id: command.photo_id.or(current.photo_id),
                active: command.active.unwrap_or(current.active),
                deleted: command.deleted.unwrap_or(current.deleted),
            })
            .await?
            .ok_or(CategoryServiceError::NotFound)?;

        let items = self.caches.items();
        items.invalidate(&id_key(updated.id));
        items.invalidate(&stub_key(&current.stub));
        items.invalidate(&stub_key(&updated.stub));
        self.caches.lists().clear();
        debug!(
            target = "holmok::application::categories",
            id = updated.id,
            "category updated"
        );
        Ok(updated)
    }

    pub fn clear_cache(&self) {
        self.caches.clear();
    }
}

fn id_key(id: i64) -> String {
    format!("id-{id}")
}

fn stub_key(stub: &str) -> String {
    format!("stub-{stub}")
}

fn required(value: String, field: &'static str) -> Result<String, CategoryServiceError> {
    non_blank(value).ok_or(CategoryServiceError::Invalid { field })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
