use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateCategoryParams, PhotoCategoriesRepo, PhotoCategoriesWriteRepo, RepoError,
        UpdateCategoryParams,
    },
    domain::entities::PhotoCategoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "id, stub, name, description, photo_id, active, deleted, created";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    stub: String,
    name: String,
    description: Option<String>,
    photo_id: Option<i64>,
    active: bool,
    deleted: bool,
    created: OffsetDateTime,
}

impl From<CategoryRow> for PhotoCategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            stub: row.stub,
            name: row.name,
            description: row.description,
            photo_id: row.photo_id,
            active: row.active,
            deleted: row.deleted,
            created_at: row.created,
        }
    }
}

impl PostgresRepositories {
    async fn fetch_categories(&self, sql: &str) -> Result<Vec<PhotoCategoryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryRow>(sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PhotoCategoryRecord::from).collect())
    }
}

#[async_trait]
impl PhotoCategoriesRepo for PostgresRepositories {
    async fn list_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError> {
        self.fetch_categories(&format!(
            "SELECT {COLUMNS} FROM photo_categories ORDER BY name"
        ))
        .await
    }

    async fn list_public_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError> {
        self.fetch_categories(&format!(
            "SELECT {COLUMNS} FROM photo_categories \
             WHERE active AND NOT deleted ORDER BY name"
        ))
        .await
    }

    async fn find_category_by_id(
        &self,
        id: i64,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {COLUMNS} FROM photo_categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoCategoryRecord::from))
    }

    async fn find_category_by_stub(
        &self,
        stub: &str,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {COLUMNS} FROM photo_categories WHERE stub = $1 AND NOT deleted"
        ))
        .bind(stub)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoCategoryRecord::from))
    }
}

#[async_trait]
impl PhotoCategoriesWriteRepo for PostgresRepositories {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<PhotoCategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "INSERT INTO photo_categories (name, stub, description, active, deleted) \
             VALUES ($1, $2, $3, FALSE, FALSE) RETURNING {COLUMNS}"
        ))
        .bind(params.name)
        .bind(params.stub)
        .bind(params.description)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "UPDATE photo_categories \
             SET stub = $2, name = $3, description = $4, photo_id = $5, active = $6, deleted = $7 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.stub)
        .bind(params.name)
        .bind(params.description)
        .bind(params.photo_id)
        .bind(params.active)
        .bind(params.deleted)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoCategoryRecord::from))
    }
}
