use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreatePhotoParams, PhotosRepo, PhotosWriteRepo, RepoError, UpdatePhotoParams,
    },
    domain::entities::PhotoRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const COLUMNS: &str = "id, stub, name, description, category_id, active, deleted, edited, created";

#[derive(sqlx::FromRow)]
struct PhotoRow {
    id: i64,
    stub: String,
    name: String,
    description: Option<String>,
    category_id: Option<i64>,
    active: bool,
    deleted: bool,
    edited: bool,
    created: OffsetDateTime,
}

impl From<PhotoRow> for PhotoRecord {
    fn from(row: PhotoRow) -> Self {
        Self {
            id: row.id,
            stub: row.stub,
            name: row.name,
            description: row.description,
            category_id: row.category_id,
            active: row.active,
            deleted: row.deleted,
            edited: row.edited,
            created_at: row.created,
        }
    }
}

impl PostgresRepositories {
    async fn fetch_photos(
        &self,
        filter: &str,
        category_id: Option<i64>,
    ) -> Result<Vec<PhotoRecord>, RepoError> {
        let sql = format!("SELECT {COLUMNS} FROM photos {filter} ORDER BY name");
        let mut query = sqlx::query_as::<_, PhotoRow>(&sql);
        if let Some(category_id) = category_id {
            query = query.bind(category_id);
        }
        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PhotoRecord::from).collect())
    }
}

#[async_trait]
impl PhotosRepo for PostgresRepositories {
    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
        self.fetch_photos("", None).await
    }

    async fn list_public_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
        self.fetch_photos("WHERE active AND NOT deleted", None).await
    }

    async fn list_photos_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PhotoRecord>, RepoError> {
        self.fetch_photos("WHERE category_id = $1", Some(category_id))
            .await
    }

    async fn list_public_photos_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PhotoRecord>, RepoError> {
        self.fetch_photos(
            "WHERE category_id = $1 AND active AND NOT deleted",
            Some(category_id),
        )
        .await
    }

    async fn find_photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {COLUMNS} FROM photos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoRecord::from))
    }

    async fn find_photo_by_stub(&self, stub: &str) -> Result<Option<PhotoRecord>, RepoError> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {COLUMNS} FROM photos WHERE stub = $1 AND NOT deleted"
        ))
        .bind(stub)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoRecord::from))
    }

    async fn find_oldest_unedited(&self) -> Result<Option<PhotoRecord>, RepoError> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {COLUMNS} FROM photos WHERE NOT edited AND NOT deleted \
             ORDER BY created LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoRecord::from))
    }
}

#[async_trait]
impl PhotosWriteRepo for PostgresRepositories {
    async fn create_photo(&self, params: CreatePhotoParams) -> Result<PhotoRecord, RepoError> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "INSERT INTO photos (name, stub, description, active, deleted) \
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

    async fn update_photo(
        &self,
        params: UpdatePhotoParams,
    ) -> Result<Option<PhotoRecord>, RepoError> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "UPDATE photos \
             SET stub = $2, name = $3, description = $4, category_id = $5, \
                 active = $6, deleted = $7, edited = $8 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.stub)
        .bind(params.name)
        .bind(params.description)
        .bind(params.category_id)
        .bind(params.active)
        .bind(params.deleted)
        .bind(params.edited)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PhotoRecord::from))
    }
}
