use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::application::repos::{
    CreatePhotoParams, PhotosRepo, PhotosWriteRepo, RepoError, UpdatePhotoParams,
};
use crate::cache::{CacheConfig, ReadCaches};
use crate::domain::entities::PhotoRecord;

const STUB_CONSTRAINT: &str = "photos_stub_key";

/// Characters escaped by a URI component encoder: everything except
/// alphanumerics and `-_.!~*'()`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum PhotoServiceError {
    #[error("invalid {field}")]
    Invalid { field: &'static str },
    #[error("photo not found")]
    NotFound,
    #[error("photo stub already exists")]
    StubAlreadyExists,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for PhotoServiceError {
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

/// Photo as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Photo {
    pub id: i64,
    pub name: String,
    pub stub: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
    pub edited: bool,
    /// `name`, URL-encoded for use in image paths.
    pub encoded_name: String,
}

impl From<PhotoRecord> for Photo {
    fn from(record: PhotoRecord) -> Self {
        let encoded_name = utf8_percent_encode(&record.name, URI_COMPONENT).to_string();
        Self {
            id: record.id,
            name: record.name,
            stub: record.stub,
            description: record.description,
            category_id: record.category_id,
            active: record.active,
            deleted: record.deleted,
            edited: record.edited,
            encoded_name,
        }
    }
}

/// Fields an editor may change. Saving always marks the photo edited.
#[derive(Debug, Clone)]
pub struct UpdatePhotoCommand {
    pub id: i64,
    pub stub: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub active: bool,
    pub deleted: bool,
}

#[derive(Clone)]
pub struct PhotoService {
    reader: Arc<dyn PhotosRepo>,
    writer: Arc<dyn PhotosWriteRepo>,
    caches: Arc<ReadCaches<PhotoRecord>>,
}

impl PhotoService {
    pub fn new(
        reader: Arc<dyn PhotosRepo>,
        writer: Arc<dyn PhotosWriteRepo>,
        caches: Arc<ReadCaches<PhotoRecord>>,
    ) -> Self {
        Self {
            reader,
            writer,
            caches,
        }
    }

    pub fn caches_for(config: &CacheConfig) -> Arc<ReadCaches<PhotoRecord>> {
        Arc::new(ReadCaches::new("photos.lists", "photos.items", config))
    }

    pub async fn get_all(&self, for_public: bool) -> Result<Vec<Photo>, PhotoServiceError> {
        let key = if for_public { "public" } else { "all" };
        let rows = self
            .caches
            .lists()
            .get_or_populate(key, || async {
                if for_public {
                    self.reader.list_public_photos().await.map(Some)
                } else {
                    self.reader.list_photos().await.map(Some)
                }
            })
            .await?;
        Ok(into_photos(rows))
    }

    pub async fn get_by_category(
        &self,
        category_id: i64,
        for_public: bool,
    ) -> Result<Vec<Photo>, PhotoServiceError> {
        let key = if for_public {
            format!("public_{category_id}")
        } else {
            format!("all_{category_id}")
        };
        let rows = self
            .caches
            .lists()
            .get_or_populate(&key, || async {
                if for_public {
                    self.reader
                        .list_public_photos_by_category(category_id)
                        .await
                        .map(Some)
                } else {
                    self.reader
                        .list_photos_by_category(category_id)
                        .await
                        .map(Some)
                }
            })
            .await?;
        Ok(into_photos(rows))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Photo>, PhotoServiceError> {
        let row = self
            .caches
            .items()
            .get_or_populate(&id_key(id), || self.reader.find_photo_by_id(id))
            .await?;
        Ok(row.map(Photo::from))
    }

    pub async fn get_by_stub(&self, stub: &str) -> Result<Option<Photo>, PhotoServiceError> {
        let row = self
            .caches
            .items()
            .get_or_populate(&stub_key(stub), || self.reader.find_photo_by_stub(stub))
            .await?;
        Ok(row.map(Photo::from))
    }

    /// Next photo in the editing queue. Always read from the store.
    pub async fn get_oldest_unedited(&self) -> Result<Option<Photo>, PhotoServiceError> {
        let row = self.reader.find_oldest_unedited().await?;
        Ok(row.map(Photo::from))
    }

    /// Registers a stored upload under `name` and `stub`.
    pub async fn create(&self, name: &str, stub: &str) -> Result<Photo, PhotoServiceError> {
        if name.trim().is_empty() {
            return Err(PhotoServiceError::Invalid { field: "name" });
        }
        if stub.trim().is_empty() {
            return Err(PhotoServiceError::Invalid { field: "stub" });
        }
        let created = self
            .writer
            .create_photo(CreatePhotoParams {
                name: name.trim().to_string(),
                stub: stub.trim().to_string(),
                description: None,
            })
            .await?;
        self.caches.lists().clear();
        Ok(created.into())
    }

    pub async fn update_photo(&self, command: UpdatePhotoCommand) -> Result<Photo, PhotoServiceError> {
        let stub = command.stub.trim().to_string();
        if stub.is_empty() {
            return Err(PhotoServiceError::Invalid { field: "stub" });
        }
        let current = self
            .reader
            .find_photo_by_id(command.id)
            .await?
            .ok_or(PhotoServiceError::NotFound)?;

        let updated = self
            .writer
            .update_photo(UpdatePhotoParams {
                id: command.id,
                stub,
                name: current.name.clone(),
                description: command.description,
                category_id: command.category_id,
                active: command.active,
                deleted: command.deleted,
                edited: true,
            })
            .await?
            .ok_or(PhotoServiceError::NotFound)?;

        let items = self.caches.items();
        items.invalidate(&id_key(updated.id));
        items.invalidate(&stub_key(&current.stub));
        items.invalidate(&stub_key(&updated.stub));
        self.caches.lists().clear();
        debug!(
            target = "holmok::application::photos",
            id = updated.id,
            stub = %updated.stub,
            "photo updated"
        );
        Ok(updated.into())
    }

    pub fn clear_cache(&self) {
        self.caches.clear();
    }
}

fn id_key(id: i64) -> String {
    format!("photo_id_{id}")
}

fn stub_key(stub: &str) -> String {
    format!("photo_stub_{stub}")
}

fn into_photos(rows: Option<Vec<PhotoRecord>>) -> Vec<Photo> {
    rows.unwrap_or_default()
        .into_iter()
        .map(Photo::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;

    struct StubPhotos {
        rows: Mutex<Vec<PhotoRecord>>,
        reads: AtomicUsize,
        fail: bool,
    }

    impl StubPhotos {
        fn with(rows: Vec<PhotoRecord>) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(rows),
                reads: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn snapshot(&self) -> Result<Vec<PhotoRecord>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RepoError::Timeout);
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PhotosRepo for StubPhotos {
        async fn list_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
            self.snapshot()
        }

        async fn list_public_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
            Ok(self
                .snapshot()?
                .into_iter()
                .filter(PhotoRecord::is_public)
                .collect())
        }

        async fn list_photos_by_category(
            &self,
            category_id: i64,
        ) -> Result<Vec<PhotoRecord>, RepoError> {
            Ok(self
                .snapshot()?
                .into_iter()
                .filter(|row| row.category_id == Some(category_id))
                .collect())
        }

        async fn list_public_photos_by_category(
            &self,
            category_id: i64,
        ) -> Result<Vec<PhotoRecord>, RepoError> {
            Ok(self
                .list_photos_by_category(category_id)
                .await?
                .into_iter()
                .filter(PhotoRecord::is_public)
                .collect())
        }

        async fn find_photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError> {
            Ok(self.snapshot()?.into_iter().find(|row| row.id == id))
        }

        async fn find_photo_by_stub(&self, stub: &str) -> Result<Option<PhotoRecord>, RepoError> {
            Ok(self
                .snapshot()?
                .into_iter()
                .find(|row| row.stub == stub && !row.deleted))
        }

        async fn find_oldest_unedited(&self) -> Result<Option<PhotoRecord>, RepoError> {
            Ok(self
                .snapshot()?
                .into_iter()
                .filter(|row| !row.edited && !row.deleted)
                .min_by_key(|row| row.created_at))
        }
    }

    #[async_trait]
    impl PhotosWriteRepo for StubPhotos {
        async fn create_photo(&self, params: CreatePhotoParams) -> Result<PhotoRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|row| row.stub == params.stub) {
                return Err(RepoError::Duplicate {
                    constraint: STUB_CONSTRAINT.to_string(),
                });
            }
            let mut record = photo(rows.len() as i64 + 1, &params.stub, None);
            record.name = params.name;
            record.active = false;
            rows.push(record.clone());
            Ok(record)
        }

        async fn update_photo(
            &self,
            params: UpdatePhotoParams,
        ) -> Result<Option<PhotoRecord>, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.iter_mut().find(|row| row.id == params.id) else {
                return Ok(None);
            };
            row.stub = params.stub;
            row.name = params.name;
            row.description = params.description;
            row.category_id = params.category_id;
            row.active = params.active;
            row.deleted = params.deleted;
            row.edited = params.edited;
            Ok(Some(row.clone()))
        }
    }

    fn photo(id: i64, stub: &str, category_id: Option<i64>) -> PhotoRecord {
        PhotoRecord {
            id,
            stub: stub.to_string(),
            name: format!("{stub} original.jpg"),
            description: None,
            category_id,
            active: true,
            deleted: false,
            edited: false,
            created_at: datetime!(2022-01-01 00:00 UTC) + time::Duration::days(id),
        }
    }

    fn service(repo: &Arc<StubPhotos>) -> PhotoService {
        PhotoService::new(
            repo.clone(),
            repo.clone(),
            PhotoService::caches_for(&CacheConfig::default()),
        )
    }

    #[test]
    fn encodes_names_for_urls() {
        let lake = Photo::from(photo(1, "lake", None));
        assert_eq!(lake.encoded_name, "lake%20original.jpg");

        let mut tricky = photo(2, "x", None);
        tricky.name = "a+b/c.jpg".to_string();
        assert_eq!(Photo::from(tricky).encoded_name, "a%2Bb%2Fc.jpg");

        let mut quoted = photo(3, "y", None);
        quoted.name = "Tom's (1)*~!.jpg".to_string();
        assert_eq!(Photo::from(quoted).encoded_name, "Tom's%20(1)*~!.jpg");

        let mut accented = photo(4, "z", None);
        accented.name = "café & co?.jpg".to_string();
        assert_eq!(
            Photo::from(accented).encoded_name,
            "caf%C3%A9%20%26%20co%3F.jpg"
        );
    }

    #[tokio::test]
    async fn update_invalidates_item_and_category_lists() {
        let repo = StubPhotos::with(vec![photo(1, "lake", Some(3)), photo(2, "hill", Some(3))]);
        let service = service(&repo);

        assert_eq!(service.get_by_category(3, true).await.unwrap().len(), 2);
        assert!(service.get_by_stub("lake").await.unwrap().is_some());
        assert!(!service.get_by_id(1).await.unwrap().unwrap().edited);

        let updated = service
            .update_photo(UpdatePhotoCommand {
                id: 1,
                stub: "lake-at-dawn".to_string(),
                description: Some("Mist".to_string()),
                category_id: Some(3),
                active: false,
                deleted: false,
            })
            .await
            .expect("update");
        assert!(updated.edited);
        assert_eq!(updated.name, "lake original.jpg");

        let by_id = service.get_by_id(1).await.unwrap().expect("photo");
        assert_eq!(by_id.stub, "lake-at-dawn");
        assert_eq!(service.get_by_category(3, true).await.unwrap().len(), 1);
        assert_eq!(service.get_by_category(3, false).await.unwrap().len(), 2);
        assert!(service.get_by_stub("lake").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_are_served_from_cache_until_a_write() {
        let repo = StubPhotos::with(vec![photo(1, "lake", None)]);
        let service = service(&repo);

        service.get_all(false).await.unwrap();
        service.get_all(false).await.unwrap();
        assert_eq!(repo.reads(), 1);

        service.create("new.jpg", "fresh").await.expect("create");
        assert_eq!(service.get_all(false).await.unwrap().len(), 2);
        assert_eq!(service.get_all(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oldest_unedited_skips_edited_photos() {
        let mut first = photo(1, "lake", None);
        first.edited = true;
        let repo = StubPhotos::with(vec![first, photo(2, "hill", None), photo(3, "sea", None)]);

        let next = service(&repo)
            .get_oldest_unedited()
            .await
            .unwrap()
            .expect("queue not empty");
        assert_eq!(next.stub, "hill");
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let repo = Arc::new(StubPhotos {
            rows: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail: true,
        });
        let service = service(&repo);

        assert!(matches!(
            service.get_all(true).await,
            Err(PhotoServiceError::Repo(RepoError::Timeout))
        ));
        assert!(matches!(
            service.get_all(true).await,
            Err(PhotoServiceError::Repo(RepoError::Timeout))
        ));
        assert_eq!(repo.reads(), 2);
    }

    #[tokio::test]
    async fn updating_unknown_photo_is_not_found() {
        let repo = StubPhotos::with(Vec::new());
        let result = service(&repo)
            .update_photo(UpdatePhotoCommand {
                id: 4,
                stub: "ghost".to_string(),
                description: None,
                category_id: None,
                active: true,
                deleted: false,
            })
            .await;
        assert!(matches!(result, Err(PhotoServiceError::NotFound)));
    }
}
