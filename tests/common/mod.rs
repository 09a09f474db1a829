#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Method, Request, Response, StatusCode};
use axum_extra::extract::cookie::{Cookie, Key};
use holmok::application::categories::PhotoCategoryService;
use holmok::application::photos::PhotoService;
use holmok::application::repos::{
    CreateCategoryParams, CreatePhotoParams, CreateUserParams, HealthRepo, PhotoCategoriesRepo,
    PhotoCategoriesWriteRepo, PhotosRepo, PhotosWriteRepo, RepoError, UpdateCategoryParams,
    UpdatePhotoParams, UsersRepo, UsersWriteRepo,
};
use holmok::application::users::{UserService, hash_password};
use holmok::cache::CacheConfig;
use holmok::domain::entities::{PhotoCategoryRecord, PhotoRecord, UserRecord};
use holmok::infra::http::{HttpState, build_router};
use holmok::session::{IdentityTokens, ManualClock, SessionManager, TokenSecret};
use http_body_util::BodyExt;
use serde_json::Value;
use time::macros::datetime;
use tower::ServiceExt;

pub const COOKIE_NAME: &str = "_holmok";
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const ADMIN_EMAIL: &str = "ada@example.com";
pub const ADMIN_PASSWORD: &str = "analytical-engine";

/// In-memory rows plus read counters, standing in for Postgres.
#[derive(Default)]
pub struct MemoryStore {
    categories: Mutex<Vec<PhotoCategoryRecord>>,
    photos: Mutex<Vec<PhotoRecord>>,
    users: Mutex<Vec<UserRecord>>,
    pub category_reads: AtomicUsize,
    pub photo_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn seeded() -> Self {
        let store = Self::default();
        store.categories.lock().unwrap().extend([
            category(1, "landscapes", "Landscapes", true),
            category(2, "drafts", "Drafts", false),
        ]);
        store.photos.lock().unwrap().extend([
            photo(10, "lake", "lake at dawn.jpg", Some(1), true, true),
            photo(11, "hidden", "hidden.jpg", Some(1), false, false),
        ]);
        store.users.lock().unwrap().push(UserRecord {
            id: 7,
            username: "ada".to_string(),
            stub: "ada-stub".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password_hash: hash_password(ADMIN_PASSWORD),
            active: true,
            deleted: false,
            created_at: datetime!(2021-03-04 05:06:07 UTC),
        });
        store
    }

    pub fn category_reads(&self) -> usize {
        self.category_reads.load(Ordering::SeqCst)
    }

    pub fn photo_reads(&self) -> usize {
        self.photo_reads.load(Ordering::SeqCst)
    }

    fn read_categories(&self) -> Vec<PhotoCategoryRecord> {
        self.category_reads.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.categories.lock().unwrap().clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    fn read_photos(&self) -> Vec<PhotoRecord> {
        self.photo_reads.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.photos.lock().unwrap().clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

pub fn category(id: i64, stub: &str, name: &str, active: bool) -> PhotoCategoryRecord {
    PhotoCategoryRecord {
        id,
        stub: stub.to_string(),
        name: name.to_string(),
        description: None,
        photo_id: None,
        active,
        deleted: false,
        created_at: datetime!(2022-01-01 00:00 UTC),
    }
}

pub fn photo(
    id: i64,
    stub: &str,
    name: &str,
    category_id: Option<i64>,
    active: bool,
    edited: bool,
) -> PhotoRecord {
    PhotoRecord {
        id,
        stub: stub.to_string(),
        name: name.to_string(),
        description: None,
        category_id,
        active,
        deleted: false,
        edited,
        created_at: datetime!(2022-01-01 00:00 UTC) + time::Duration::days(id),
    }
}

#[async_trait]
impl PhotoCategoriesRepo for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError> {
        Ok(self.read_categories())
    }

    async fn list_public_categories(&self) -> Result<Vec<PhotoCategoryRecord>, RepoError> {
        Ok(self
            .read_categories()
            .into_iter()
            .filter(|row| row.active && !row.deleted)
            .collect())
    }

    async fn find_category_by_id(
        &self,
        id: i64,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        Ok(self.read_categories().into_iter().find(|row| row.id == id))
    }

    async fn find_category_by_stub(
        &self,
        stub: &str,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        Ok(self
            .read_categories()
            .into_iter()
            .find(|row| row.stub == stub && !row.deleted))
    }
}

#[async_trait]
impl PhotoCategoriesWriteRepo for MemoryStore {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<PhotoCategoryRecord, RepoError> {
        let mut rows = self.categories.lock().unwrap();
        if rows.iter().any(|row| row.stub == params.stub) {
            return Err(RepoError::Duplicate {
                constraint: "photo_categories_stub_key".to_string(),
            });
        }
        let id = rows.iter().map(|row| row.id).max().unwrap_or(0) + 1;
        let mut created = category(id, &params.stub, &params.name, false);
        created.description = params.description;
        rows.push(created.clone());
        Ok(created)
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<Option<PhotoCategoryRecord>, RepoError> {
        let mut rows = self.categories.lock().unwrap();
        if rows
            .iter()
            .any(|row| row.stub == params.stub && row.id != params.id)
        {
            return Err(RepoError::Duplicate {
                constraint: "photo_categories_stub_key".to_string(),
            });
        }
        let Some(row) = rows.iter_mut().find(|row| row.id == params.id) else {
            return Ok(None);
        };
        row.stub = params.stub;
        row.name = params.name;
        row.description = params.description;
        row.photo_id = params.photo_id;
        row.active = params.active;
        row.deleted = params.deleted;
        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl PhotosRepo for MemoryStore {
    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
        Ok(self.read_photos())
    }

    async fn list_public_photos(&self) -> Result<Vec<PhotoRecord>, RepoError> {
        Ok(self
            .read_photos()
            .into_iter()
            .filter(PhotoRecord::is_public)
            .collect())
    }

    async fn list_photos_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PhotoRecord>, RepoError> {
        Ok(self
            .read_photos()
            .into_iter()
            .filter(|row| row.category_id == Some(category_id))
            .collect())
    }

    async fn list_public_photos_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PhotoRecord>, RepoError> {
        Ok(self
            .read_photos()
            .into_iter()
            .filter(|row| row.category_id == Some(category_id) && row.is_public())
            .collect())
    }

    async fn find_photo_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError> {
        Ok(self.read_photos().into_iter().find(|row| row.id == id))
    }

    async fn find_photo_by_stub(&self, stub: &str) -> Result<Option<PhotoRecord>, RepoError> {
        Ok(self
            .read_photos()
            .into_iter()
            .find(|row| row.stub == stub && !row.deleted))
    }

    async fn find_oldest_unedited(&self) -> Result<Option<PhotoRecord>, RepoError> {
        Ok(self
            .read_photos()
            .into_iter()
            .filter(|row| !row.edited && !row.deleted)
            .min_by_key(|row| row.created_at))
    }
}

#[async_trait]
impl PhotosWriteRepo for MemoryStore {
    async fn create_photo(&self, params: CreatePhotoParams) -> Result<PhotoRecord, RepoError> {
        let mut rows = self.photos.lock().unwrap();
        let id = rows.iter().map(|row| row.id).max().unwrap_or(0) + 1;
        let mut created = photo(id, &params.stub, &params.name, None, false, false);
        created.description = params.description;
        rows.push(created.clone());
        Ok(created)
    }

    async fn update_photo(
        &self,
        params: UpdatePhotoParams,
    ) -> Result<Option<PhotoRecord>, RepoError> {
        let mut rows = self.photos.lock().unwrap();
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

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let rows = self.users.lock().unwrap();
        Ok(rows.iter().find(|row| row.id == id && !row.deleted).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let rows = self.users.lock().unwrap();
        Ok(rows
            .iter()
            .find(|row| row.email == email && !row.deleted)
            .cloned())
    }
}

#[async_trait]
impl UsersWriteRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut rows = self.users.lock().unwrap();
        let id = rows.iter().map(|row| row.id).max().unwrap_or(0) + 1;
        let created = UserRecord {
            id,
            username: params.username,
            stub: params.stub,
            email: params.email,
            password_hash: params.password_hash,
            active: false,
            deleted: false,
            created_at: datetime!(2024-01-01 00:00 UTC),
        };
        rows.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::seeded());
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let cache_config = CacheConfig::default();

        let state = HttpState {
            categories: Arc::new(PhotoCategoryService::new(
                store.clone(),
                store.clone(),
                PhotoCategoryService::caches_for(&cache_config),
            )),
            photos: Arc::new(PhotoService::new(
                store.clone(),
                store.clone(),
                PhotoService::caches_for(&cache_config),
            )),
            users: Arc::new(UserService::new(store.clone(), store.clone())),
            health: store.clone(),
        };

        let secret = TokenSecret::new("integration-test-secret").expect("secret");
        let sessions = Arc::new(SessionManager::new(
            IdentityTokens::new(&secret, clock.clone()),
            Key::from(&[42u8; 64][..]),
            COOKIE_NAME,
            TOKEN_TTL,
            TOKEN_TTL * 7,
        ));

        Self {
            router: build_router(state, sessions),
            store,
            clock,
        }
    }

    pub fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookies: HashMap::new(),
        }
    }
}

/// Carries cookies between requests the way a browser would.
pub struct Browser {
    router: Router,
    pub cookies: HashMap<String, String>,
}

pub struct Reply {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookies: Vec<Cookie<'static>>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn sets_cookie(&self, name: &str) -> bool {
        self.set_cookies
            .iter()
            .any(|cookie| cookie.name() == name && !cookie.value().is_empty())
    }
}

impl Browser {
    pub async fn get(&mut self, uri: &str) -> Reply {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &str) -> Reply {
        self.send(Method::POST, uri, Some(form.to_string())).await
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    async fn send(&mut self, method: Method, uri: &str, form: Option<String>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form)
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        self.absorb(response).await
    }

    async fn absorb(&mut self, response: Response<Body>) -> Reply {
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let set_cookies: Vec<Cookie<'static>> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_owned()).ok())
            .collect();

        for cookie in &set_cookies {
            if cookie.value().is_empty() {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }

        let body = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes()
            .to_vec();

        Reply {
            status,
            location,
            set_cookies,
            body,
        }
    }
}

/// Logs in as the seeded user and consumes the welcome flash.
pub async fn logged_in(app: &TestApp) -> Browser {
    let mut browser = app.browser();
    let form = format!("email={ADMIN_EMAIL}&password={ADMIN_PASSWORD}");
    let reply = browser.post_form("/login", &form).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/admin"));

    let dashboard = browser.get("/admin").await;
    assert_eq!(dashboard.status, StatusCode::OK);
    assert_eq!(dashboard.json()["flash"], "Welcome back");
    browser
}
