use axum::{
    Form, Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::categories::{
    CategoryServiceError, CreateCategoryCommand, UpdateCategoryCommand,
};
use crate::application::error::HttpError;
use crate::application::photos::{Photo, PhotoServiceError, UpdatePhotoCommand};
use crate::session::{ERROR, EphemeralValues, FLASH, Session};

use super::{HttpState, redirect_with};

const CATEGORIES_PATH: &str = "/admin/categories";
const PHOTOS_PATH: &str = "/admin/photos";

pub(super) fn router() -> Router<HttpState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", post(update_category))
        .route("/photos", get(list_photos))
        .route("/photos/next", get(next_photo))
        .route("/photos/{id}", post(update_photo))
        .route("/cache/clear", post(clear_cache))
}

#[derive(Debug, Serialize)]
struct Dashboard {
    username: Option<String>,
    flash: Option<String>,
}

#[derive(Debug, Serialize)]
struct Listing<T> {
    flash: Option<String>,
    error: Option<String>,
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct NextPhoto {
    photo: Option<Photo>,
}

#[derive(Debug, Deserialize)]
struct CreateCategoryForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    stub: String,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateCategoryForm {
    name: Option<String>,
    stub: Option<String>,
    description: Option<String>,
    photo_id: Option<i64>,
    active: Option<bool>,
    deleted: Option<bool>,
}

/// Unchecked boxes are absent from the form, so both flags default to false.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdatePhotoForm {
    stub: String,
    description: Option<String>,
    category_id: Option<i64>,
    active: bool,
    deleted: bool,
}

async fn dashboard(session: Session, values: EphemeralValues) -> Json<Dashboard> {
    Json(Dashboard {
        username: session.principal().username().map(str::to_string),
        flash: values.get(FLASH),
    })
}

async fn list_categories(State(state): State<HttpState>, values: EphemeralValues) -> Response {
    match state.categories.get_all(false).await {
        Ok(items) => listing(&values, items),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn create_category(
    State(state): State<HttpState>,
    values: EphemeralValues,
    Form(form): Form<CreateCategoryForm>,
) -> Response {
    let command = CreateCategoryCommand {
        name: form.name,
        stub: form.stub,
        description: form.description,
    };
    match state.categories.create(command).await {
        Ok(created) => {
            info!(
                target = "holmok::http::admin",
                id = created.id,
                stub = %created.stub,
                "category created"
            );
            redirect_with(&values, FLASH, "Category created", CATEGORIES_PATH)
        }
        Err(
            err @ (CategoryServiceError::Invalid { .. } | CategoryServiceError::StubAlreadyExists),
        ) => redirect_with(&values, ERROR, err.to_string(), CATEGORIES_PATH),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn update_category(
    State(state): State<HttpState>,
    values: EphemeralValues,
    Path(id): Path<i64>,
    Form(form): Form<UpdateCategoryForm>,
) -> Response {
    let command = UpdateCategoryCommand {
        id,
        name: form.name,
        stub: form.stub,
        description: form.description,
        photo_id: form.photo_id,
        active: form.active,
        deleted: form.deleted,
    };
    match state.categories.update(command).await {
        Ok(updated) => {
            info!(
                target = "holmok::http::admin",
                id = updated.id,
                "category updated"
            );
            redirect_with(&values, FLASH, "Category updated", CATEGORIES_PATH)
        }
        Err(
            err @ (CategoryServiceError::Invalid { .. } | CategoryServiceError::StubAlreadyExists),
        ) => redirect_with(&values, ERROR, err.to_string(), CATEGORIES_PATH),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn list_photos(State(state): State<HttpState>, values: EphemeralValues) -> Response {
    match state.photos.get_all(false).await {
        Ok(items) => listing(&values, items),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn next_photo(State(state): State<HttpState>) -> Response {
    match state.photos.get_oldest_unedited().await {
        Ok(photo) => Json(NextPhoto { photo }).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn update_photo(
    State(state): State<HttpState>,
    values: EphemeralValues,
    Path(id): Path<i64>,
    Form(form): Form<UpdatePhotoForm>,
) -> Response {
    let command = UpdatePhotoCommand {
        id,
        stub: form.stub,
        description: form.description,
        category_id: form.category_id,
        active: form.active,
        deleted: form.deleted,
    };
    match state.photos.update_photo(command).await {
        Ok(updated) => {
            info!(
                target = "holmok::http::admin",
                id = updated.id,
                "photo updated"
            );
            redirect_with(&values, FLASH, "Photo updated", PHOTOS_PATH)
        }
        Err(err @ (PhotoServiceError::Invalid { .. } | PhotoServiceError::StubAlreadyExists)) => {
            redirect_with(&values, ERROR, err.to_string(), PHOTOS_PATH)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn clear_cache(State(state): State<HttpState>, values: EphemeralValues) -> Response {
    state.categories.clear_cache();
    state.photos.clear_cache();
    info!(target = "holmok::http::admin", "service caches cleared");
    redirect_with(&values, FLASH, "Cache cleared", "/admin")
}

fn listing<T: Serialize>(values: &EphemeralValues, items: Vec<T>) -> Response {
    Json(Listing {
        flash: values.get(FLASH),
        error: values.get(ERROR),
        items,
    })
    .into_response()
}
