use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::application::categories::CategoryServiceError;
use crate::application::error::HttpError;
use crate::application::photos::{Photo, PhotoServiceError};
use crate::domain::entities::PhotoCategoryRecord;
use crate::session::{Principal, Session};

use super::{HttpState, db_health_response};

pub(super) fn router() -> Router<HttpState> {
    Router::new()
        .route("/", get(index))
        .route("/categories", get(categories))
        .route("/categories/{stub}", get(category_detail))
        .route("/photos/{stub}", get(photo_detail))
        .route("/health/db", get(db_health))
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    authenticated: bool,
    principal: Principal,
}

#[derive(Debug, Serialize)]
struct CategoryPage {
    category: PhotoCategoryRecord,
    photos: Vec<Photo>,
}

async fn index(session: Session) -> Json<SessionSummary> {
    let principal = session.principal();
    Json(SessionSummary {
        authenticated: principal.is_authenticated(),
        principal,
    })
}

async fn categories(State(state): State<HttpState>) -> Response {
    match state.categories.get_all(true).await {
        Ok(categories) => Json(categories).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn category_detail(State(state): State<HttpState>, Path(stub): Path<String>) -> Response {
    let category = match state.categories.get_by_stub(&stub).await {
        Ok(category) if category.active && !category.deleted => category,
        Ok(_) => return HttpError::from(CategoryServiceError::NotFound).into_response(),
        Err(err) => return HttpError::from(err).into_response(),
    };

    match state.photos.get_by_category(category.id, true).await {
        Ok(photos) => Json(CategoryPage { category, photos }).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn photo_detail(State(state): State<HttpState>, Path(stub): Path<String>) -> Response {
    match state.photos.get_by_stub(&stub).await {
        Ok(Some(photo)) if photo.active && !photo.deleted => Json(photo).into_response(),
        Ok(_) => HttpError::from(PhotoServiceError::NotFound).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.health_check().await)
}
