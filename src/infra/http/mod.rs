mod admin;
mod auth;
mod middleware;
mod public;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Redirect, Response};

use crate::application::categories::{CategoryServiceError, PhotoCategoryService};
use crate::application::error::{ErrorReport, HttpError};
use crate::application::photos::{PhotoService, PhotoServiceError};
use crate::application::repos::{HealthRepo, RepoError};
use crate::application::users::{UserService, UserServiceError};
use crate::session::{
    EphemeralError, EphemeralKey, EphemeralValues, SessionManager, TokenError, ephemeral_values,
    require_user, resolve_session,
};

use self::middleware::{log_responses, set_request_context};

pub use self::middleware::RequestContext;

/// Services shared by every handler.
#[derive(Clone)]
pub struct HttpState {
    pub categories: Arc<PhotoCategoryService>,
    pub photos: Arc<PhotoService>,
    pub users: Arc<UserService>,
    pub health: Arc<dyn HealthRepo>,
}

/// Full application router.
///
/// Identity resolution runs outermost so every layer below it, including
/// response logging, sees the request's principal.
pub fn build_router(state: HttpState, sessions: Arc<SessionManager>) -> Router {
    let admin = admin::router().route_layer(from_fn(require_user));

    Router::new()
        .merge(public::router())
        .merge(auth::router())
        .nest("/admin", admin)
        .fallback(not_found)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .layer(from_fn_with_state(sessions.clone(), ephemeral_values))
        .layer(from_fn_with_state(sessions, resolve_session))
}

async fn not_found() -> Response {
    HttpError::new(
        "infra::http::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
    .into_response()
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Stores a one-shot message and redirects to `to`.
fn redirect_with(
    values: &EphemeralValues,
    key: EphemeralKey<String>,
    message: impl Into<String>,
    to: &str,
) -> Response {
    match values.set(key, &message.into()) {
        Ok(()) => Redirect::to(to).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

impl From<CategoryServiceError> for HttpError {
    fn from(err: CategoryServiceError) -> Self {
        const SOURCE: &str = "application::categories";
        match err {
            CategoryServiceError::Repo(repo) => repo_error_to_http(SOURCE, repo),
            CategoryServiceError::NotFound => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Category not found", &err)
            }
            CategoryServiceError::StubAlreadyExists => HttpError::from_error(
                SOURCE,
                StatusCode::CONFLICT,
                "Category stub already exists",
                &err,
            ),
            CategoryServiceError::Invalid { .. } => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid input", &err)
            }
        }
    }
}

impl From<PhotoServiceError> for HttpError {
    fn from(err: PhotoServiceError) -> Self {
        const SOURCE: &str = "application::photos";
        match err {
            PhotoServiceError::Repo(repo) => repo_error_to_http(SOURCE, repo),
            PhotoServiceError::NotFound => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Photo not found", &err)
            }
            PhotoServiceError::StubAlreadyExists => HttpError::from_error(
                SOURCE,
                StatusCode::CONFLICT,
                "Photo stub already exists",
                &err,
            ),
            PhotoServiceError::Invalid { .. } => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid input", &err)
            }
        }
    }
}

impl From<UserServiceError> for HttpError {
    fn from(err: UserServiceError) -> Self {
        const SOURCE: &str = "application::users";
        match err {
            UserServiceError::Repo(repo) => repo_error_to_http(SOURCE, repo),
            UserServiceError::InvalidCredentials => {
                HttpError::from_error(SOURCE, StatusCode::UNAUTHORIZED, "Unauthorized", &err)
            }
            UserServiceError::NotFound => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "User not found", &err)
            }
            UserServiceError::AlreadyExists => {
                HttpError::from_error(SOURCE, StatusCode::CONFLICT, "User already exists", &err)
            }
            UserServiceError::Invalid { .. } => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid input", &err)
            }
        }
    }
}

impl From<TokenError> for HttpError {
    fn from(err: TokenError) -> Self {
        HttpError::from_error(
            "session::token",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
    }
}

impl From<EphemeralError> for HttpError {
    fn from(err: EphemeralError) -> Self {
        HttpError::from_error(
            "session::ephemeral",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
    }
}
