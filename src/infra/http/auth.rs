use axum::{
    Form, Json, Router,
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::error::HttpError;
use crate::application::users::UserServiceError;
use crate::session::{ERROR, EphemeralValues, FLASH, Principal, Session};

use super::{HttpState, redirect_with};

const WELCOME: &str = "Welcome back";

pub(super) fn router() -> Router<HttpState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginPage {
    error: Option<String>,
    flash: Option<String>,
}

async fn login_page(values: EphemeralValues) -> Json<LoginPage> {
    Json(LoginPage {
        error: values.get(ERROR),
        flash: values.get(FLASH),
    })
}

async fn login(
    State(state): State<HttpState>,
    session: Session,
    values: EphemeralValues,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match state.users.get_by_login(&form.email, &form.password).await {
        Ok(user) => user,
        Err(err @ (UserServiceError::InvalidCredentials | UserServiceError::Invalid { .. })) => {
            return redirect_with(&values, ERROR, err.to_string(), "/login");
        }
        Err(err) => return HttpError::from(err).into_response(),
    };

    if let Err(err) = session.set_user_token(Principal::from(&user)) {
        return HttpError::from(err).into_response();
    }
    info!(
        target = "holmok::http::auth",
        user_id = user.id,
        username = %user.username,
        "user logged in"
    );
    redirect_with(&values, FLASH, WELCOME, "/admin")
}

async fn logout(session: Session) -> Response {
    match session.logout() {
        Ok(()) => Redirect::to("/").into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
