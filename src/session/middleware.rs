use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use metrics::counter;
use tracing::{debug, error, warn};

use crate::application::error::HttpError;

use super::principal::{Principal, authorize};
use super::token::{IdentityTokens, TokenError};

const SOURCE: &str = "session::middleware";

/// Everything needed to resolve and re-issue identity cookies.
pub struct SessionManager {
    tokens: IdentityTokens,
    key: Key,
    cookie_name: String,
    token_ttl: Duration,
    cookie_max_age: Duration,
}

impl SessionManager {
    pub fn new(
        tokens: IdentityTokens,
        key: Key,
        cookie_name: impl Into<String>,
        token_ttl: Duration,
        cookie_max_age: Duration,
    ) -> Self {
        Self {
            tokens,
            key,
            cookie_name: cookie_name.into(),
            token_ttl,
            cookie_max_age,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn tokens(&self) -> &IdentityTokens {
        &self.tokens
    }

    /// Principal carried by the request's identity cookie, or a fresh anonymous one
    /// together with the cookie announcing it.
    fn resolve(&self, jar: &SignedCookieJar) -> (Principal, Option<Cookie<'static>>) {
        let reason = match jar.get(&self.cookie_name) {
            None => "missing",
            Some(cookie) => match self.tokens.verify(cookie.value()) {
                Ok(principal) => return (principal, None),
                Err(failure) => failure.as_str(),
            },
        };

        counter!("holmok_session_anonymous_issued_total", "reason" => reason).increment(1);
        debug!(
            target = "holmok::session",
            reason, "issuing anonymous identity"
        );

        let principal = Principal::anonymous();
        match self.issue_cookie(&principal) {
            Ok(cookie) => (principal, Some(cookie)),
            Err(err) => {
                error!(
                    target = "holmok::session",
                    error = %err,
                    "failed to sign anonymous identity; continuing without cookie"
                );
                (principal, None)
            }
        }
    }

    fn issue_cookie(&self, principal: &Principal) -> Result<Cookie<'static>, TokenError> {
        let token = self.tokens.issue(principal, self.token_ttl)?;
        let max_age = time::Duration::try_from(self.cookie_max_age)
            .unwrap_or(time::Duration::MAX);
        Ok(Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_name", &self.cookie_name)
            .field("token_ttl", &self.token_ttl)
            .field("cookie_max_age", &self.cookie_max_age)
            .finish_non_exhaustive()
    }
}

struct SessionState {
    principal: Principal,
    pending: Option<Cookie<'static>>,
}

/// Per-request identity handle.
///
/// Handlers read the resolved [`Principal`] and may replace it with
/// [`Session::set_user_token`] or [`Session::logout`]; the new cookie goes out
/// with the response.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    manager: Arc<SessionManager>,
}

impl Session {
    fn new(
        principal: Principal,
        pending: Option<Cookie<'static>>,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState { principal, pending })),
            manager,
        }
    }

    pub fn principal(&self) -> Principal {
        self.lock("principal").principal.clone()
    }

    /// Switches the request to `principal`, usually the user who just logged in.
    pub fn set_user_token(&self, principal: Principal) -> Result<(), TokenError> {
        let cookie = self.manager.issue_cookie(&principal)?;
        debug!(
            target = "holmok::session",
            kind = principal.kind(),
            username = principal.username().unwrap_or(""),
            "identity replaced"
        );
        let mut state = self.lock("set_user_token");
        state.principal = principal;
        state.pending = Some(cookie);
        Ok(())
    }

    /// Drops back to a fresh anonymous identity.
    pub fn logout(&self) -> Result<(), TokenError> {
        self.set_user_token(Principal::anonymous())
    }

    fn take_pending(&self) -> Option<Cookie<'static>> {
        self.lock("take_pending").pending.take()
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = SOURCE,
                    result = "poisoned_recovered",
                    "Recovered from poisoned session lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Resolves the identity for every request and writes re-issued tokens back.
pub async fn resolve_session(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(request.headers(), manager.key.clone());
    let (principal, pending) = manager.resolve(&jar);
    let session = Session::new(principal, pending, manager);
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;
    match session.take_pending() {
        Some(cookie) => (jar.add(cookie), response).into_response(),
        None => response,
    }
}

/// Rejects anonymous visitors with `401 Unauthorized`.
pub async fn require_user(session: Session, request: Request, next: Next) -> Response {
    if let Err(err) = authorize(&session.principal()) {
        return HttpError::from_error(SOURCE, StatusCode::UNAUTHORIZED, "Unauthorized", &err)
            .into_response();
    }
    next.run(request).await
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "session layer is not installed",
            )
        })
    }
}
