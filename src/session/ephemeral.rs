//! One-shot values carried across a redirect in signed cookies.
//!
//! A handler stores a value before redirecting; the handler serving the next
//! request reads it once, which clears it from the in-request mirror and
//! schedules the cookie for removal.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::error::HttpError;

use super::middleware::SessionManager;

const SOURCE: &str = "session::ephemeral";

/// Cookie name bound to the type stored under it.
pub struct EphemeralKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> EphemeralKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for EphemeralKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EphemeralKey<T> {}

pub const FLASH: EphemeralKey<String> = EphemeralKey::new("flash");
pub const ERROR: EphemeralKey<String> = EphemeralKey::new("error");
pub const STATUS: EphemeralKey<String> = EphemeralKey::new("status");

#[derive(Debug, Error)]
pub enum EphemeralError {
    #[error("failed to encode ephemeral value `{key}`")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

struct EphemeralState {
    jar: SignedCookieJar,
    // `Some` holds a value set during this request, `None` marks a consumed key.
    mirror: HashMap<&'static str, Option<String>>,
}

/// Per-request handle to the ephemeral store.
#[derive(Clone)]
pub struct EphemeralValues {
    state: Arc<Mutex<EphemeralState>>,
}

impl EphemeralValues {
    pub fn new(jar: SignedCookieJar) -> Self {
        Self {
            state: Arc::new(Mutex::new(EphemeralState {
                jar,
                mirror: HashMap::new(),
            })),
        }
    }

    pub fn set<T: Serialize>(&self, key: EphemeralKey<T>, value: &T) -> Result<(), EphemeralError> {
        let json = serde_json::to_vec(value).map_err(|source| EphemeralError::Encode {
            key: key.name,
            source,
        })?;
        let encoded = URL_SAFE_NO_PAD.encode(json);

        let mut state = self.lock("set");
        state.jar = state.jar.clone().add(value_cookie(key.name, encoded.clone()));
        state.mirror.insert(key.name, Some(encoded));
        Ok(())
    }

    /// Reads and consumes the value stored under `key`.
    ///
    /// Corrupt payloads count as absent but are still cleared.
    pub fn get<T: DeserializeOwned>(&self, key: EphemeralKey<T>) -> Option<T> {
        let mut state = self.lock("get");
        let encoded = match state.mirror.get(key.name) {
            Some(Some(encoded)) => encoded.clone(),
            Some(None) => return None,
            None => state.jar.get(key.name)?.value().to_owned(),
        };

        state.mirror.insert(key.name, None);
        state.jar = state.jar.clone().remove(removal_cookie(key.name));
        drop(state);

        match decode_value(&encoded) {
            Ok(value) => Some(value),
            Err(reason) => {
                debug!(
                    target = "holmok::session::ephemeral",
                    key = key.name,
                    reason,
                    "discarding undecodable ephemeral value"
                );
                None
            }
        }
    }

    fn into_jar(self) -> SignedCookieJar {
        self.lock("into_jar").jar.clone()
    }

    fn lock(&self, op: &'static str) -> std::sync::MutexGuard<'_, EphemeralState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = SOURCE,
                    result = "poisoned_recovered",
                    "Recovered from poisoned ephemeral store lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

fn decode_value<T: DeserializeOwned>(encoded: &str) -> Result<T, &'static str> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| "invalid base64")?;
    serde_json::from_slice(&bytes).map_err(|_| "invalid json")
}

fn value_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Exposes [`EphemeralValues`] to handlers and writes its cookie changes back.
pub async fn ephemeral_values(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(request.headers(), manager.key().clone());
    let values = EphemeralValues::new(jar);
    request.extensions_mut().insert(values.clone());

    let response = next.run(request).await;
    (values.into_jar(), response).into_response()
}

impl<S> FromRequestParts<S> for EphemeralValues
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
                "ephemeral value layer is not installed",
            )
        })
    }
}
