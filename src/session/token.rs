//! Signed identity tokens.
//!
//! Tokens are HS256 JWTs whose claims are the flattened [`Principal`] plus `iat`
//! and `exp`. `jsonwebtoken` checks the signature only; expiry is evaluated here
//! against an injected [`Clock`] so tests can move time.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::principal::Principal;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Source of the current time, in Unix seconds.
pub trait Clock: Send + Sync {
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    epoch_secs: AtomicI64,
}

impl ManualClock {
    pub fn at(epoch_secs: i64) -> Self {
        Self {
            epoch_secs: AtomicI64::new(epoch_secs),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.epoch_secs
            .fetch_add(duration_secs(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> i64 {
        self.epoch_secs.load(Ordering::SeqCst)
    }
}

/// Why a presented token was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("token expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token is malformed")]
    Malformed,
}

impl VerificationFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
            Self::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token secret must not be empty")]
    EmptySecret,
    #[error("failed to sign token")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

/// Signing secret that never shows up in logs.
#[derive(Clone)]
pub struct TokenSecret(String);

impl TokenSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self(secret))
    }

    fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenSecret([REDACTED, {} bytes])", self.0.len())
    }
}

#[derive(Serialize)]
struct OutgoingClaims<'a> {
    #[serde(flatten)]
    principal: &'a Principal,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(flatten)]
    principal: Principal,
    exp: i64,
}

/// Issues and verifies identity tokens with one shared secret.
#[derive(Clone)]
pub struct IdentityTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl IdentityTokens {
    pub fn new(secret: &TokenSecret, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(secret.expose()),
            decoding: DecodingKey::from_secret(secret.expose()),
            validation,
            clock,
        }
    }

    /// Signs `principal` with an expiry `ttl` from now.
    pub fn issue(&self, principal: &Principal, ttl: Duration) -> Result<String, TokenError> {
        let iat = self.clock.now_epoch_secs();
        let claims = OutgoingClaims {
            principal,
            iat,
            exp: iat.saturating_add(duration_secs(ttl)),
        };
        encode(&Header::new(ALGORITHM), &claims, &self.encoding).map_err(TokenError::Encode)
    }

    /// Returns exactly the principal that was signed, or why it cannot be trusted.
    pub fn verify(&self, token: &str) -> Result<Principal, VerificationFailure> {
        let data = decode::<serde_json::Value>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidToken | ErrorKind::MissingRequiredClaim(_) => {
                    VerificationFailure::Malformed
                }
                _ => VerificationFailure::BadSignature,
            })?;

        let claims: Claims =
            serde_json::from_value(data.claims).map_err(|_| VerificationFailure::Malformed)?;

        if claims.exp <= self.clock.now_epoch_secs() {
            return Err(VerificationFailure::Expired);
        }
        Ok(claims.principal)
    }
}

impl fmt::Debug for IdentityTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityTokens")
            .field("algorithm", &ALGORITHM)
            .finish_non_exhaustive()
    }
}

fn duration_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
