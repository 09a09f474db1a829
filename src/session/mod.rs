//! Request identity and one-shot cookie values.
//!
//! Every request passes through [`resolve_session`], which guarantees a
//! [`Principal`]; [`ephemeral_values`] then exposes flash state carried across
//! redirects. Admin routes add [`require_user`].

mod ephemeral;
mod middleware;
mod principal;
mod token;

pub use ephemeral::{
    ERROR, EphemeralError, EphemeralKey, EphemeralValues, FLASH, STATUS, ephemeral_values,
};
pub use middleware::{Session, SessionManager, require_user, resolve_session};
pub use principal::{AuthorizationError, Principal, authorize};
pub use token::{
    Clock, IdentityTokens, ManualClock, SystemClock, TokenError, TokenSecret, VerificationFailure,
};
