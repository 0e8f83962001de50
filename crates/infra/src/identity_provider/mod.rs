//! Identity provider adapter.
//!
//! The provider is an external service (credential storage, token issuance).
//! This module only describes its boundary: a one-shot read of the current
//! session, a change-notification subscription, sign-in and sign-out.
//!
//! ## Delivery semantics
//!
//! - Change events are delivered **at least once**; duplicates carry identical
//!   session content.
//! - Handlers may run while the provider holds internal locks. A handler must
//!   not call back into the provider synchronously.
//! - The result of the startup `get_current_session()` and the first change
//!   event may arrive in either order.

mod in_memory;

pub use in_memory::InMemoryIdentityProvider;

use schoolgate_core::Session;
use schoolgate_events::{AuthEvent, EventHandler, Subscription};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The identity service could not be reached. Never fatal for callers.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Email/password pair handed to the provider. The password never appears in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Boundary with the external identity service.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// One-shot read of the session the provider currently holds.
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Register a change handler. Dropping the returned handle unsubscribes.
    fn subscribe(&self, handler: EventHandler<AuthEvent>) -> Subscription;

    /// Authenticate and emit `SIGNED_IN` on success.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    /// End `session` on the provider side and emit `SIGNED_OUT`.
    ///
    /// A session the provider no longer holds (already ended, or replaced by
    /// a newer sign-in) is left alone and the call succeeds without an event.
    async fn sign_out(&self, session: &Session) -> Result<(), ProviderError>;
}
