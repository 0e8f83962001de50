//! Authenticated identity and the provider-issued session wrapping it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DomainError, DomainResult, IdentityId};

/// The provider-authenticated actor, independent of any tenant or role.
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
}

impl Identity {
    pub fn new(id: IdentityId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }

    /// Like [`Identity::new`], but rejects an email without a local part and a domain.
    pub fn parse(id: IdentityId, email: impl Into<String>) -> DomainResult<Self> {
        let email = email.into().trim().to_string();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(Self::new(id, email))
            }
            _ => Err(DomainError::validation(format!("malformed email '{email}'"))),
        }
    }
}

/// Opaque credential token issued by the identity provider.
///
/// The value never appears in `Debug` output or serialized snapshots.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// An identity plus the credential the provider issued for it.
///
/// Sessions are never mutated in place: every provider event replaces the
/// whole value. Serialization is one-way: the token is never written out, so
/// a snapshot cannot be turned back into a usable session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity: Identity,

    #[serde(skip_serializing)]
    pub access_token: AccessToken,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("session has expired")]
    Expired,

    #[error("session not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid session time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl Session {
    pub fn new(
        identity: Identity,
        access_token: AccessToken,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity,
            access_token,
            issued_at,
            expires_at,
        }
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Deterministically validate the session's time window.
    ///
    /// Token signatures are the provider's business; this only checks the
    /// window the provider reported.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), SessionValidationError> {
        if self.expires_at <= self.issued_at {
            return Err(SessionValidationError::InvalidTimeWindow);
        }
        if now < self.issued_at {
            return Err(SessionValidationError::NotYetValid);
        }
        if self.is_expired(now) {
            return Err(SessionValidationError::Expired);
        }
        Ok(())
    }
}
