use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolgate_core::{IdentityId, Session};

/// Kind of identity change reported by the provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventKind::SignedIn => "SIGNED_IN",
            AuthEventKind::SignedOut => "SIGNED_OUT",
            AuthEventKind::TokenRefreshed => "TOKEN_REFRESHED",
        }
    }
}

impl core::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification from the identity provider.
///
/// Delivery is at-least-once: the same event (identical session content) may
/// arrive more than once and consumers must treat repeats as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,

    /// Session carried by the event. Always `None` for `SIGNED_OUT`.
    pub session: Option<Session>,

    pub occurred_at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self::with_session(AuthEventKind::SignedIn, session)
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self::with_session(AuthEventKind::TokenRefreshed, session)
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
            occurred_at: Utc::now(),
        }
    }

    fn with_session(kind: AuthEventKind, session: Session) -> Self {
        Self {
            kind,
            session: Some(session),
            occurred_at: Utc::now(),
        }
    }

    /// Identity carried by the event, if any.
    pub fn identity_id(&self) -> Option<IdentityId> {
        self.session.as_ref().map(Session::identity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use schoolgate_core::{AccessToken, Identity};

    #[test]
    fn kinds_use_provider_wire_names() {
        let json = serde_json::to_string(&AuthEventKind::TokenRefreshed).unwrap();
        assert_eq!(json, "\"TOKEN_REFRESHED\"");
        assert_eq!(AuthEventKind::SignedIn.to_string(), "SIGNED_IN");
    }

    #[test]
    fn signed_out_carries_no_session() {
        let event = AuthEvent::signed_out();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.identity_id().is_none());

        let now = Utc::now();
        let id = IdentityId::new();
        let session = Session::new(
            Identity::new(id, "parent@school.test"),
            AccessToken::new("t"),
            now,
            now + Duration::hours(1),
        );
        assert_eq!(AuthEvent::signed_in(session).identity_id(), Some(id));
    }
}
