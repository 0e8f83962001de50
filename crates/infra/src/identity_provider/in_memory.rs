use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use schoolgate_core::{AccessToken, Identity, IdentityId, Session};
use schoolgate_events::{AuthEvent, EventBus, EventHandler, InMemoryEventBus, Subscription};

use super::{Credentials, IdentityProvider, ProviderError};

#[derive(Debug)]
struct Account {
    identity: Identity,
    password: String,
}

#[derive(Debug, Default)]
struct ProviderState {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
}

/// In-memory identity provider for tests/dev.
///
/// Mirrors the behavior that matters at the boundary of a hosted provider:
/// - change events are published **while the provider lock is held**, so a
///   handler that calls back into the provider on the same stack would
///   deadlock
/// - outages can be simulated with [`InMemoryIdentityProvider::set_available`]
/// - the startup read and sign-out can be held open with latches to exercise
///   ordering races
///
/// Passwords are compared verbatim. This is not a credential store.
pub struct InMemoryIdentityProvider {
    state: Mutex<ProviderState>,
    bus: InMemoryEventBus<AuthEvent>,
    available: AtomicBool,
    session_ttl: Duration,
    startup_latch: Mutex<Option<Arc<Notify>>>,
    sign_out_latch: Mutex<Option<Arc<Notify>>>,
    sign_out_calls: AtomicUsize,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self {
            state: Mutex::new(ProviderState::default()),
            bus: InMemoryEventBus::new(),
            available: AtomicBool::new(true),
            session_ttl: Duration::hours(1),
            startup_latch: Mutex::new(None),
            sign_out_latch: Mutex::new(None),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl core::fmt::Debug for InMemoryIdentityProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryIdentityProvider")
            .field("available", &self.available.load(Ordering::SeqCst))
            .field("subscribers", &self.bus.subscriber_count())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Register an account and return its identity.
    pub fn register(&self, email: impl Into<String>, password: impl Into<String>) -> Identity {
        let identity = Identity::new(IdentityId::new(), email);
        self.register_identity(identity.clone(), password);
        identity
    }

    /// Register an account for a known identity (fixtures with stable ids).
    pub fn register_identity(&self, identity: Identity, password: impl Into<String>) {
        let mut state = lock(&self.state);
        state.accounts.insert(
            identity.email.to_lowercase(),
            Account {
                identity,
                password: password.into(),
            },
        );
    }

    /// Mint a session for `identity` without signing it in.
    pub fn issue_session(&self, identity: &Identity) -> Session {
        let now = Utc::now();
        Session::new(
            identity.clone(),
            AccessToken::new(Uuid::now_v7().simple().to_string()),
            now,
            now + self.session_ttl,
        )
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `get_current_session()` wait until the returned latch is notified.
    pub fn hold_startup(&self) -> Arc<Notify> {
        let latch = Arc::new(Notify::new());
        *lock(&self.startup_latch) = Some(Arc::clone(&latch));
        latch
    }

    /// Make the next `sign_out()` wait until the returned latch is notified.
    pub fn hold_sign_out(&self) -> Arc<Notify> {
        let latch = Arc::new(Notify::new());
        *lock(&self.sign_out_latch) = Some(Arc::clone(&latch));
        latch
    }

    /// Number of `sign_out()` calls that reached the provider.
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Publish a notification as if it originated from the hosted service
    /// (another tab, a background refresh, a duplicate delivery). The
    /// provider's own current session is left untouched.
    pub fn emit(&self, event: AuthEvent) {
        let _state = lock(&self.state);
        self.publish_locked(event);
    }

    /// End the current session as if it expired or another tab signed out.
    /// Returns whether a session was ended.
    pub fn revoke_current(&self) -> bool {
        let mut state = lock(&self.state);
        if state.current.take().is_none() {
            return false;
        }
        self.publish_locked(AuthEvent::signed_out());
        true
    }

    /// Rotate the current session's token and emit `TOKEN_REFRESHED`.
    pub fn refresh_token(&self) -> Option<Session> {
        let mut state = lock(&self.state);
        let identity = state.current.as_ref()?.identity.clone();
        let session = self.issue_session(&identity);
        state.current = Some(session.clone());
        self.publish_locked(AuthEvent::token_refreshed(session.clone()));
        Some(session)
    }

    fn ensure_available(&self, operation: &str) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!("{operation}: service unreachable")))
        }
    }

    /// Deliver while the caller still holds the provider lock.
    fn publish_locked(&self, event: AuthEvent) {
        let kind = event.kind;
        match self.bus.publish(event) {
            Ok(delivered) => tracing::debug!(%kind, delivered, "identity event dispatched"),
            Err(err) => tracing::warn!(%kind, error = %err, "identity event dropped"),
        }
    }

    async fn wait_for(latch: &Mutex<Option<Arc<Notify>>>) {
        let held = lock(latch).take();
        if let Some(latch) = held {
            latch.notified().await;
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
        Self::wait_for(&self.startup_latch).await;
        self.ensure_available("get_current_session")?;
        Ok(lock(&self.state).current.clone())
    }

    fn subscribe(&self, handler: EventHandler<AuthEvent>) -> Subscription {
        self.bus.subscribe(handler)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.ensure_available("sign_in")?;

        let mut state = lock(&self.state);
        let account = state
            .accounts
            .get(&credentials.email.to_lowercase())
            .filter(|account| account.password == credentials.password())
            .ok_or(ProviderError::InvalidCredentials)?;

        let session = self.issue_session(&account.identity);
        state.current = Some(session.clone());
        self.publish_locked(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Self::wait_for(&self.sign_out_latch).await;
        self.ensure_available("sign_out")?;

        let mut state = lock(&self.state);
        let matches = state
            .current
            .as_ref()
            .is_some_and(|current| current.access_token == session.access_token);
        if !matches {
            tracing::debug!(
                identity_id = %session.identity_id(),
                "sign-out for a session the provider no longer holds"
            );
            return Ok(());
        }
        state.current = None;
        self.publish_locked(AuthEvent::signed_out());
        Ok(())
    }
}
