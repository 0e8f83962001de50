//! Process-wide session store.
//!
//! The store owns the only live [`SessionState`] and is its single writer.
//! Every input (startup read, provider events, `sign_out`, `refresh`,
//! finished role resolutions) is funnelled through one update path,
//! [`watch::Sender::send_if_modified`], so readers always observe whole
//! transitions.
//!
//! ## Scheduling
//!
//! Provider handlers run on the provider's call stack, possibly under its
//! locks. The handler therefore only applies the synchronous part of a
//! transition; role resolution and the provider sign-out call are handed to
//! the runtime with `spawn` and run on a later scheduler turn. Spawned work
//! holds a `Weak` reference to the store, so it never keeps a dropped store
//! alive.
//!
//! ## Teardown
//!
//! The provider subscription lives inside the store. It is released when the
//! last clone is dropped or when [`SessionStore::shutdown`] is called,
//! whichever comes first.

mod signal;

pub use signal::NavigationSignal;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use schoolgate_auth::{
    AccessDecision, GateExplanation, PermissionRequirement, ResolutionTicket, SessionEffect,
    SessionInput, SessionState, evaluate, explain,
};
use schoolgate_core::{IdentityId, Session};
use schoolgate_events::{AuthEvent, Subscription};

use crate::config::SessionStoreConfig;
use crate::identity_provider::IdentityProvider;
use crate::membership::{MembershipStore, RoleResolver};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("the session store must be started from within a tokio runtime")]
    NoRuntime,
}

struct StoreInner {
    state: watch::Sender<SessionState>,
    navigation: broadcast::Sender<NavigationSignal>,
    provider: Arc<dyn IdentityProvider>,
    resolver: RoleResolver,
    runtime: Handle,
    subscription: Mutex<Option<Subscription>>,
}

/// Handle to the session store. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("SessionStore")
            .field("lifecycle", &state.lifecycle())
            .field("identity_id", &state.identity_id())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl SessionStore {
    /// Subscribe to the provider and kick off the startup session read.
    ///
    /// The subscription is registered before the read starts, so no event can
    /// fall between the two. Either may be applied first.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        memberships: Arc<dyn MembershipStore>,
        config: SessionStoreConfig,
    ) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (state, _) = watch::channel(SessionState::initializing());
        let (navigation, _) = broadcast::channel(config.navigation_buffer.max(1));
        let resolver = RoleResolver::new(memberships).with_retry(config.resolver_retry);

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let handler_ref = weak.clone();
            let subscription = provider.subscribe(Arc::new(move |event: &AuthEvent| {
                let Some(inner) = handler_ref.upgrade() else {
                    return;
                };
                if admit_event(event) {
                    dispatch(&inner, SessionInput::Provider(event.clone()));
                }
            }));

            StoreInner {
                state,
                navigation,
                provider: Arc::clone(&provider),
                resolver,
                runtime: runtime.clone(),
                subscription: Mutex::new(Some(subscription)),
            }
        });

        let store_ref = Arc::downgrade(&inner);
        runtime.spawn(async move {
            let session = load_initial_session(provider.as_ref()).await;
            if let Some(inner) = store_ref.upgrade() {
                dispatch(&inner, SessionInput::InitialSession(session));
            }
        });

        info!("session store started");
        Ok(Self { inner })
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Always-current view of the state; `changed()` fires on every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Navigation signals emitted from now on.
    pub fn navigation(&self) -> broadcast::Receiver<NavigationSignal> {
        self.inner.navigation.subscribe()
    }

    /// Gate a view on the current state.
    pub fn evaluate(&self, requirement: &PermissionRequirement) -> AccessDecision {
        evaluate(&self.inner.state.borrow(), requirement)
    }

    pub fn explain(&self, requirement: &PermissionRequirement) -> GateExplanation {
        explain(&self.inner.state.borrow(), requirement)
    }

    /// Sign out locally right away and ask the provider to follow in the
    /// background.
    ///
    /// Returns `false` when the store was already signed out. The provider
    /// call's outcome never changes local state.
    pub fn sign_out(&self) -> bool {
        dispatch(&self.inner, SessionInput::SignOut)
    }

    /// Re-resolve the current identity's role. Returns `false` without an identity.
    pub fn refresh(&self) -> bool {
        dispatch(&self.inner, SessionInput::Refresh)
    }

    /// Wait until the store is `ready` or `signed_out` with nothing in flight.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(SessionState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Stop listening to the provider. The last state stays readable.
    pub fn shutdown(&self) {
        let subscription = lock(&self.inner.subscription).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            info!("session store detached from identity provider");
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.subscription).is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn input_label(input: &SessionInput) -> &'static str {
    match input {
        SessionInput::InitialSession(_) => "initial_session",
        SessionInput::Provider(event) => event.kind.as_str(),
        SessionInput::SignOut => "sign_out",
        SessionInput::Refresh => "refresh",
        SessionInput::Resolved { .. } => "resolved",
    }
}

/// The single update path. Returns whether the input was applied.
fn dispatch(inner: &Arc<StoreInner>, input: SessionInput) -> bool {
    let label = input_label(&input);
    let mut outcome = None;

    inner.state.send_if_modified(|state| {
        let before = state.lifecycle();
        let result = state.apply(input);
        let applied = result.is_ok();
        outcome = Some((before, state.lifecycle(), state.identity_id(), result));
        applied
    });

    let Some((before, after, identity_id, result)) = outcome else {
        return false;
    };

    match result {
        Ok(effects) => {
            if before != after {
                info!(input = label, from = %before, to = %after, identity_id = ?identity_id, "session lifecycle changed");
            } else {
                debug!(input = label, lifecycle = %after, identity_id = ?identity_id, "session input applied");
            }
            for effect in effects {
                run_effect(inner, effect);
            }
            true
        }
        Err(discarded) => {
            debug!(input = label, reason = %discarded, "session input discarded");
            false
        }
    }
}

fn run_effect(inner: &Arc<StoreInner>, effect: SessionEffect) {
    match effect {
        SessionEffect::ScheduleResolution {
            identity_id,
            ticket,
        } => schedule_resolution(inner, identity_id, ticket),
        SessionEffect::LeaveProtectedView(reason) => {
            let signal = NavigationSignal::LeaveProtectedView { reason };
            if inner.navigation.send(signal).is_err() {
                debug!(?reason, "no view listening for navigation signals");
            }
        }
        SessionEffect::ProviderSignOut(session) => {
            let provider = Arc::clone(&inner.provider);
            inner.runtime.spawn(async move {
                let identity_id = session.identity_id();
                match provider.sign_out(&session).await {
                    Ok(()) => debug!(%identity_id, "provider sign-out completed"),
                    Err(err) => warn!(%identity_id, error = %err, "provider sign-out failed; signed out locally only"),
                }
            });
        }
    }
}

fn schedule_resolution(inner: &Arc<StoreInner>, identity_id: IdentityId, ticket: ResolutionTicket) {
    debug!(%identity_id, %ticket, "role resolution scheduled");
    let resolver = inner.resolver.clone();
    let store_ref = Arc::downgrade(inner);

    inner.runtime.spawn(async move {
        let assignment = match resolver.resolve_with_retry(identity_id).await {
            Ok(assignment) => assignment,
            Err(err) => {
                warn!(%identity_id, %ticket, error = %err, "role resolution failed; continuing without a role");
                None
            }
        };
        if let Some(inner) = store_ref.upgrade() {
            dispatch(
                &inner,
                SessionInput::Resolved {
                    identity_id,
                    ticket,
                    assignment,
                },
            );
        }
    });
}

/// Provider events are held to the same time-window check as the startup read.
fn admit_event(event: &AuthEvent) -> bool {
    let Some(session) = &event.session else {
        return true;
    };
    match session.validate(Utc::now()) {
        Ok(()) => true,
        Err(err) => {
            info!(kind = %event.kind, identity_id = %session.identity_id(), reason = %err, "ignoring provider event with an unusable session");
            false
        }
    }
}

/// Startup read. Anything other than a live session means "no session".
async fn load_initial_session(provider: &dyn IdentityProvider) -> Option<Session> {
    match provider.get_current_session().await {
        Ok(Some(session)) => match session.validate(Utc::now()) {
            Ok(()) => Some(session),
            Err(err) => {
                info!(identity_id = %session.identity_id(), reason = %err, "ignoring stored session");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, "could not read the current session; starting signed out");
            None
        }
    }
}
