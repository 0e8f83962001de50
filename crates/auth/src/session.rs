//! Session lifecycle state machine.
//!
//! `SessionState` is the snapshot every screen reads: `{session, identity,
//! role assignment, lifecycle}`. All transitions go through
//! [`SessionState::apply`], which is deterministic and performs no IO. It
//! returns the side effects the owner has to carry out (schedule a role
//! resolution, tell views to navigate away, call the provider's sign-out).
//!
//! Only the session store owns the live instance; everyone else receives
//! clones, so mutating a copy never reaches other readers.

use serde::Serialize;
use thiserror::Error;

use schoolgate_core::{Identity, IdentityId, Session};
use schoolgate_events::{AuthEvent, AuthEventKind};

use crate::RoleAssignment;

/// Top-level state of the session store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Initializing,
    Authenticating,
    Ready,
    SignedOut,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Initializing => "initializing",
            Lifecycle::Authenticating => "authenticating",
            Lifecycle::Ready => "ready",
            Lifecycle::SignedOut => "signed_out",
        }
    }

    /// Whether the role assignment is still being worked out.
    pub fn is_pending(&self) -> bool {
        matches!(self, Lifecycle::Initializing | Lifecycle::Authenticating)
    }
}

impl core::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token identifying one scheduled role resolution.
///
/// A resolution result is only applied if its ticket is still the latest one
/// issued for the current identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResolutionTicket(u64);

impl ResolutionTicket {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ResolutionTicket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a reader may conclude about the role.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoleView<'a> {
    /// Resolution has not finished; this is not the same as "no role".
    Unknown,
    /// Resolution finished (or the actor is signed out) and no usable role exists.
    Absent,
    Assigned(&'a RoleAssignment),
}

/// Why protected views are being told to navigate away.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// The application called `sign_out`.
    SignOut,
    /// The provider reported `SIGNED_OUT` (expiry, revocation, another tab).
    ProviderSignedOut,
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Result of the startup `get_current_session()` call.
    InitialSession(Option<Session>),
    /// A change notification from the provider.
    Provider(AuthEvent),
    /// Explicit sign-out requested by the application.
    SignOut,
    /// Manual re-resolution of the current identity's role.
    Refresh,
    /// A finished role resolution. Lookup failures arrive here as `None`.
    Resolved {
        identity_id: IdentityId,
        ticket: ResolutionTicket,
        assignment: Option<RoleAssignment>,
    },
}

/// Work the owner of the state must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Resolve the role of `identity_id` on a later scheduler turn.
    ScheduleResolution {
        identity_id: IdentityId,
        ticket: ResolutionTicket,
    },
    /// Tell mounted protected views to navigate away.
    LeaveProtectedView(LeaveReason),
    /// Best-effort provider sign-out of the session that was just ended. Its
    /// outcome never affects local state.
    ProviderSignOut(Session),
}

/// Inputs that were accepted as no-ops.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Discarded {
    #[error("stale resolution for identity {identity_id} (ticket {ticket})")]
    StaleResolution {
        identity_id: IdentityId,
        ticket: ResolutionTicket,
    },

    #[error("duplicate {0} event for the current session")]
    DuplicateEvent(AuthEventKind),

    #[error("{0} event without a session")]
    MissingSession(AuthEventKind),

    #[error("TOKEN_REFRESHED for identity {0}, which is not the current identity")]
    UnmatchedRefresh(IdentityId),

    #[error("initial session superseded by a provider event")]
    InitialSessionSuperseded,

    #[error("already signed out")]
    AlreadySignedOut,

    #[error("no identity to refresh")]
    NoIdentity,
}

/// Snapshot of the session store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    lifecycle: Lifecycle,
    session: Option<Session>,
    role_assignment: Option<RoleAssignment>,

    /// Identity the current `role_assignment` was resolved for.
    #[serde(skip)]
    resolved_for: Option<IdentityId>,

    /// Latest resolution still in flight.
    #[serde(skip)]
    pending: Option<ResolutionTicket>,

    #[serde(skip)]
    last_ticket: u64,
}

impl SessionState {
    /// State at process start.
    pub fn initializing() -> Self {
        Self::default()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    pub fn identity_id(&self) -> Option<IdentityId> {
        self.session.as_ref().map(Session::identity_id)
    }

    /// Raw role assignment. Prefer [`SessionState::role_view`] when the
    /// difference between "unknown" and "absent" matters.
    pub fn role_assignment(&self) -> Option<&RoleAssignment> {
        self.role_assignment.as_ref()
    }

    pub fn role_view(&self) -> RoleView<'_> {
        if self.lifecycle.is_pending() {
            return RoleView::Unknown;
        }
        match &self.role_assignment {
            Some(assignment) => RoleView::Assigned(assignment),
            None => RoleView::Absent,
        }
    }

    pub fn resolved_for(&self) -> Option<IdentityId> {
        self.resolved_for
    }

    pub fn pending_resolution(&self) -> Option<ResolutionTicket> {
        self.pending
    }

    /// `ready` or `signed_out` with no resolution in flight.
    pub fn is_settled(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready | Lifecycle::SignedOut) && self.pending.is_none()
    }

    /// Apply one input. Rejected inputs leave the state untouched.
    pub fn apply(&mut self, input: SessionInput) -> Result<Vec<SessionEffect>, Discarded> {
        match input {
            SessionInput::InitialSession(session) => self.apply_initial(session),
            SessionInput::Provider(event) => self.apply_provider_event(event),
            SessionInput::SignOut => self.apply_sign_out(),
            SessionInput::Refresh => self.apply_refresh(),
            SessionInput::Resolved {
                identity_id,
                ticket,
                assignment,
            } => self.apply_resolution(identity_id, ticket, assignment),
        }
    }

    fn apply_initial(&mut self, session: Option<Session>) -> Result<Vec<SessionEffect>, Discarded> {
        // Any provider event that landed first is newer than the startup read.
        if self.lifecycle != Lifecycle::Initializing || self.session.is_some() {
            return Err(Discarded::InitialSessionSuperseded);
        }
        match session {
            Some(session) => Ok(self.install_identity(session)),
            None => {
                self.clear();
                self.lifecycle = Lifecycle::SignedOut;
                Ok(Vec::new())
            }
        }
    }

    fn apply_provider_event(&mut self, event: AuthEvent) -> Result<Vec<SessionEffect>, Discarded> {
        let kind = event.kind;
        if kind == AuthEventKind::SignedOut {
            return self.apply_provider_sign_out();
        }
        let session = event.session.ok_or(Discarded::MissingSession(kind))?;
        if self.identity_id() == Some(session.identity_id()) {
            if self.session.as_ref() == Some(&session) {
                return Err(Discarded::DuplicateEvent(kind));
            }
            // Same actor, new credential: replace the session wholesale and
            // keep the resolved role.
            self.session = Some(session);
            return Ok(Vec::new());
        }
        // Only SIGNED_IN may introduce an identity.
        if kind == AuthEventKind::TokenRefreshed {
            return Err(Discarded::UnmatchedRefresh(session.identity_id()));
        }
        Ok(self.install_identity(session))
    }

    /// Swap in a session for a different identity and schedule its resolution.
    fn install_identity(&mut self, session: Session) -> Vec<SessionEffect> {
        let identity_id = session.identity_id();
        self.session = Some(session);
        self.role_assignment = None;
        self.resolved_for = None;
        if self.lifecycle != Lifecycle::Initializing {
            self.lifecycle = Lifecycle::Authenticating;
        }
        let ticket = self.issue_ticket();
        vec![SessionEffect::ScheduleResolution {
            identity_id,
            ticket,
        }]
    }

    fn apply_provider_sign_out(&mut self) -> Result<Vec<SessionEffect>, Discarded> {
        if self.lifecycle == Lifecycle::SignedOut {
            return Err(Discarded::AlreadySignedOut);
        }
        let had_identity = self.session.is_some();
        self.clear();
        self.lifecycle = Lifecycle::SignedOut;
        if had_identity {
            Ok(vec![SessionEffect::LeaveProtectedView(
                LeaveReason::ProviderSignedOut,
            )])
        } else {
            Ok(Vec::new())
        }
    }

    fn apply_sign_out(&mut self) -> Result<Vec<SessionEffect>, Discarded> {
        if self.lifecycle == Lifecycle::SignedOut {
            return Err(Discarded::AlreadySignedOut);
        }
        let ended = self.session.take();
        self.clear();
        self.lifecycle = Lifecycle::SignedOut;
        let mut effects = vec![SessionEffect::LeaveProtectedView(LeaveReason::SignOut)];
        effects.extend(ended.map(SessionEffect::ProviderSignOut));
        Ok(effects)
    }

    fn apply_refresh(&mut self) -> Result<Vec<SessionEffect>, Discarded> {
        let identity_id = self.identity_id().ok_or(Discarded::NoIdentity)?;
        let ticket = self.issue_ticket();
        Ok(vec![SessionEffect::ScheduleResolution {
            identity_id,
            ticket,
        }])
    }

    fn apply_resolution(
        &mut self,
        identity_id: IdentityId,
        ticket: ResolutionTicket,
        assignment: Option<RoleAssignment>,
    ) -> Result<Vec<SessionEffect>, Discarded> {
        if self.identity_id() != Some(identity_id) || self.pending != Some(ticket) {
            return Err(Discarded::StaleResolution {
                identity_id,
                ticket,
            });
        }
        self.role_assignment = assignment;
        self.resolved_for = Some(identity_id);
        self.pending = None;
        self.lifecycle = Lifecycle::Ready;
        Ok(Vec::new())
    }

    fn issue_ticket(&mut self) -> ResolutionTicket {
        self.last_ticket += 1;
        let ticket = ResolutionTicket(self.last_ticket);
        self.pending = Some(ticket);
        ticket
    }

    fn clear(&mut self) {
        self.session = None;
        self.role_assignment = None;
        self.resolved_for = None;
        self.pending = None;
    }

    /// First structural invariant the state breaks, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let identity = self.identity_id();
        if self.role_assignment.is_some() && self.resolved_for != identity {
            return Some("role assignment resolved for a different identity");
        }
        match self.lifecycle {
            Lifecycle::Initializing => {
                if self.role_assignment.is_some() {
                    return Some("role assignment present while initializing");
                }
            }
            Lifecycle::Authenticating => {
                if identity.is_none() {
                    return Some("authenticating without an identity");
                }
                if self.role_assignment.is_some() {
                    return Some("role assignment present while authenticating");
                }
                if self.pending.is_none() {
                    return Some("authenticating without a pending resolution");
                }
            }
            Lifecycle::Ready => {
                if identity.is_none() {
                    return Some("ready without an identity");
                }
                if self.resolved_for != identity {
                    return Some("ready but the current identity was never resolved");
                }
            }
            Lifecycle::SignedOut => {
                if self.session.is_some() || self.role_assignment.is_some() || self.pending.is_some() {
                    return Some("signed out with residual session state");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, RoleKind, TeacherSpecialization};
    use chrono::{Duration, Utc};
    use schoolgate_core::{AccessToken, TenantId};

    fn session_for(id: IdentityId, token: &str) -> Session {
        let now = Utc::now();
        Session::new(
            Identity::new(id, format!("{id}@school.test")),
            AccessToken::new(token),
            now,
            now + Duration::hours(1),
        )
    }

    fn scheduled(effects: &[SessionEffect]) -> (IdentityId, ResolutionTicket) {
        match effects {
            [SessionEffect::ScheduleResolution { identity_id, ticket }] => (*identity_id, *ticket),
            other => panic!("expected a single scheduled resolution, got {other:?}"),
        }
    }

    fn teacher() -> RoleAssignment {
        RoleAssignment::new(Role::Teacher(Some(TeacherSpecialization::NormalTeacher)))
            .in_tenant(TenantId::new(), "Hillside Primary")
    }

    #[test]
    fn startup_without_session_settles_signed_out() {
        let mut state = SessionState::initializing();
        let effects = state.apply(SessionInput::InitialSession(None)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(state.lifecycle(), Lifecycle::SignedOut);
        assert!(state.is_settled());
    }

    #[test]
    fn startup_session_stays_initializing_until_resolved() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        let effects = state
            .apply(SessionInput::InitialSession(Some(session_for(u1, "t1"))))
            .unwrap();
        let (id, ticket) = scheduled(&effects);
        assert_eq!(id, u1);
        assert_eq!(state.lifecycle(), Lifecycle::Initializing);
        assert_eq!(state.role_view(), RoleView::Unknown);

        state
            .apply(SessionInput::Resolved {
                identity_id: u1,
                ticket,
                assignment: Some(teacher()),
            })
            .unwrap();
        assert_eq!(state.lifecycle(), Lifecycle::Ready);
        assert!(matches!(state.role_view(), RoleView::Assigned(_)));
        assert_eq!(state.invariant_violation(), None);
    }

    #[test]
    fn provider_event_before_startup_read_wins() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        state
            .apply(SessionInput::Provider(AuthEvent::signed_in(session_for(u1, "t1"))))
            .unwrap();

        let stale = state.apply(SessionInput::InitialSession(None));
        assert_eq!(stale, Err(Discarded::InitialSessionSuperseded));
        assert_eq!(state.identity_id(), Some(u1));
    }

    #[test]
    fn sign_in_after_sign_out_goes_through_authenticating() {
        let mut state = SessionState::initializing();
        state.apply(SessionInput::InitialSession(None)).unwrap();

        let u1 = IdentityId::new();
        let effects = state
            .apply(SessionInput::Provider(AuthEvent::signed_in(session_for(u1, "t1"))))
            .unwrap();
        let (_, ticket) = scheduled(&effects);
        assert_eq!(state.lifecycle(), Lifecycle::Authenticating);
        assert_eq!(state.invariant_violation(), None);

        state
            .apply(SessionInput::Resolved {
                identity_id: u1,
                ticket,
                assignment: None,
            })
            .unwrap();
        assert_eq!(state.lifecycle(), Lifecycle::Ready);
        assert_eq!(state.role_view(), RoleView::Absent);
    }

    #[test]
    fn duplicate_sign_in_is_a_no_op() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        let session = session_for(u1, "t1");
        state
            .apply(SessionInput::Provider(AuthEvent::signed_in(session.clone())))
            .unwrap();

        let again = state.apply(SessionInput::Provider(AuthEvent::signed_in(session)));
        assert_eq!(again, Err(Discarded::DuplicateEvent(AuthEventKind::SignedIn)));
    }

    #[test]
    fn token_refresh_replaces_session_but_keeps_role() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        let effects = state
            .apply(SessionInput::InitialSession(Some(session_for(u1, "t1"))))
            .unwrap();
        let (_, ticket) = scheduled(&effects);
        state
            .apply(SessionInput::Resolved {
                identity_id: u1,
                ticket,
                assignment: Some(teacher()),
            })
            .unwrap();

        let effects = state
            .apply(SessionInput::Provider(AuthEvent::token_refreshed(session_for(u1, "t2"))))
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(state.session().unwrap().access_token.expose(), "t2");
        assert_eq!(
            state.role_assignment().map(RoleAssignment::kind),
            Some(RoleKind::Teacher)
        );
        assert_eq!(state.lifecycle(), Lifecycle::Ready);
    }

    #[test]
    fn resolution_for_superseded_identity_is_discarded() {
        let mut state = SessionState::initializing();
        state.apply(SessionInput::InitialSession(None)).unwrap();
        let (u1, u2) = (IdentityId::new(), IdentityId::new());

        let first = state
            .apply(SessionInput::Provider(AuthEvent::signed_in(session_for(u1, "t1"))))
            .unwrap();
        let (_, t1) = scheduled(&first);
        let second = state
            .apply(SessionInput::Provider(AuthEvent::signed_in(session_for(u2, "t2"))))
            .unwrap();
        let (_, t2) = scheduled(&second);

        let late = state.apply(SessionInput::Resolved {
            identity_id: u1,
            ticket: t1,
            assignment: Some(teacher()),
        });
        assert!(matches!(late, Err(Discarded::StaleResolution { .. })));
        assert!(state.role_assignment().is_none());
        assert_eq!(state.lifecycle(), Lifecycle::Authenticating);

        state
            .apply(SessionInput::Resolved {
                identity_id: u2,
                ticket: t2,
                assignment: Some(RoleAssignment::new(Role::Admin)),
            })
            .unwrap();
        assert_eq!(state.role_assignment().unwrap().role, Role::Admin);
        assert_eq!(state.resolved_for(), Some(u2));
    }

    #[test]
    fn older_ticket_for_the_same_identity_is_discarded() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        let effects = state
            .apply(SessionInput::InitialSession(Some(session_for(u1, "t1"))))
            .unwrap();
        let (_, first) = scheduled(&effects);
        let (_, second) = scheduled(&state.apply(SessionInput::Refresh).unwrap());

        let old = state.apply(SessionInput::Resolved {
            identity_id: u1,
            ticket: first,
            assignment: Some(teacher()),
        });
        assert!(old.is_err());

        state
            .apply(SessionInput::Resolved {
                identity_id: u1,
                ticket: second,
                assignment: None,
            })
            .unwrap();
        assert_eq!(state.role_view(), RoleView::Absent);
    }

    #[test]
    fn explicit_sign_out_clears_everything_and_is_idempotent() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        let session = session_for(u1, "t1");
        state
            .apply(SessionInput::InitialSession(Some(session.clone())))
            .unwrap();

        let effects = state.apply(SessionInput::SignOut).unwrap();
        assert_eq!(
            effects,
            vec![
                SessionEffect::LeaveProtectedView(LeaveReason::SignOut),
                SessionEffect::ProviderSignOut(session),
            ]
        );
        assert_eq!(state.lifecycle(), Lifecycle::SignedOut);
        assert!(state.session().is_none());
        assert!(state.pending_resolution().is_none());
        assert_eq!(state.invariant_violation(), None);

        assert_eq!(state.apply(SessionInput::SignOut), Err(Discarded::AlreadySignedOut));
    }

    #[test]
    fn sign_out_before_any_session_skips_the_provider() {
        let mut state = SessionState::initializing();
        let effects = state.apply(SessionInput::SignOut).unwrap();
        assert_eq!(
            effects,
            vec![SessionEffect::LeaveProtectedView(LeaveReason::SignOut)]
        );
        assert_eq!(state.lifecycle(), Lifecycle::SignedOut);
    }

    #[test]
    fn token_refresh_never_signs_in_from_signed_out() {
        let mut state = SessionState::initializing();
        let u1 = IdentityId::new();
        state
            .apply(SessionInput::InitialSession(Some(session_for(u1, "t1"))))
            .unwrap();
        state.apply(SessionInput::SignOut).unwrap();

        let refreshed = state.apply(SessionInput::Provider(AuthEvent::token_refreshed(
            session_for(u1, "t2"),
        )));
        assert_eq!(refreshed, Err(Discarded::UnmatchedRefresh(u1)));
        assert_eq!(state.lifecycle(), Lifecycle::SignedOut);
        assert!(state.session().is_none());
        assert_eq!(state.invariant_violation(), None);
    }

    #[test]
    fn token_refresh_for_another_identity_is_ignored() {
        let mut state = SessionState::initializing();
        let (u1, u2) = (IdentityId::new(), IdentityId::new());
        let session = session_for(u1, "t1");
        let effects = state
            .apply(SessionInput::InitialSession(Some(session.clone())))
            .unwrap();
        let (_, ticket) = scheduled(&effects);
        state
            .apply(SessionInput::Resolved {
                identity_id: u1,
                ticket,
                assignment: Some(teacher()),
            })
            .unwrap();

        let other = state.apply(SessionInput::Provider(AuthEvent::token_refreshed(
            session_for(u2, "t2"),
        )));
        assert_eq!(other, Err(Discarded::UnmatchedRefresh(u2)));
        assert_eq!(state.lifecycle(), Lifecycle::Ready);
        assert_eq!(state.session(), Some(&session));
        assert_eq!(state.resolved_for(), Some(u1));
        assert!(state.pending_resolution().is_none());
    }

    #[test]
    fn provider_sign_out_without_identity_does_not_navigate() {
        let mut state = SessionState::initializing();
        let effects = state
            .apply(SessionInput::Provider(AuthEvent::signed_out()))
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(state.lifecycle(), Lifecycle::SignedOut);
    }

    #[test]
    fn refresh_without_identity_is_rejected() {
        let mut state = SessionState::initializing();
        state.apply(SessionInput::InitialSession(None)).unwrap();
        assert_eq!(state.apply(SessionInput::Refresh), Err(Discarded::NoIdentity));
    }

    #[test]
    fn sign_in_without_session_payload_is_rejected() {
        let mut state = SessionState::initializing();
        let event = AuthEvent {
            kind: AuthEventKind::SignedIn,
            session: None,
            occurred_at: Utc::now(),
        };
        assert_eq!(
            state.apply(SessionInput::Provider(event)),
            Err(Discarded::MissingSession(AuthEventKind::SignedIn))
        );
        assert_eq!(state.lifecycle(), Lifecycle::Initializing);
    }
}
