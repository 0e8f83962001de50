use serde::Serialize;

use crate::{Lifecycle, PermissionRequirement, RoleAssignment, RoleKind, SessionState};

/// Outcome of gating a protected view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    RedirectToLogin,
    RedirectToUnauthorized,
    ShowLoading,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// Decide whether the current actor may see a view.
///
/// - No IO
/// - No panics
/// - No hidden state: the result depends only on the arguments
pub fn decide(
    lifecycle: Lifecycle,
    assignment: Option<&RoleAssignment>,
    requirement: &PermissionRequirement,
) -> AccessDecision {
    match lifecycle {
        Lifecycle::Initializing | Lifecycle::Authenticating => AccessDecision::ShowLoading,
        Lifecycle::SignedOut => AccessDecision::RedirectToLogin,
        Lifecycle::Ready => match assignment {
            _ if requirement.is_empty() => AccessDecision::Allow,
            Some(assignment) if requirement.allows(assignment.kind()) => AccessDecision::Allow,
            _ => AccessDecision::RedirectToUnauthorized,
        },
    }
}

/// Gate a view on a session snapshot.
pub fn evaluate(state: &SessionState, requirement: &PermissionRequirement) -> AccessDecision {
    decide(state.lifecycle(), state.role_assignment(), requirement)
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a gate decision.
///
/// Carries the inputs the decision was computed from so that a denial can be
/// logged and debugged without re-reading the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateExplanation {
    pub decision: AccessDecision,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub lifecycle: Lifecycle,
    pub role: Option<RoleKind>,
    pub required_roles: Vec<RoleKind>,
}

/// Explain why [`evaluate`] returns what it returns for these inputs.
pub fn explain(state: &SessionState, requirement: &PermissionRequirement) -> GateExplanation {
    let decision = evaluate(state, requirement);
    let role = state.role_assignment().map(RoleAssignment::kind);

    let reason = match (decision, role) {
        (AccessDecision::ShowLoading, _) => {
            format!("role resolution in progress (lifecycle: {})", state.lifecycle())
        }
        (AccessDecision::RedirectToLogin, _) => "no authenticated session".to_string(),
        (AccessDecision::Allow, _) if requirement.is_empty() => {
            "view is open to any authenticated actor".to_string()
        }
        (AccessDecision::Allow, Some(role)) => {
            format!("role '{role}' is listed in {requirement}")
        }
        (AccessDecision::RedirectToUnauthorized, Some(role)) => {
            format!("role '{role}' is not listed in {requirement}")
        }
        (_, None) => format!("actor has no usable role; view requires {requirement}"),
    };

    GateExplanation {
        decision,
        reason,
        lifecycle: state.lifecycle(),
        role,
        required_roles: requirement.iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, SessionInput, TeacherSpecialization};
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use schoolgate_core::{AccessToken, Identity, IdentityId, Session, TenantId};

    fn ready_with(assignment: Option<RoleAssignment>) -> SessionState {
        let now = Utc::now();
        let id = IdentityId::new();
        let mut state = SessionState::initializing();
        let session = Session::new(
            Identity::new(id, "u1@school.test"),
            AccessToken::new("t"),
            now,
            now + Duration::hours(1),
        );
        let effects = state
            .apply(SessionInput::InitialSession(Some(session)))
            .unwrap();
        let ticket = match effects.as_slice() {
            [crate::SessionEffect::ScheduleResolution { ticket, .. }] => *ticket,
            other => panic!("unexpected effects: {other:?}"),
        };
        state
            .apply(SessionInput::Resolved {
                identity_id: id,
                ticket,
                assignment,
            })
            .unwrap();
        state
    }

    fn u1_teacher() -> RoleAssignment {
        RoleAssignment::new(Role::Teacher(Some(TeacherSpecialization::NormalTeacher)))
            .in_tenant(TenantId::new(), "T1")
    }

    #[test]
    fn teacher_is_allowed_into_teacher_views_only() {
        let state = ready_with(Some(u1_teacher()));

        let staff = PermissionRequirement::roles([RoleKind::Teacher, RoleKind::Headmaster]);
        assert_eq!(evaluate(&state, &staff), AccessDecision::Allow);

        let admin = PermissionRequirement::roles([RoleKind::Admin]);
        assert_eq!(evaluate(&state, &admin), AccessDecision::RedirectToUnauthorized);
    }

    #[test]
    fn signed_out_always_redirects_to_login() {
        let mut state = SessionState::initializing();
        state.apply(SessionInput::InitialSession(None)).unwrap();

        for req in [
            PermissionRequirement::authenticated(),
            PermissionRequirement::roles([RoleKind::Student]),
        ] {
            assert_eq!(evaluate(&state, &req), AccessDecision::RedirectToLogin);
        }
    }

    #[test]
    fn pending_lifecycles_show_loading() {
        let state = SessionState::initializing();
        assert_eq!(
            evaluate(&state, &PermissionRequirement::authenticated()),
            AccessDecision::ShowLoading
        );
        assert_eq!(
            decide(
                Lifecycle::Authenticating,
                Some(&u1_teacher()),
                &PermissionRequirement::roles([RoleKind::Teacher])
            ),
            AccessDecision::ShowLoading
        );
    }

    #[test]
    fn ready_without_role_only_passes_open_views() {
        let state = ready_with(None);
        assert_eq!(
            evaluate(&state, &PermissionRequirement::authenticated()),
            AccessDecision::Allow
        );
        assert_eq!(
            evaluate(&state, &PermissionRequirement::roles([RoleKind::Parent])),
            AccessDecision::RedirectToUnauthorized
        );
    }

    #[test]
    fn explanation_agrees_with_evaluate() {
        let state = ready_with(Some(u1_teacher()));
        let admin = PermissionRequirement::roles([RoleKind::Admin]);

        let explanation = explain(&state, &admin);
        assert_eq!(explanation.decision, evaluate(&state, &admin));
        assert_eq!(explanation.role, Some(RoleKind::Teacher));
        assert_eq!(explanation.required_roles, vec![RoleKind::Admin]);
        assert!(explanation.reason.contains("teacher"));
    }

    fn lifecycle_strategy() -> impl Strategy<Value = Lifecycle> {
        prop_oneof![
            Just(Lifecycle::Initializing),
            Just(Lifecycle::Authenticating),
            Just(Lifecycle::Ready),
            Just(Lifecycle::SignedOut),
        ]
    }

    fn role_strategy() -> impl Strategy<Value = Option<RoleKind>> {
        proptest::option::of(proptest::sample::select(RoleKind::ALL.to_vec()))
    }

    fn requirement_strategy() -> impl Strategy<Value = PermissionRequirement> {
        proptest::sample::subsequence(RoleKind::ALL.to_vec(), 0..=RoleKind::ALL.len())
            .prop_map(PermissionRequirement::roles)
    }

    proptest! {
        #[test]
        fn decide_is_deterministic_and_fails_closed(
            lifecycle in lifecycle_strategy(),
            role in role_strategy(),
            requirement in requirement_strategy(),
        ) {
            let assignment = role.map(|kind| RoleAssignment::new(Role::from(kind)));
            let first = decide(lifecycle, assignment.as_ref(), &requirement);
            let second = decide(lifecycle, assignment.as_ref(), &requirement);
            prop_assert_eq!(first, second);

            if first == AccessDecision::Allow {
                prop_assert_eq!(lifecycle, Lifecycle::Ready);
                let role_listed = role.map(|kind| requirement.allows(kind)).unwrap_or(false);
                prop_assert!(requirement.is_empty() || role_listed);
            }
        }
    }
}
