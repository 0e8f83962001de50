use std::sync::Arc;
use std::time::Duration;

use schoolgate_auth::RoleAssignment;
use schoolgate_core::IdentityId;

use super::{LookupError, MembershipRecord, MembershipStore};

/// Bounded retry for transient lookup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt.
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(100))
    }
}

/// Pick the membership that decides the actor's role.
///
/// Inactive rows and rows for other identities are ignored. Among the rest
/// the most recently created wins; ties go to the larger membership id so
/// the choice never depends on storage order.
pub fn select_membership(
    identity_id: IdentityId,
    records: &[MembershipRecord],
) -> Option<&MembershipRecord> {
    records
        .iter()
        .filter(|r| r.active && r.identity_id == identity_id)
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.membership_id.cmp(&b.membership_id))
        })
}

/// Resolves an identity's role inside its tenant.
///
/// Side-effect free beyond the store read, so calling it twice for the same
/// identity is harmless.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn MembershipStore>,
    retry: RetryPolicy,
}

impl core::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoleResolver")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RoleResolver {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// One read: `Ok(None)` when the identity has no active membership.
    pub async fn resolve(&self, identity_id: IdentityId) -> Result<Option<RoleAssignment>, LookupError> {
        let records = self.store.memberships_for(identity_id).await?;
        select_membership(identity_id, &records)
            .map(MembershipRecord::to_assignment)
            .transpose()
    }

    /// [`RoleResolver::resolve`] with the configured retry policy. Only
    /// transient errors are retried.
    pub async fn resolve_with_retry(
        &self,
        identity_id: IdentityId,
    ) -> Result<Option<RoleAssignment>, LookupError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.resolve(identity_id).await {
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::debug!(
                        %identity_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "membership lookup failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::InMemoryMembershipStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use schoolgate_auth::{Role, RoleKind, TeacherSpecialization};
    use schoolgate_core::TenantId;

    fn resolver(store: &Arc<InMemoryMembershipStore>) -> RoleResolver {
        RoleResolver::new(store.clone()).with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    #[test]
    fn newest_active_membership_wins() {
        let id = IdentityId::new();
        let now = Utc::now();
        let records = vec![
            MembershipRecord::new(id, "student").created_at(now - ChronoDuration::days(30)),
            MembershipRecord::new(id, "teacher").created_at(now - ChronoDuration::days(1)),
            MembershipRecord::new(id, "admin").created_at(now).inactive(),
            MembershipRecord::new(IdentityId::new(), "super_admin").created_at(now),
        ];

        let picked = select_membership(id, &records).unwrap();
        assert_eq!(picked.role, "teacher");
    }

    #[test]
    fn ties_are_broken_by_membership_id() {
        let id = IdentityId::new();
        let at = Utc::now();
        let a = MembershipRecord::new(id, "student").created_at(at);
        let b = MembershipRecord::new(id, "parent").created_at(at);
        let expected = a.membership_id.max(b.membership_id);

        let forward = select_membership(id, &[a.clone(), b.clone()]).unwrap().membership_id;
        let backward = select_membership(id, &[b, a]).unwrap().membership_id;
        assert_eq!(forward, expected);
        assert_eq!(backward, expected);
    }

    #[tokio::test]
    async fn resolves_teacher_in_tenant() {
        let id = IdentityId::new();
        let tenant = TenantId::new();
        let store = Arc::new(InMemoryMembershipStore::with_records([MembershipRecord::new(
            id, "teacher",
        )
        .with_sub_role("normal_teacher")
        .in_tenant(tenant, "T1")]));

        let assignment = resolver(&store).resolve(id).await.unwrap().unwrap();
        assert_eq!(
            assignment.role,
            Role::Teacher(Some(TeacherSpecialization::NormalTeacher))
        );
        assert_eq!(assignment.tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn no_membership_is_none_not_an_error() {
        let store = Arc::new(InMemoryMembershipStore::new());
        assert_eq!(resolver(&store).resolve(IdentityId::new()).await, Ok(None));
    }

    #[tokio::test]
    async fn inactive_only_is_treated_as_absent() {
        let id = IdentityId::new();
        let store = Arc::new(InMemoryMembershipStore::with_records([
            MembershipRecord::new(id, "headmaster").inactive(),
        ]));
        assert_eq!(resolver(&store).resolve(id).await, Ok(None));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_up_to_the_limit() {
        let id = IdentityId::new();
        let store = Arc::new(InMemoryMembershipStore::with_records([MembershipRecord::new(
            id, "parent",
        )]));

        store.fail_next(2);
        let assignment = resolver(&store).resolve_with_retry(id).await.unwrap().unwrap();
        assert_eq!(assignment.kind(), RoleKind::Parent);
        assert_eq!(store.lookups(), 3);

        store.set_unavailable(true);
        let err = resolver(&store).resolve_with_retry(id).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.lookups(), 6);
    }

    #[tokio::test]
    async fn invalid_records_are_not_retried() {
        let id = IdentityId::new();
        let store = Arc::new(InMemoryMembershipStore::with_records([MembershipRecord::new(
            id, "janitor",
        )]));

        let err = resolver(&store).resolve_with_retry(id).await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidRecord { .. }));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly() {
        let id = IdentityId::new();
        let store = Arc::new(InMemoryMembershipStore::new());
        store.set_unavailable(true);
        let resolver = RoleResolver::new(store.clone())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(100)));

        let started = tokio::time::Instant::now();
        assert!(resolver.resolve_with_retry(id).await.is_err());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "slept {elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "slept {elapsed:?}");
    }
}
