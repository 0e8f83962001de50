use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::Notify;

use schoolgate_core::{IdentityId, MembershipId};

use super::{LookupError, MembershipRecord, MembershipStore};

/// In-memory membership store.
///
/// Intended for tests/dev. Besides plain storage it can simulate transport
/// failures and hold individual lookups open so that resolution races can be
/// driven step by step.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    records: RwLock<Vec<MembershipRecord>>,
    unavailable: AtomicBool,
    failures_left: AtomicUsize,
    holds: Mutex<HashMap<IdentityId, Arc<Notify>>>,
    lookups: Mutex<Vec<IdentityId>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = MembershipRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Insert a record, replacing any record with the same membership id.
    pub fn upsert(&self, record: MembershipRecord) -> Result<(), LookupError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.retain(|r| r.membership_id != record.membership_id);
        records.push(record);
        Ok(())
    }

    /// Flip the `active` flag. Returns `false` when the membership is unknown.
    pub fn set_active(&self, membership_id: MembershipId, active: bool) -> Result<bool, LookupError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records
            .iter_mut()
            .find(|r| r.membership_id == membership_id)
            .map(|r| r.active = active)
            .is_some())
    }

    /// Fail every lookup with [`LookupError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail only the next `n` lookups.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Hold the next lookup for `identity_id` until the returned latch is notified.
    pub fn hold(&self, identity_id: IdentityId) -> Arc<Notify> {
        let latch = Arc::new(Notify::new());
        if let Ok(mut holds) = self.holds.lock() {
            holds.insert(identity_id, Arc::clone(&latch));
        }
        latch
    }

    /// Total lookups that reached the store (including failed ones).
    pub fn lookups(&self) -> usize {
        self.lookups.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn lookups_for(&self, identity_id: IdentityId) -> usize {
        self.lookups
            .lock()
            .map(|l| l.iter().filter(|id| **id == identity_id).count())
            .unwrap_or(0)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

fn poisoned() -> LookupError {
    LookupError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn memberships_for(
        &self,
        identity_id: IdentityId,
    ) -> Result<Vec<MembershipRecord>, LookupError> {
        self.lookups.lock().map_err(|_| poisoned())?.push(identity_id);

        let held = self.holds.lock().map_err(|_| poisoned())?.remove(&identity_id);
        if let Some(latch) = held {
            latch.notified().await;
        }

        if self.unavailable.load(Ordering::SeqCst) || self.take_failure() {
            return Err(LookupError::Unavailable(format!(
                "membership lookup for {identity_id} timed out"
            )));
        }

        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .iter()
            .filter(|r| r.identity_id == identity_id)
            .cloned()
            .collect())
    }
}
