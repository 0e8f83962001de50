//! Tenant-membership boundary and the role resolver built on top of it.
//!
//! The membership store is plain record storage owned by the tenant/business
//! data layer. This module only needs one read from it: "which memberships
//! does this identity hold". Everything else (picking the record, turning
//! raw strings into a typed [`RoleAssignment`]) happens here.

mod in_memory;
mod resolver;

pub use in_memory::InMemoryMembershipStore;
pub use resolver::{RetryPolicy, RoleResolver, select_membership};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use schoolgate_auth::{Role, RoleAssignment, RoleKind, TeacherSpecialization};
use schoolgate_core::{IdentityId, MembershipId, TenantId};

/// A membership row as stored by the tenant data layer.
///
/// Role strings are kept raw: validation happens when the row is turned into
/// a [`RoleAssignment`], never at storage time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub membership_id: MembershipId,
    pub identity_id: IdentityId,
    pub role: String,
    #[serde(default)]
    pub sub_role: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl MembershipRecord {
    /// Active membership created now.
    pub fn new(identity_id: IdentityId, role: impl Into<String>) -> Self {
        Self {
            membership_id: MembershipId::new(),
            identity_id,
            role: role.into(),
            sub_role: None,
            tenant_id: None,
            tenant_name: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_sub_role(mut self, sub_role: impl Into<String>) -> Self {
        self.sub_role = Some(sub_role.into());
        self
    }

    pub fn in_tenant(mut self, tenant_id: TenantId, tenant_name: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id);
        self.tenant_name = Some(tenant_name.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Convert the raw row into a typed assignment.
    ///
    /// Unknown role or sub-role strings are rejected. A sub-role attached to
    /// a role outside the teacher family is dropped.
    pub fn to_assignment(&self) -> Result<RoleAssignment, LookupError> {
        let invalid = |reason: String| LookupError::InvalidRecord {
            membership_id: self.membership_id,
            reason,
        };

        let kind: RoleKind = self.role.parse().map_err(|err| invalid(format!("{err}")))?;
        let sub_role = match self.sub_role.as_deref() {
            None | Some("") => None,
            Some(_) if !kind.is_teacher_family() => {
                tracing::warn!(
                    membership_id = %self.membership_id,
                    role = %kind,
                    "sub_role on a non-teacher membership ignored"
                );
                None
            }
            Some(raw) => Some(
                raw.parse::<TeacherSpecialization>()
                    .map_err(|err| invalid(format!("{err}")))?,
            ),
        };
        let role = Role::from_parts(kind, sub_role).map_err(|err| invalid(format!("{err}")))?;

        Ok(RoleAssignment {
            role,
            tenant_id: self.tenant_id,
            tenant_name: self.tenant_name.clone(),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The membership store could not be reached. Worth retrying.
    #[error("membership store unavailable: {0}")]
    Unavailable(String),

    #[error("membership {membership_id} is invalid: {reason}")]
    InvalidRecord {
        membership_id: MembershipId,
        reason: String,
    },
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Unavailable(_))
    }
}

/// Read side of the tenant-membership store.
#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    /// Every membership row recorded for `identity_id`, active or not.
    async fn memberships_for(
        &self,
        identity_id: IdentityId,
    ) -> Result<Vec<MembershipRecord>, LookupError>;
}

#[async_trait::async_trait]
impl<S> MembershipStore for std::sync::Arc<S>
where
    S: MembershipStore + ?Sized,
{
    async fn memberships_for(
        &self,
        identity_id: IdentityId,
    ) -> Result<Vec<MembershipRecord>, LookupError> {
        (**self).memberships_for(identity_id).await
    }
}
