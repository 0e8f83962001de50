use serde::{Deserialize, Serialize};

use schoolgate_core::TenantId;

use crate::{Role, RoleError, RoleKind, TeacherSpecialization};

/// Resolved role of an identity inside its tenant.
///
/// Derived, never authoritative: it is recomputed from tenant-membership
/// data whenever the identity changes. Inactive memberships never become an
/// assignment, so holding one always means "usable role".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AssignmentRecord", try_from = "AssignmentRecord")]
pub struct RoleAssignment {
    pub role: Role,
    pub tenant_id: Option<TenantId>,
    pub tenant_name: Option<String>,
}

impl RoleAssignment {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            tenant_id: None,
            tenant_name: None,
        }
    }

    pub fn in_tenant(mut self, tenant_id: TenantId, tenant_name: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id);
        self.tenant_name = Some(tenant_name.into());
        self
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn sub_role(&self) -> Option<TeacherSpecialization> {
        self.role.sub_role()
    }
}

/// Flat wire shape: `{role, sub_role, tenant_id, tenant_name}`.
#[derive(Serialize, Deserialize)]
struct AssignmentRecord {
    role: RoleKind,
    #[serde(default)]
    sub_role: Option<TeacherSpecialization>,
    #[serde(default)]
    tenant_id: Option<TenantId>,
    #[serde(default)]
    tenant_name: Option<String>,
}

impl From<RoleAssignment> for AssignmentRecord {
    fn from(value: RoleAssignment) -> Self {
        Self {
            role: value.role.kind(),
            sub_role: value.role.sub_role(),
            tenant_id: value.tenant_id,
            tenant_name: value.tenant_name,
        }
    }
}

impl TryFrom<AssignmentRecord> for RoleAssignment {
    type Error = RoleError;

    fn try_from(value: AssignmentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            role: Role::from_parts(value.role, value.sub_role)?,
            tenant_id: value.tenant_id,
            tenant_name: value.tenant_name,
        })
    }
}
