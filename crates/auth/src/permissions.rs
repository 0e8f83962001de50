use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::RoleKind;

/// Roles allowed to view a protected screen.
///
/// Attached to a view at definition time and never mutated afterwards. An
/// empty set means "any authenticated actor, with or without a role".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionRequirement(BTreeSet<RoleKind>);

impl PermissionRequirement {
    /// Any authenticated actor.
    pub fn authenticated() -> Self {
        Self(BTreeSet::new())
    }

    pub fn roles(roles: impl IntoIterator<Item = RoleKind>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn allows(&self, kind: RoleKind) -> bool {
        self.0.is_empty() || self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = RoleKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<RoleKind> for PermissionRequirement {
    fn from_iter<I: IntoIterator<Item = RoleKind>>(iter: I) -> Self {
        Self::roles(iter)
    }
}

impl core::fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<any authenticated>");
        }
        let names: Vec<&str> = self.0.iter().map(RoleKind::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
