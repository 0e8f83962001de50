//! Static per-screen permission declarations.
//!
//! The routing layer registers every protected screen once, at startup. After
//! that the registry is read-only and only the gate looks at it.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{AccessDecision, PermissionRequirement, SessionState, evaluate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("screen path must start with '/': '{0}'")]
    InvalidPath(String),

    #[error("screen '{0}' is already declared")]
    Duplicate(String),
}

/// Path-prefix → requirement table.
#[derive(Debug, Clone, Default)]
pub struct ScreenRegistry {
    screens: BTreeMap<String, PermissionRequirement>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a screen (or a subtree of screens) and its requirement.
    pub fn declare(
        &mut self,
        path: impl Into<String>,
        requirement: PermissionRequirement,
    ) -> Result<&mut Self, DeclarationError> {
        let path = normalize(path.into())?;
        if self.screens.contains_key(&path) {
            return Err(DeclarationError::Duplicate(path));
        }
        self.screens.insert(path, requirement);
        Ok(self)
    }

    /// Requirement of the most specific declared prefix of `path`.
    ///
    /// Undeclared paths fall back to "any authenticated actor".
    pub fn requirement_for(&self, path: &str) -> PermissionRequirement {
        self.screens
            .iter()
            .filter(|(prefix, _)| covers(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, requirement)| requirement.clone())
            .unwrap_or_default()
    }

    /// Gate `path` on the given snapshot.
    pub fn evaluate_path(&self, state: &SessionState, path: &str) -> AccessDecision {
        evaluate(state, &self.requirement_for(path))
    }

    pub fn screens(&self) -> impl Iterator<Item = (&str, &PermissionRequirement)> {
        self.screens.iter().map(|(path, req)| (path.as_str(), req))
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

fn normalize(path: String) -> Result<String, DeclarationError> {
    if !path.starts_with('/') {
        return Err(DeclarationError::InvalidPath(path));
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    })
}

/// Segment-aware prefix test: `/admin` covers `/admin/users` but not `/administrators`.
fn covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
