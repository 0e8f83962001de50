//! `schoolgate-core`: identity building blocks shared by every crate.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the authenticated identity and the
//! provider-issued session that wraps it.

pub mod error;
pub mod id;
pub mod identity;

pub use error::{DomainError, DomainResult};
pub use id::{IdentityId, MembershipId, TenantId};
pub use identity::{AccessToken, Identity, Session, SessionValidationError};
