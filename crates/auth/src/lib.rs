//! `schoolgate-auth`: pure access-resolution boundary.
//!
//! Roles, role assignments, permission requirements, the session lifecycle
//! state machine and the access gate. This crate is intentionally decoupled
//! from IO and async runtimes.

pub mod assignment;
pub mod declarations;
pub mod gate;
pub mod permissions;
pub mod roles;
pub mod session;

pub use assignment::RoleAssignment;
pub use declarations::{DeclarationError, ScreenRegistry};
pub use gate::{AccessDecision, GateExplanation, decide, evaluate, explain};
pub use permissions::PermissionRequirement;
pub use roles::{Role, RoleError, RoleKind, TeacherSpecialization};
pub use session::{
    Discarded, LeaveReason, Lifecycle, ResolutionTicket, RoleView, SessionEffect, SessionInput,
    SessionState,
};
