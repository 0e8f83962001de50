//! School dashboard wiring: screen declarations and demo fixtures.

pub mod fixture;
pub mod screens;

pub use fixture::{Seed, SeedAccount};
pub use screens::dashboard;
