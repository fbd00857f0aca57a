//! # warden-policy
//!
//! Rule-based policy evaluation for the Warden kernel. Rules are registered in
//! order and evaluated deterministically; their decisions combine through an
//! explicit most-restrictive-wins lattice, with DENY short-circuiting.

pub mod decision;
pub mod engine;
pub mod rule;

pub use decision::Decision;
pub use engine::{PolicyEngine, PolicyVerdict};
pub use rule::{PolicyRule, RuleSpec};
