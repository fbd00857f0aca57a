//! # warden-kernel
//!
//! The composition root. The kernel chains admission control, policy
//! evaluation, human approval, and audit into one `execute` path, and the
//! workflow runner drives phased workflows through it step by step.

pub mod kernel;
pub mod providers;
pub mod runner;

pub use kernel::Kernel;
pub use providers::{DryRunEffect, EffectProvider, IdentityProvider, StaticIdentityProvider};
pub use runner::WorkflowRunner;
