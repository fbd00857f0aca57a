//! # warden-workflow
//!
//! The approval-gated workflow engine. A workflow is an immutable template of
//! phased steps; the engine advances through them one at a time, folding any
//! findings a step surfaces into an append-only registry with derived
//! aggregates.

pub mod definition;
pub mod engine;
pub mod registry;

pub use definition::{Phase, StepDef, WorkflowDef};
pub use engine::{CompletedStep, Workflow, WorkflowError, WorkflowStatus};
pub use registry::{Finding, Registry, RegistrySummary, Viability};
