//! # warden-core
//!
//! Core types and primitives for the Warden governance kernel.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: actors, action requests, classifications, and the unified error type.

pub mod action;
pub mod error;
pub mod types;

pub use action::{ActionRequest, fingerprint};
pub use error::{Result, WardenError};
pub use types::{ActorRole, Classification, ExecutionMode, SessionActor};
