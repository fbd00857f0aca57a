//! # warden-approvals
//!
//! The human-in-the-loop gate. Requests that policy escalates are parked here
//! until a human resolves them (approve/deny) or the timeout auto-denies.
//! Every resolution — including timeout — is written to the audit ledger, and
//! separation-of-duties rules decide who may resolve what.

pub mod gate;
pub mod sod;

pub use gate::{ApprovalGate, ApprovalNotice, ApprovalOutcome, PendingSummary, ResolveDecision};
pub use sod::{SodPolicy, SodViolation};
