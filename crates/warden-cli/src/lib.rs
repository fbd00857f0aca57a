//! # warden-cli
//!
//! Command-line interface for the Warden governance kernel.
//!
//! ## Commands
//!
//! - `warden config` — Show current configuration
//! - `warden doctor` — Validate configuration and report warnings
//! - `warden ledger verify` — Replay and verify the audit hash chain
//! - `warden ledger export` — Print audit entries
//! - `warden policy eval` — Dry-run the policy rules against an action
//! - `warden init` — Write a starter warden.toml

pub mod commands;

pub use commands::Cli;
