//! # warden-config
//!
//! Configuration for the warden kernel: the `warden.toml` schema, loading
//! with environment overrides, and validation that separates hard errors
//! from advisory warnings.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    ApprovalsConfig, ConfigWarning, LedgerConfig, LimitsConfig, LoggingConfig, PolicyConfig,
    WardenConfig, WarningSeverity,
};
