//! # warden-ledger
//!
//! The tamper-evident audit trail behind every kernel decision. Entries are
//! hash-chained: each entry's hash covers its own canonical payload plus the
//! previous entry's hash, so any retroactive edit is detectable by replay.
//! Appends are serialized through one critical section — the single mandatory
//! global synchronization point in the system.

pub mod entry;
pub mod ledger;
pub mod sqlite;
pub mod store;

pub use entry::{AuditEntry, AuditOutcome, AuditPayload};
pub use ledger::{AuditLedger, IntegrityReport};
pub use sqlite::SqliteStore;
pub use store::{LedgerStore, MemoryStore};
