use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;
use warden_core::Result;

use crate::entry::{AuditEntry, AuditPayload};
use crate::store::LedgerStore;

/// Result of replaying the hash chain from index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    /// Index of the first entry that breaks the chain, when invalid.
    pub broken_at: Option<u64>,
}

impl IntegrityReport {
    fn ok() -> Self {
        Self {
            valid: true,
            broken_at: None,
        }
    }

    fn broken(index: u64) -> Self {
        Self {
            valid: false,
            broken_at: Some(index),
        }
    }
}

/// Chain tail state guarded by the append lock.
struct Tail {
    next_index: u64,
    previous_hash: String,
}

/// The append-only, hash-chained audit ledger.
///
/// Appends are linearized through one mutex: entry `i`'s `previous_hash` must
/// be exactly entry `i-1`'s `entry_hash`, so concurrent appends serialize here
/// even though the actions producing them run concurrently. Entries are frozen
/// once returned — the kernel never mutates or deletes them.
#[derive(Clone)]
pub struct AuditLedger {
    store: Arc<dyn LedgerStore>,
    tail: Arc<Mutex<Tail>>,
}

impl AuditLedger {
    /// Open a ledger over a store, recovering the chain tail from any entries
    /// already persisted.
    pub fn open(store: Arc<dyn LedgerStore>) -> Result<Self> {
        let existing = store.get_all()?;
        let tail = match existing.last() {
            Some(last) => Tail {
                next_index: last.index + 1,
                previous_hash: last.entry_hash.clone(),
            },
            None => Tail {
                next_index: 0,
                previous_hash: String::new(),
            },
        };
        if tail.next_index > 0 {
            info!(entries = tail.next_index, "recovered audit chain tail");
        }
        Ok(Self {
            store,
            tail: Arc::new(Mutex::new(tail)),
        })
    }

    /// Append one audit record and return the frozen entry.
    ///
    /// Storage failure is surfaced, not swallowed, and leaves the tail
    /// unadvanced so the chain stays consistent with what was persisted.
    pub fn append(&self, payload: AuditPayload) -> Result<AuditEntry> {
        let mut tail = self.tail.lock();

        let mut entry = AuditEntry {
            index: tail.next_index,
            timestamp: Utc::now(),
            correlation_id: payload.correlation_id,
            actor_id: payload.actor_id,
            actor_role: payload.actor_role,
            action_kind: payload.action_kind,
            decision: payload.decision,
            reasoning: payload.reasoning,
            data_hash: payload.data_hash,
            previous_hash: tail.previous_hash.clone(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();

        if let Err(e) = self.store.append(&entry) {
            error!(index = entry.index, error = %e, "audit append failed");
            return Err(e);
        }

        tail.next_index = entry.index + 1;
        tail.previous_hash = entry.entry_hash.clone();

        debug!(
            index = entry.index,
            decision = entry.decision.as_str(),
            action_kind = %entry.action_kind,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Replay the chain from index 0 and report the first break, if any.
    ///
    /// An empty ledger is trivially valid. Integrity failures are "not safe",
    /// never "unknown".
    pub fn verify_integrity(&self) -> Result<IntegrityReport> {
        let entries = self.store.get_all()?;
        let mut expected_previous = String::new();

        for (position, entry) in entries.iter().enumerate() {
            let position = position as u64;
            if entry.index != position {
                return Ok(IntegrityReport::broken(position));
            }
            if entry.previous_hash != expected_previous {
                return Ok(IntegrityReport::broken(position));
            }
            if entry.compute_hash() != entry.entry_hash {
                return Ok(IntegrityReport::broken(position));
            }
            expected_previous = entry.entry_hash.clone();
        }

        Ok(IntegrityReport::ok())
    }

    /// All entries in index order, for SIEM/compliance export.
    pub fn export(&self) -> Result<Vec<AuditEntry>> {
        self.store.get_all()
    }

    /// Entries produced by one request chain.
    pub fn by_correlation(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>> {
        self.store.by_correlation(correlation_id)
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> u64 {
        self.tail.lock().next_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
