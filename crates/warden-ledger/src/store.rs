use parking_lot::RwLock;
use uuid::Uuid;
use warden_core::Result;

use crate::entry::AuditEntry;

/// Persistence behind the ledger. Implementations only store and retrieve —
/// chaining, ordering, and verification live in [`AuditLedger`](crate::AuditLedger),
/// so the same logic works against memory, disk, or a database.
pub trait LedgerStore: Send + Sync {
    /// Persist one entry. Failure here is fatal to the append.
    fn append(&self, entry: &AuditEntry) -> Result<()>;

    /// All entries in index order.
    fn get_all(&self) -> Result<Vec<AuditEntry>>;

    /// Entries for one correlation id, in index order.
    fn by_correlation(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>>;
}

/// Volatile store for tests and ephemeral kernels.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.read().clone())
    }

    fn by_correlation(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}
