//! SQLite-backed ledger store.
//!
//! One row per entry, WAL mode for concurrent readers, indexed by correlation
//! id. The table is append-only by construction — no UPDATE or DELETE paths
//! exist in this module.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use warden_core::{Result, WardenError};

use crate::entry::AuditEntry;
use crate::store::LedgerStore;

/// Durable audit store at a filesystem path.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the audit database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening audit store");

        let conn = Connection::open(path).map_err(|e| WardenError::Ledger(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS audit_log (
                idx INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                actor_role TEXT NOT NULL,
                action_kind TEXT NOT NULL,
                decision TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                entry_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_correlation
                ON audit_log(correlation_id);
            ",
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            index: row.get::<_, i64>(0)? as u64,
            timestamp: row.get(1)?,
            correlation_id: row.get(2)?,
            actor_id: row.get(3)?,
            actor_role: row.get(4)?,
            action_kind: row.get(5)?,
            decision: row.get(6)?,
            reasoning: row.get(7)?,
            data_hash: row.get(8)?,
            previous_hash: row.get(9)?,
            entry_hash: row.get(10)?,
        })
    }
}

/// Untyped row as stored; parsed into an [`AuditEntry`] after the query.
struct RawRow {
    index: u64,
    timestamp: String,
    correlation_id: String,
    actor_id: String,
    actor_role: String,
    action_kind: String,
    decision: String,
    reasoning: String,
    data_hash: String,
    previous_hash: String,
    entry_hash: String,
}

impl RawRow {
    fn parse(self) -> Result<AuditEntry> {
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| WardenError::Ledger(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let correlation_id = Uuid::parse_str(&self.correlation_id)
            .map_err(|e| WardenError::Ledger(format!("bad correlation id: {e}")))?;
        Ok(AuditEntry {
            index: self.index,
            timestamp,
            correlation_id,
            actor_id: self.actor_id,
            actor_role: self.actor_role.parse()?,
            action_kind: self.action_kind,
            decision: self.decision.parse()?,
            reasoning: self.reasoning,
            data_hash: self.data_hash,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
        })
    }
}

const SELECT_FIELDS: &str = "idx, timestamp, correlation_id, actor_id, actor_role, action_kind, \
                             decision, reasoning, data_hash, previous_hash, entry_hash";

impl LedgerStore for SqliteStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO audit_log (idx, timestamp, correlation_id, actor_id, actor_role,
                                    action_kind, decision, reasoning, data_hash,
                                    previous_hash, entry_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                entry.index as i64,
                entry.timestamp.to_rfc3339(),
                entry.correlation_id.to_string(),
                entry.actor_id,
                entry.actor_role.to_string(),
                entry.action_kind,
                entry.decision.as_str(),
                entry.reasoning,
                entry.data_hash,
                entry.previous_hash,
                entry.entry_hash,
            ],
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<AuditEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {SELECT_FIELDS} FROM audit_log ORDER BY idx ASC"
            ))
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        let rows: Vec<RawRow> = stmt
            .query_map([], Self::row_to_entry)
            .map_err(|e| WardenError::Ledger(e.to_string()))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        rows.into_iter().map(RawRow::parse).collect()
    }

    fn by_correlation(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {SELECT_FIELDS} FROM audit_log WHERE correlation_id = ?1 ORDER BY idx ASC"
            ))
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        let rows: Vec<RawRow> = stmt
            .query_map(
                rusqlite::params![correlation_id.to_string()],
                Self::row_to_entry,
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        rows.into_iter().map(RawRow::parse).collect()
    }
}
