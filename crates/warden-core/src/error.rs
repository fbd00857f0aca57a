use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the entire Warden kernel.
///
/// Every variant carries a stable reason and the responsible rule/gate/key so an
/// operator can act on it. Raw payloads never appear here — only identifiers.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Admission errors ───────────────────────────────────────
    #[error("rate limited on '{key}', retry after {retry_after_ms}ms")]
    RateLimited { key: String, retry_after_ms: u64 },

    #[error("concurrency limit reached on '{key}' ({max} slots)")]
    ConcurrencyExhausted { key: String, max: u32 },

    // ── Policy errors ──────────────────────────────────────────
    #[error("denied by policy rule {rule_id:?}: {reason}")]
    PolicyDenied {
        rule_id: Option<String>,
        reason: String,
    },

    #[error("effect provider '{provider}' is not permitted in live mode")]
    ModeMismatch { provider: String },

    // ── Approval errors ────────────────────────────────────────
    #[error("approval {pending_id} denied: {reason}")]
    ApprovalDenied { pending_id: Uuid, reason: String },

    #[error("approval {pending_id} timed out")]
    ApprovalTimeout { pending_id: Uuid },

    #[error("separation of duties violation by approver '{approver_id}': {reason}")]
    SeparationOfDuties { approver_id: String, reason: String },

    #[error("no pending approval with id {pending_id} (unknown or already resolved)")]
    PendingNotFound { pending_id: Uuid },

    #[error("approval {pending_id} requires an attestation statement")]
    AttestationRequired { pending_id: Uuid },

    #[error("actor '{actor_id}' is not known to the identity provider")]
    UnknownActor { actor_id: String },

    // ── Ledger errors ──────────────────────────────────────────
    #[error("audit chain integrity failure at index {broken_at}")]
    IntegrityFailure { broken_at: u64 },

    #[error("ledger error: {0}")]
    Ledger(String),

    // ── Effect errors ──────────────────────────────────────────
    #[error("effect failed for action '{action_kind}': {reason}")]
    EffectFailed { action_kind: String, reason: String },

    // ── Workflow errors ────────────────────────────────────────
    #[error("workflow error: {0}")]
    Workflow(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
