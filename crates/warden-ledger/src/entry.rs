use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{ActionRequest, ActorRole};

/// Terminal outcome recorded for one governed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Policy allowed the action and the effect succeeded.
    Allowed,
    /// Admission or policy denied the action before the effect ran.
    Denied,
    /// A human approved an escalated action.
    ApprovalGranted,
    /// A human denied an escalated action.
    ApprovalDenied,
    /// An approval gate expired without resolution.
    TimedOut,
    /// The effect itself failed after being admitted.
    Errored,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalDenied => "approval_denied",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
        }
    }
}

impl std::str::FromStr for AuditOutcome {
    type Err = warden_core::WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(Self::Allowed),
            "denied" => Ok(Self::Denied),
            "approval_granted" => Ok(Self::ApprovalGranted),
            "approval_denied" => Ok(Self::ApprovalDenied),
            "timed_out" => Ok(Self::TimedOut),
            "errored" => Ok(Self::Errored),
            other => Err(warden_core::WardenError::Ledger(format!(
                "unknown audit outcome '{other}'"
            ))),
        }
    }
}

/// What a caller hands to [`AuditLedger::append`](crate::AuditLedger::append).
///
/// `data_hash` is a content fingerprint of the action's payload — the raw
/// payload never reaches the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPayload {
    pub correlation_id: Uuid,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub action_kind: String,
    pub decision: AuditOutcome,
    pub reasoning: String,
    pub data_hash: String,
}

impl AuditPayload {
    /// Build a payload from an action request, fingerprinting its payload.
    pub fn from_request(
        request: &ActionRequest,
        decision: AuditOutcome,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: request.correlation_id,
            actor_id: request.actor_id.clone(),
            actor_role: request.actor_role,
            action_kind: request.action_kind.clone(),
            decision,
            reasoning: reasoning.into(),
            data_hash: request.payload_digest(),
        }
    }
}

/// One frozen, hash-chained audit record.
///
/// Invariant: `entry_hash = blake3(canonical ‖ previous_hash ‖ index)` where
/// `canonical` is the serde-canonical JSON of the payload fields, and the
/// first entry's `previous_hash` is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub action_kind: String,
    pub decision: AuditOutcome,
    pub reasoning: String,
    pub data_hash: String,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// Fixed-order view of the fields covered by the chain hash. Field order here
/// is the canonical order — do not reorder.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    timestamp: &'a DateTime<Utc>,
    correlation_id: &'a Uuid,
    actor_id: &'a str,
    actor_role: &'a ActorRole,
    action_kind: &'a str,
    decision: &'a AuditOutcome,
    reasoning: &'a str,
    data_hash: &'a str,
}

impl AuditEntry {
    /// Canonical bytes of the hashed payload fields.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = CanonicalFields {
            timestamp: &self.timestamp,
            correlation_id: &self.correlation_id,
            actor_id: &self.actor_id,
            actor_role: &self.actor_role,
            action_kind: &self.action_kind,
            decision: &self.decision,
            reasoning: &self.reasoning,
            data_hash: &self.data_hash,
        };
        serde_json::to_vec(&canonical).unwrap_or_default()
    }

    /// Recompute this entry's chain hash from its contents.
    pub fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.canonical_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(&self.index.to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }
}
