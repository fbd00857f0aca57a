use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{ActorRole, Classification};

/// One sensitive action an agent wants to perform, submitted to the kernel
/// for admission, policy evaluation, and audit.
///
/// Requests are ephemeral — one per call. The `payload` is fingerprinted into
/// the audit trail but never stored raw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Correlates every audit entry this request produces.
    pub correlation_id: Uuid,
    pub actor_id: String,
    pub actor_role: ActorRole,
    /// Capability being invoked, e.g. "fs.delete", "mail.send", "ledger.export".
    pub action_kind: String,
    /// What the action operates on, e.g. a path, URL, or case id.
    pub target: String,
    pub classification: Classification,
    /// Arguments passed to the effect. Hashed for audit, never exported.
    #[serde(default)]
    pub payload: Value,
}

impl ActionRequest {
    pub fn new(
        actor_id: impl Into<String>,
        actor_role: ActorRole,
        action_kind: impl Into<String>,
        target: impl Into<String>,
        classification: Classification,
        payload: Value,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            actor_id: actor_id.into(),
            actor_role,
            action_kind: action_kind.into(),
            target: target.into(),
            classification,
            payload,
        }
    }

    /// Content fingerprint of the request payload for audit records.
    pub fn payload_digest(&self) -> String {
        fingerprint(&self.payload)
    }
}

/// Hex-encoded blake3 digest of a JSON value in its serde-canonical form.
pub fn fingerprint(value: &Value) -> String {
    // serde_json objects are BTreeMap-backed, so rendered bytes are stable
    // for equal values regardless of insertion order.
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
