use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::info;
use warden_core::{ActorRole, SessionActor};

/// Why an approver was blocked from resolving a gate.
///
/// A SoD violation is a second-order governance failure — it blocks the
/// approval attempt, not the underlying action, which stays pending for a
/// different approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SodViolation {
    /// The approver initiated the workflow they are trying to approve in.
    SelfApproval,
    /// The approver already approved another gate in this workflow session
    /// and the action kind is not on the repeat-approver allow-list.
    RepeatApprover,
    /// The approver's role is not authorized for this action kind.
    UnauthorizedRole,
}

impl fmt::Display for SodViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SelfApproval => "approver cannot be the workflow initiator",
            Self::RepeatApprover => "approver already approved a gate in this workflow session",
            Self::UnauthorizedRole => "approver role is not authorized for this action kind",
        };
        write!(f, "{s}")
    }
}

/// Separation-of-duties configuration.
///
/// `repeat_approver_allowed` is the explicit, auditable allow-list of action
/// kinds that tolerate the same approver across gates in one workflow session
/// (the four-eyes exception).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SodPolicy {
    /// Action kinds exempt from the four-eyes check.
    pub repeat_approver_allowed: Vec<String>,
    /// Authorized approver roles per action kind. Kinds not listed fall back
    /// to `default_approver_roles`.
    pub authorized_roles: HashMap<String, Vec<ActorRole>>,
    /// Fallback role set for action kinds without an explicit entry.
    pub default_approver_roles: Vec<ActorRole>,
}

impl Default for SodPolicy {
    fn default() -> Self {
        Self {
            repeat_approver_allowed: Vec::new(),
            authorized_roles: HashMap::new(),
            default_approver_roles: vec![ActorRole::Approver, ActorRole::Admin],
        }
    }
}

impl SodPolicy {
    /// Check an approval attempt. Rules run in order; the first match blocks.
    pub fn check(
        &self,
        action_kind: &str,
        initiator_id: &str,
        approver: &SessionActor,
        session_approvers: &HashSet<String>,
    ) -> Option<SodViolation> {
        if approver.id == initiator_id {
            return Some(SodViolation::SelfApproval);
        }

        if session_approvers.contains(&approver.id) {
            if self.repeat_approver_allowed.iter().any(|k| k == action_kind) {
                info!(
                    approver = %approver.id,
                    action_kind,
                    "repeat approver permitted by allow-list"
                );
            } else {
                return Some(SodViolation::RepeatApprover);
            }
        }

        let authorized = self
            .authorized_roles
            .get(action_kind)
            .unwrap_or(&self.default_approver_roles);
        if !authorized.contains(&approver.role) {
            return Some(SodViolation::UnauthorizedRole);
        }

        None
    }
}
