use serde::{Deserialize, Serialize};
use std::fmt;

/// The role an actor holds within a governed session.
///
/// Roles feed the separation-of-duties checks: approving an action requires a
/// role from the action kind's authorized set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// An automated agent submitting actions for execution.
    Agent,
    /// A human running or supervising a workflow.
    Operator,
    /// A human authorized to approve escalated actions.
    Approver,
    /// Read-only access to audit exports.
    Auditor,
    /// Full administrative authority.
    Admin,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Agent => "agent",
            Self::Operator => "operator",
            Self::Approver => "approver",
            Self::Auditor => "auditor",
            Self::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ActorRole {
    type Err = crate::error::WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "operator" => Ok(Self::Operator),
            "approver" => Ok(Self::Approver),
            "auditor" => Ok(Self::Auditor),
            "admin" => Ok(Self::Admin),
            other => Err(crate::error::WardenError::Config(format!(
                "unknown actor role '{other}'"
            ))),
        }
    }
}

/// An actor resolved by the identity provider for the current session.
///
/// The kernel never creates or destroys actors — it only consumes them for
/// separation-of-duties checks and audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionActor {
    pub id: String,
    pub role: ActorRole,
}

impl SessionActor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Data classification of an action's target or payload.
///
/// `Mandatory` forces a human-approval baseline regardless of how the policy
/// rules are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Public,
    Internal,
    Sensitive,
    Mandatory,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Sensitive => "sensitive",
            Self::Mandatory => "mandatory",
        };
        write!(f, "{s}")
    }
}

/// The mode the kernel was constructed in.
///
/// A `Live` kernel refuses effect providers that declare themselves non-live,
/// so a stub capability can never slip into production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Live,
    Dry,
}

impl std::str::FromStr for ExecutionMode {
    type Err = crate::error::WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "dry" => Ok(Self::Dry),
            other => Err(crate::error::WardenError::Config(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Dry => write!(f, "dry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_rejects_unknown() {
        assert_eq!("live".parse::<ExecutionMode>().unwrap(), ExecutionMode::Live);
        assert_eq!("dry".parse::<ExecutionMode>().unwrap(), ExecutionMode::Dry);
        // A typo must not silently select a mode.
        assert!("prod".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_actor_role_rejects_unknown() {
        assert_eq!("approver".parse::<ActorRole>().unwrap(), ActorRole::Approver);
        assert!("superuser".parse::<ActorRole>().is_err());
    }
}
