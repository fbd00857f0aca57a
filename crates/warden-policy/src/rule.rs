use serde::{Deserialize, Serialize};
use warden_core::{ActionRequest, Classification, Result};

use crate::decision::Decision;

/// A single policy rule: a predicate over action requests plus the decision it
/// contributes when it matches.
///
/// Rules are immutable once registered and are evaluated in registration
/// order. `matches` is fallible so a broken predicate fails closed instead of
/// silently allowing.
pub trait PolicyRule: Send + Sync {
    /// Stable identifier reported in verdicts and audit records.
    fn id(&self) -> &str;

    /// Whether this rule applies to the request.
    fn matches(&self, request: &ActionRequest) -> Result<bool>;

    /// The decision this rule contributes when it matches.
    fn decision(&self) -> Decision;

    /// Human-readable reasoning attached to the verdict.
    fn reasoning(&self) -> String;

    /// Prompt shown to the attesting human, for attestation rules.
    fn attestation_prompt(&self) -> Option<&str> {
        None
    }
}

/// A declarative rule loaded from configuration.
///
/// Empty match lists mean "any". Targets match by prefix so a rule can cover a
/// subtree like `s3://finance/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub id: String,
    /// Action kinds this rule applies to; empty = any.
    pub action_kinds: Vec<String>,
    /// Target prefixes this rule applies to; empty = any.
    pub targets: Vec<String>,
    /// Classifications this rule applies to; empty = any.
    pub classifications: Vec<Classification>,
    pub decision: Decision,
    /// Overrides the generated reasoning when set.
    pub reasoning: Option<String>,
    pub attestation_prompt: Option<String>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            id: String::new(),
            action_kinds: Vec::new(),
            targets: Vec::new(),
            classifications: Vec::new(),
            decision: Decision::Deny,
            reasoning: None,
            attestation_prompt: None,
        }
    }
}

impl PolicyRule for RuleSpec {
    fn id(&self) -> &str {
        &self.id
    }

    fn matches(&self, request: &ActionRequest) -> Result<bool> {
        if !self.action_kinds.is_empty() && !self.action_kinds.contains(&request.action_kind) {
            return Ok(false);
        }
        if !self.targets.is_empty() && !self.targets.iter().any(|t| request.target.starts_with(t))
        {
            return Ok(false);
        }
        if !self.classifications.is_empty()
            && !self.classifications.contains(&request.classification)
        {
            return Ok(false);
        }
        Ok(true)
    }

    fn decision(&self) -> Decision {
        self.decision
    }

    fn reasoning(&self) -> String {
        self.reasoning
            .clone()
            .unwrap_or_else(|| format!("matched rule '{}'", self.id))
    }

    fn attestation_prompt(&self) -> Option<&str> {
        self.attestation_prompt.as_deref()
    }
}
