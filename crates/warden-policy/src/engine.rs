use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{ActionRequest, Classification, Result};

use crate::decision::Decision;
use crate::rule::PolicyRule;

/// The engine's answer for one request: the merged decision, the reasoning of
/// the most restrictive contributor, and the rule that supplied it.
#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub decision: Decision,
    pub reasoning: String,
    /// Rule that set the final decision; `None` when only the baseline applied.
    pub rule_id: Option<String>,
    /// Prompt for the attesting human, when the decision requires attestation.
    pub attestation_prompt: Option<String>,
}

/// Evaluates registered rules in order against action requests.
///
/// The rule set is read-mostly: evaluation takes a read lock, and
/// [`replace_rules`](Self::replace_rules) swaps the whole set atomically so a
/// reload never interleaves with an in-flight evaluation. Replacing rules has
/// no effect on decisions already recorded.
#[derive(Clone)]
pub struct PolicyEngine {
    rules: Arc<RwLock<Vec<Arc<dyn PolicyRule>>>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a rule to the end of the evaluation order.
    pub fn register(&self, rule: Arc<dyn PolicyRule>) {
        self.rules.write().push(rule);
    }

    /// Atomically replace the entire rule set (policy reload).
    pub fn replace_rules(&self, rules: Vec<Arc<dyn PolicyRule>>) {
        let count = rules.len();
        *self.rules.write() = rules;
        info!(count, "policy rule set replaced");
    }

    /// Number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Evaluate a request against the registered rules.
    ///
    /// Starts from a context-derived baseline (`Mandatory` classification
    /// forces `RequireApproval`), merges each matching rule's decision through
    /// the lattice, and short-circuits on the first DENY, whose reasoning is
    /// authoritative. A rule whose predicate errors or panics fails closed to
    /// DENY.
    pub fn evaluate(&self, request: &ActionRequest) -> PolicyVerdict {
        let mut verdict = baseline(request);

        for rule in self.rules.read().iter() {
            // The whole contribution runs behind a panic guard: a faulty rule
            // must never let an action through unevaluated.
            let evaluated = panic::catch_unwind(AssertUnwindSafe(
                || -> Result<Option<(Decision, String, Option<String>)>> {
                    Ok(rule.matches(request)?.then(|| {
                        (
                            rule.decision(),
                            rule.reasoning(),
                            rule.attestation_prompt().map(str::to_string),
                        )
                    }))
                },
            ));
            let contribution = match evaluated {
                Ok(Ok(c)) => c,
                Ok(Err(e)) => {
                    warn!(rule = rule.id(), error = %e, "rule predicate failed, failing closed");
                    return fail_closed(rule.id(), &e.to_string());
                }
                Err(_) => {
                    warn!(rule = rule.id(), "rule panicked, failing closed");
                    return fail_closed(rule.id(), "rule panicked");
                }
            };
            let Some((contributed, reasoning, attestation_prompt)) = contribution else {
                continue;
            };

            if contributed == Decision::Deny {
                info!(
                    rule = rule.id(),
                    action_kind = %request.action_kind,
                    "policy denied action"
                );
                return PolicyVerdict {
                    decision: Decision::Deny,
                    reasoning,
                    rule_id: Some(rule.id().to_string()),
                    attestation_prompt: None,
                };
            }

            let merged = verdict.decision.merge(contributed);
            if merged > verdict.decision {
                // This rule tightened the outcome; its reasoning wins.
                verdict = PolicyVerdict {
                    decision: merged,
                    reasoning,
                    rule_id: Some(rule.id().to_string()),
                    attestation_prompt,
                };
            }
            debug!(
                rule = rule.id(),
                contributed = %contributed,
                running = %verdict.decision,
                "rule matched"
            );
        }

        verdict
    }
}

/// The verdict for a rule that could not be evaluated.
fn fail_closed(rule_id: &str, cause: &str) -> PolicyVerdict {
    PolicyVerdict {
        decision: Decision::Deny,
        reasoning: format!("rule '{rule_id}' failed closed: {cause}"),
        rule_id: Some(rule_id.to_string()),
        attestation_prompt: None,
    }
}

/// Context-derived starting decision, before any rule runs.
fn baseline(request: &ActionRequest) -> PolicyVerdict {
    if request.classification == Classification::Mandatory {
        PolicyVerdict {
            decision: Decision::RequireApproval,
            reasoning: "mandatory classification requires human approval".into(),
            rule_id: None,
            attestation_prompt: None,
        }
    } else {
        PolicyVerdict {
            decision: Decision::Allow,
            reasoning: "no rule matched".into(),
            rule_id: None,
            attestation_prompt: None,
        }
    }
}
