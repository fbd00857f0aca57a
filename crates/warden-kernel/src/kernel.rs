use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_approvals::{ApprovalGate, ApprovalOutcome, ResolveDecision};
use warden_config::WardenConfig;
use warden_core::{ActionRequest, ExecutionMode, Result, WardenError};
use warden_ledger::{AuditEntry, AuditLedger, AuditOutcome, AuditPayload, MemoryStore, SqliteStore};
use warden_limits::{ConcurrencyLimiter, RateLimiter};
use warden_policy::{Decision, PolicyEngine, PolicyRule, PolicyVerdict};

use crate::providers::{EffectProvider, IdentityProvider, StaticIdentityProvider};

/// The governance kernel: every sensitive action flows through [`execute`].
///
/// Stages run in a fixed order — mode check, rate limit, concurrency slot,
/// policy evaluation, human approval when escalated, then the effect — and
/// every terminal outcome lands in the audit ledger before it surfaces to the
/// caller. The concurrency slot is held across the approval wait and the
/// effect, so a parked request still counts against its kind's in-flight cap.
///
/// [`execute`]: Self::execute
pub struct Kernel {
    mode: ExecutionMode,
    rate: RateLimiter,
    concurrency: ConcurrencyLimiter,
    policy: PolicyEngine,
    gate: Arc<ApprovalGate>,
    ledger: Arc<AuditLedger>,
    identity: Arc<dyn IdentityProvider>,
    approval_timeout: Duration,
}

impl Kernel {
    /// Assemble a kernel from loaded configuration, wiring the ledger backend,
    /// approval gate, and declarative policy rules.
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        let ledger = match config.ledger.backend.as_str() {
            "sqlite" => {
                let store = SqliteStore::open(&config.ledger.path)?;
                AuditLedger::open(Arc::new(store))?
            }
            _ => AuditLedger::open(Arc::new(MemoryStore::new()))?,
        };
        let ledger = Arc::new(ledger);

        let policy = PolicyEngine::new();
        for rule in &config.policy.rules {
            policy.register(Arc::new(rule.clone()) as Arc<dyn PolicyRule>);
        }

        let gate = Arc::new(ApprovalGate::new(
            config.approvals.sod.clone(),
            Arc::clone(&ledger),
        ));

        info!(
            mode = %config.mode,
            rules = policy.rule_count(),
            ledger = %config.ledger.backend,
            "kernel assembled"
        );

        Ok(Self {
            mode: config.mode,
            rate: RateLimiter::new(config.limits.rate_config()),
            concurrency: ConcurrencyLimiter::new(config.limits.max_concurrent),
            policy,
            gate,
            ledger,
            identity: Arc::new(StaticIdentityProvider::default()),
            approval_timeout: Duration::from_secs(config.approvals.timeout_secs),
        })
    }

    /// Swap in the identity provider that resolves approver ids.
    pub fn with_identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = provider;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// The approval gate, for the operator surface to resolve pending gates.
    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Resolve a pending approval gate on behalf of a named approver.
    ///
    /// The approver's role comes from the identity provider, never from the
    /// caller, so a forged role cannot slip past the SoD checks.
    pub fn resolve_approval(
        &self,
        pending_id: Uuid,
        decision: ResolveDecision,
        approver_id: &str,
        attestation: Option<String>,
    ) -> Result<AuditEntry> {
        let approver =
            self.identity
                .resolve(approver_id)
                .ok_or_else(|| WardenError::UnknownActor {
                    actor_id: approver_id.to_string(),
                })?;
        self.gate
            .resolve(pending_id, decision, &approver, attestation)
    }

    /// Execute one governed action outside any workflow session. The actor is
    /// treated as their own initiator for self-approval checks.
    pub async fn execute(
        &self,
        request: ActionRequest,
        effect: &dyn EffectProvider,
    ) -> Result<Value> {
        let initiator = request.actor_id.clone();
        self.execute_in_session(request, effect, None, &initiator)
            .await
    }

    /// Execute one governed action within a workflow session.
    ///
    /// `initiator_id` is whoever started the enclosing workflow — approval
    /// gates compare approvers against it, not against the acting agent.
    pub async fn execute_in_session(
        &self,
        request: ActionRequest,
        effect: &dyn EffectProvider,
        workflow_session: Option<Uuid>,
        initiator_id: &str,
    ) -> Result<Value> {
        // ── Mode check ─────────────────────────────────────────
        if self.mode == ExecutionMode::Live && !effect.is_live() {
            self.audit_denied(
                &request,
                format!("effect provider '{}' is not live", effect.name()),
            )?;
            return Err(WardenError::ModeMismatch {
                provider: effect.name().to_string(),
            });
        }

        // ── Rate limit ─────────────────────────────────────────
        let rate_key = format!("{}:{}", request.actor_id, request.action_kind);
        let rate = self.rate.try_consume(&rate_key, 1);
        if !rate.allowed {
            self.audit_denied(
                &request,
                format!(
                    "rate limited on '{rate_key}', retry after {}ms",
                    rate.retry_after_ms
                ),
            )?;
            return Err(WardenError::RateLimited {
                key: rate_key,
                retry_after_ms: rate.retry_after_ms,
            });
        }

        // ── Concurrency slot ───────────────────────────────────
        // Held for the rest of the call; drops on every exit path.
        let _slot = match self.concurrency.try_acquire(&request.action_kind) {
            Some(guard) => guard,
            None => {
                self.audit_denied(
                    &request,
                    format!(
                        "concurrency limit reached on '{}' ({} slots)",
                        request.action_kind,
                        self.concurrency.max()
                    ),
                )?;
                return Err(WardenError::ConcurrencyExhausted {
                    key: request.action_kind.clone(),
                    max: self.concurrency.max(),
                });
            }
        };

        // ── Policy ─────────────────────────────────────────────
        let verdict = self.policy.evaluate(&request);
        debug!(
            correlation_id = %request.correlation_id,
            decision = %verdict.decision,
            rule = ?verdict.rule_id,
            "policy verdict"
        );
        if verdict.decision == Decision::Deny {
            self.ledger.append(AuditPayload::from_request(
                &request,
                AuditOutcome::Denied,
                verdict.reasoning.clone(),
            ))?;
            return Err(WardenError::PolicyDenied {
                rule_id: verdict.rule_id,
                reason: verdict.reasoning,
            });
        }

        // ── Human approval ─────────────────────────────────────
        if verdict.decision.needs_human() {
            self.await_approval(&request, &verdict, workflow_session, initiator_id)
                .await?;
        }

        // ── Effect ─────────────────────────────────────────────
        match effect.invoke(&request).await {
            Ok(output) => {
                self.ledger.append(AuditPayload::from_request(
                    &request,
                    AuditOutcome::Allowed,
                    verdict.reasoning,
                ))?;
                Ok(output)
            }
            Err(e) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    action_kind = %request.action_kind,
                    error = %e,
                    "effect failed after admission"
                );
                self.ledger.append(AuditPayload::from_request(
                    &request,
                    AuditOutcome::Errored,
                    format!("effect failed: {e}"),
                ))?;
                Err(WardenError::EffectFailed {
                    action_kind: request.action_kind.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Park at the approval gate and translate its outcome. The gate audits
    /// the resolution itself; only the pass-through case continues.
    async fn await_approval(
        &self,
        request: &ActionRequest,
        verdict: &PolicyVerdict,
        workflow_session: Option<Uuid>,
        initiator_id: &str,
    ) -> Result<()> {
        let pending_id = Uuid::new_v4();
        let outcome = self
            .gate
            .request_approval_with_id(
                pending_id,
                request,
                workflow_session,
                initiator_id,
                verdict.attestation_prompt.clone(),
                self.approval_timeout,
            )
            .await?;

        match outcome {
            ApprovalOutcome::Approved { approver_id, .. } => {
                info!(
                    pending_id = %pending_id,
                    approver = %approver_id,
                    action_kind = %request.action_kind,
                    "escalated action approved"
                );
                Ok(())
            }
            ApprovalOutcome::Denied { reason, .. } => Err(WardenError::ApprovalDenied {
                pending_id,
                reason,
            }),
            ApprovalOutcome::TimedOut => Err(WardenError::ApprovalTimeout { pending_id }),
        }
    }

    fn audit_denied(&self, request: &ActionRequest, reasoning: String) -> Result<()> {
        self.ledger
            .append(AuditPayload::from_request(
                request,
                AuditOutcome::Denied,
                reasoning,
            ))
            .map(|_| ())
    }
}
