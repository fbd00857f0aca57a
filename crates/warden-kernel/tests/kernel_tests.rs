//! End-to-end kernel tests: the full admission → policy → approval → effect
//! pipeline, plus workflow runs driven through it.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use warden_approvals::ResolveDecision;
use warden_config::WardenConfig;
use warden_core::{
    ActionRequest, ActorRole, Classification, ExecutionMode, SessionActor, WardenError,
};
use warden_kernel::{
    DryRunEffect, EffectProvider, Kernel, StaticIdentityProvider, WorkflowRunner,
};
use warden_ledger::AuditOutcome;
use warden_policy::{Decision, RuleSpec};
use warden_workflow::{Phase, StepDef, Viability, WorkflowDef, WorkflowStatus};

fn base_config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.approvals.timeout_secs = 5;
    config
}

fn request(kind: &str, target: &str, class: Classification) -> ActionRequest {
    ActionRequest::new(
        "agent-1",
        ActorRole::Agent,
        kind,
        target,
        class,
        json!({"arg": 1}),
    )
}

/// Effect that counts invocations and returns a fixed output.
struct CountingEffect {
    calls: AtomicU32,
    output: Value,
}

impl CountingEffect {
    fn new(output: Value) -> Self {
        Self {
            calls: AtomicU32::new(0),
            output,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EffectProvider for CountingEffect {
    fn name(&self) -> &str {
        "counting"
    }

    async fn invoke(&self, _request: &ActionRequest) -> warden_core::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Effect that always fails.
struct BrokenEffect;

#[async_trait]
impl EffectProvider for BrokenEffect {
    fn name(&self) -> &str {
        "broken"
    }

    async fn invoke(&self, _request: &ActionRequest) -> warden_core::Result<Value> {
        Err(WardenError::Other(anyhow::anyhow!("downstream unreachable")))
    }
}

/// Wait until the gate has a pending entry, with a hard cap.
async fn wait_for_pending(kernel: &Kernel) -> uuid::Uuid {
    for _ in 0..200 {
        if let Some(p) = kernel.gate().pending().first() {
            return p.id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no pending approval appeared");
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn test_allowed_action_runs_and_audits() {
        let kernel = Kernel::from_config(&base_config()).unwrap();
        let effect = CountingEffect::new(json!({"ok": true}));

        let out = kernel
            .execute(request("fs.read", "/tmp/x", Classification::Internal), &effect)
            .await
            .unwrap();

        assert_eq!(out, json!({"ok": true}));
        assert_eq!(effect.calls(), 1);
        let entries = kernel.ledger().export().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].decision, AuditOutcome::Allowed);
    }

    #[tokio::test]
    async fn test_policy_deny_blocks_effect() {
        let mut config = base_config();
        config.policy.rules = vec![RuleSpec {
            id: "no-exfil".into(),
            action_kinds: vec!["net.post".into()],
            decision: Decision::Deny,
            reasoning: Some("outbound posts are forbidden".into()),
            ..Default::default()
        }];
        let kernel = Kernel::from_config(&config).unwrap();
        let effect = CountingEffect::new(json!({}));

        let err = kernel
            .execute(
                request("net.post", "https://example.com", Classification::Internal),
                &effect,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WardenError::PolicyDenied { .. }));
        // The effect never ran, but the denial is on the record.
        assert_eq!(effect.calls(), 0);
        let entries = kernel.ledger().export().unwrap();
        assert_eq!(entries[0].decision, AuditOutcome::Denied);
        assert_eq!(entries[0].reasoning, "outbound posts are forbidden");
    }

    #[tokio::test]
    async fn test_rate_limit_denial_is_audited() {
        let mut config = base_config();
        config.limits.rate_base = 1;
        config.limits.rate_burst = 0;
        config.limits.refill_per_sec = 0.001;
        let kernel = Kernel::from_config(&config).unwrap();
        let effect = DryRunEffect;

        kernel
            .execute(request("fs.read", "/a", Classification::Public), &effect)
            .await
            .unwrap();
        let err = kernel
            .execute(request("fs.read", "/b", Classification::Public), &effect)
            .await
            .unwrap_err();

        match err {
            WardenError::RateLimited { key, retry_after_ms } => {
                assert_eq!(key, "agent-1:fs.read");
                assert!(retry_after_ms > 0);
            }
            other => panic!("expected RateLimited, got {other}"),
        }
        let entries = kernel.ledger().export().unwrap();
        assert_eq!(entries.last().unwrap().decision, AuditOutcome::Denied);
    }

    #[tokio::test]
    async fn test_live_kernel_refuses_dry_provider() {
        let mut config = base_config();
        config.mode = ExecutionMode::Live;
        let kernel = Kernel::from_config(&config).unwrap();

        let err = kernel
            .execute(
                request("fs.read", "/tmp/x", Classification::Public),
                &DryRunEffect,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WardenError::ModeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_effect_failure_audited_as_errored() {
        let kernel = Kernel::from_config(&base_config()).unwrap();

        let err = kernel
            .execute(
                request("mail.send", "bob@example.com", Classification::Internal),
                &BrokenEffect,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WardenError::EffectFailed { .. }));
        let entries = kernel.ledger().export().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].decision, AuditOutcome::Errored);
    }

    #[tokio::test]
    async fn test_chain_stays_valid_across_outcomes() {
        let kernel = Kernel::from_config(&base_config()).unwrap();
        kernel
            .execute(request("fs.read", "/a", Classification::Public), &DryRunEffect)
            .await
            .unwrap();
        let _ = kernel
            .execute(
                request("mail.send", "x@y.z", Classification::Internal),
                &BrokenEffect,
            )
            .await;

        let report = kernel.ledger().verify_integrity().unwrap();
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_sqlite_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config();
        config.ledger.backend = "sqlite".into();
        config.ledger.path = dir.path().join("audit.db");

        {
            let kernel = Kernel::from_config(&config).unwrap();
            kernel
                .execute(request("fs.read", "/a", Classification::Public), &DryRunEffect)
                .await
                .unwrap();
            assert_eq!(kernel.ledger().len(), 1);
        }

        // A fresh kernel recovers the persisted chain and keeps extending it.
        let kernel = Kernel::from_config(&config).unwrap();
        assert_eq!(kernel.ledger().len(), 1);
        kernel
            .execute(request("fs.read", "/b", Classification::Public), &DryRunEffect)
            .await
            .unwrap();

        assert_eq!(kernel.ledger().len(), 2);
        assert!(kernel.ledger().verify_integrity().unwrap().valid);
    }
}

mod approvals {
    use super::*;

    fn kernel_with_gate() -> Arc<Kernel> {
        Arc::new(Kernel::from_config(&base_config()).unwrap())
    }

    #[tokio::test]
    async fn test_mandatory_classification_parks_then_approves() {
        let kernel = kernel_with_gate();
        let worker = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            worker
                .execute(
                    request("fs.delete", "/srv/data", Classification::Mandatory),
                    &DryRunEffect,
                )
                .await
        });

        let pending_id = wait_for_pending(&kernel).await;
        kernel
            .gate()
            .resolve(
                pending_id,
                ResolveDecision::Approve,
                &SessionActor::new("bob", ActorRole::Approver),
                None,
            )
            .unwrap();

        let out = handle.await.unwrap().unwrap();
        assert_eq!(out["dry_run"], json!(true));

        let decisions: Vec<_> = kernel
            .ledger()
            .export()
            .unwrap()
            .iter()
            .map(|e| e.decision)
            .collect();
        assert_eq!(
            decisions,
            vec![AuditOutcome::ApprovalGranted, AuditOutcome::Allowed]
        );
    }

    #[tokio::test]
    async fn test_denied_approval_surfaces() {
        let kernel = kernel_with_gate();
        let worker = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            worker
                .execute(
                    request("fs.delete", "/srv/data", Classification::Mandatory),
                    &DryRunEffect,
                )
                .await
        });

        let pending_id = wait_for_pending(&kernel).await;
        kernel
            .gate()
            .resolve(
                pending_id,
                ResolveDecision::Deny {
                    reason: "target is production".into(),
                },
                &SessionActor::new("bob", ActorRole::Approver),
                None,
            )
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        match err {
            WardenError::ApprovalDenied { reason, .. } => {
                assert_eq!(reason, "target is production")
            }
            other => panic!("expected ApprovalDenied, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_gate_times_out() {
        let mut config = base_config();
        config.approvals.timeout_secs = 1;
        let kernel = Kernel::from_config(&config).unwrap();

        let err = kernel
            .execute(
                request("fs.delete", "/srv/data", Classification::Mandatory),
                &DryRunEffect,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WardenError::ApprovalTimeout { .. }));
        let entries = kernel.ledger().export().unwrap();
        let timeouts = entries
            .iter()
            .filter(|e| e.decision == AuditOutcome::TimedOut)
            .count();
        assert_eq!(timeouts, 1);
    }

    #[tokio::test]
    async fn test_resolution_through_identity_provider() {
        let kernel = Kernel::from_config(&base_config())
            .unwrap()
            .with_identity(Arc::new(StaticIdentityProvider::new([
                SessionActor::new("bob", ActorRole::Approver),
            ])));
        let kernel = Arc::new(kernel);
        let worker = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            worker
                .execute(
                    request("fs.delete", "/srv/data", Classification::Mandatory),
                    &DryRunEffect,
                )
                .await
        });

        let pending_id = wait_for_pending(&kernel).await;

        // An id the identity provider does not know is rejected outright.
        let err = kernel
            .resolve_approval(pending_id, ResolveDecision::Approve, "mallory", None)
            .unwrap_err();
        assert!(matches!(err, WardenError::UnknownActor { .. }));

        kernel
            .resolve_approval(pending_id, ResolveDecision::Approve, "bob", None)
            .unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_attestation_rule_round_trips() {
        let mut config = base_config();
        config.policy.rules = vec![RuleSpec {
            id: "attest-sensitive".into(),
            classifications: vec![Classification::Sensitive],
            decision: Decision::RequireAttestation,
            attestation_prompt: Some("confirm the export is authorized".into()),
            ..Default::default()
        }];
        let kernel = Arc::new(Kernel::from_config(&config).unwrap());
        let worker = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            worker
                .execute(
                    request("ledger.export", "s3://reports/", Classification::Sensitive),
                    &DryRunEffect,
                )
                .await
        });

        let pending_id = wait_for_pending(&kernel).await;
        let approver = SessionActor::new("bob", ActorRole::Approver);

        // Approving without a statement is refused and the gate stays open.
        let err = kernel
            .gate()
            .resolve(pending_id, ResolveDecision::Approve, &approver, None)
            .unwrap_err();
        assert!(matches!(err, WardenError::AttestationRequired { .. }));

        kernel
            .gate()
            .resolve(
                pending_id,
                ResolveDecision::Approve,
                &approver,
                Some("reviewed and authorized".into()),
            )
            .unwrap();

        assert!(handle.await.unwrap().is_ok());
        let entries = kernel.ledger().export().unwrap();
        assert!(entries[0].reasoning.contains("reviewed and authorized"));
    }
}

mod workflows {
    use super::*;

    fn step(order: usize, phase: Phase, kind: &str) -> StepDef {
        StepDef {
            order,
            phase,
            actor_id: "agent-1".into(),
            action_kind: kind.into(),
            task: format!("task {order}"),
            requires_approval: false,
            discovery_enabled: false,
            critical: false,
        }
    }

    #[tokio::test]
    async fn test_gated_workflow_halts_until_approved() {
        let kernel = Arc::new(Kernel::from_config(&base_config()).unwrap());
        let mut steps = vec![
            step(0, Phase::Intake, "docs.collect"),
            step(1, Phase::Analysis, "docs.analyze"),
            step(2, Phase::Delivery, "report.publish"),
        ];
        steps[1].requires_approval = true;
        let def = WorkflowDef::new("quarterly-review", "alice", steps);

        let mut runner = WorkflowRunner::new(Arc::clone(&kernel), def).unwrap();
        let gate_kernel = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            let effect = CountingEffect::new(json!({"summary": "done"}));
            let status = runner.run_to_completion(&effect).await?;
            Ok::<_, WardenError>((status, runner.workflow().completed.len()))
        });

        let pending_id = wait_for_pending(&gate_kernel).await;
        gate_kernel
            .gate()
            .resolve(
                pending_id,
                ResolveDecision::Approve,
                &SessionActor::new("bob", ActorRole::Approver),
                None,
            )
            .unwrap();

        let (status, completed) = handle.await.unwrap().unwrap();
        assert_eq!(status, WorkflowStatus::Complete);
        assert_eq!(completed, 3);
    }

    #[tokio::test]
    async fn test_denied_gate_fails_critical_step() {
        let kernel = Arc::new(Kernel::from_config(&base_config()).unwrap());
        let mut steps = vec![
            step(0, Phase::Intake, "docs.collect"),
            step(1, Phase::Delivery, "funds.transfer"),
        ];
        steps[1].requires_approval = true;
        steps[1].critical = true;
        let def = WorkflowDef::new("payout", "alice", steps);

        let mut runner = WorkflowRunner::new(Arc::clone(&kernel), def).unwrap();
        let gate_kernel = Arc::clone(&kernel);
        let handle = tokio::spawn(async move {
            let effect = CountingEffect::new(json!({"summary": "ok"}));
            runner.run_to_completion(&effect).await
        });

        let pending_id = wait_for_pending(&gate_kernel).await;
        gate_kernel
            .gate()
            .resolve(
                pending_id,
                ResolveDecision::Deny {
                    reason: "amount too large".into(),
                },
                &SessionActor::new("bob", ActorRole::Approver),
                None,
            )
            .unwrap();

        let status = handle.await.unwrap().unwrap();
        assert_eq!(status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_discovery_step_populates_registry() {
        let kernel = Arc::new(Kernel::from_config(&base_config()).unwrap());
        let mut steps = vec![
            step(0, Phase::Analysis, "docs.analyze"),
            step(1, Phase::Delivery, "report.publish"),
        ];
        steps[0].discovery_enabled = true;
        let def = WorkflowDef::new("audit-sweep", "alice", steps);

        let effect = CountingEffect::new(json!({
            "summary": "two anomalies",
            "findings": [
                {"subject": "duplicate invoice", "viability": "confirmed", "magnitude": 1200.0},
                {"subject": "odd vendor", "viability": "speculative"}
            ]
        }));

        let mut runner = WorkflowRunner::new(kernel, def).unwrap();
        let status = runner.run_to_completion(&effect).await.unwrap();

        assert_eq!(status, WorkflowStatus::Complete);
        let registry = &runner.workflow().registry;
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.summary().by_viability[&Viability::Confirmed], 1);
        assert!((registry.summary().total_magnitude - 1200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_noncritical_denial_degrades() {
        let mut config = base_config();
        config.policy.rules = vec![RuleSpec {
            id: "no-mail".into(),
            action_kinds: vec!["mail.send".into()],
            decision: Decision::Deny,
            ..Default::default()
        }];
        let kernel = Arc::new(Kernel::from_config(&config).unwrap());
        let def = WorkflowDef::new(
            "notify",
            "alice",
            vec![
                step(0, Phase::Intake, "docs.collect"),
                step(1, Phase::Delivery, "mail.send"),
                step(2, Phase::Delivery, "report.publish"),
            ],
        );

        let effect = CountingEffect::new(json!({"summary": "ok"}));
        let mut runner = WorkflowRunner::new(kernel, def).unwrap();
        let status = runner.run_to_completion(&effect).await.unwrap();

        assert_eq!(status, WorkflowStatus::Complete);
        let wf = runner.workflow();
        assert_eq!(wf.completed.len(), 2);
        assert_eq!(wf.errors.len(), 1);
        assert!(!wf.errors[0].fatal);
    }
}
