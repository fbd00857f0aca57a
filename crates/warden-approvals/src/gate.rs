use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::{ActionRequest, Classification, Result, SessionActor, WardenError};
use warden_ledger::{AuditEntry, AuditLedger, AuditOutcome, AuditPayload};

use crate::sod::SodPolicy;

/// A human decision on a pending approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveDecision {
    Approve,
    /// Deny, with the reason relayed to the waiting caller and the audit log.
    Deny { reason: String },
}

/// How a parked request came back from the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved {
        approver_id: String,
        attestation: Option<String>,
    },
    Denied {
        approver_id: String,
        reason: String,
    },
    TimedOut,
}

/// Notification pushed to the operator channel when a request is parked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub id: Uuid,
    pub action_kind: String,
    pub target: String,
    pub classification: Classification,
    /// Prompt for attestation gates; plain approval gates carry none.
    pub attestation_prompt: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub timeout_ms: u64,
}

/// Operator-facing view of one outstanding gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSummary {
    pub id: Uuid,
    pub action_kind: String,
    pub target: String,
    pub classification: Classification,
    pub initiator_id: String,
    pub requested_at: DateTime<Utc>,
}

/// The resolution pushed through the parked request's channel.
#[derive(Debug, Clone)]
enum Resolution {
    Approved {
        approver_id: String,
        attestation: Option<String>,
    },
    Denied {
        approver_id: String,
        reason: String,
    },
}

/// One parked request.
struct Pending {
    request: ActionRequest,
    /// Who started the workflow this gate belongs to; self-approval compares
    /// against this, not against the acting agent.
    initiator_id: String,
    workflow_session: Option<Uuid>,
    attestation_prompt: Option<String>,
    requested_at: DateTime<Utc>,
    responder: oneshot::Sender<Resolution>,
}

/// Tracks pending human decisions with timeout auto-deny and
/// separation-of-duties enforcement.
///
/// Each pending id resolves exactly once: resolve/timeout race through the
/// pending map, and whichever removes the entry owns the (single) audit
/// record for the resolution.
pub struct ApprovalGate {
    pending: Mutex<HashMap<Uuid, Pending>>,
    /// Approvers who already granted a gate, per workflow session.
    session_approvers: Mutex<HashMap<Uuid, HashSet<String>>>,
    sod: SodPolicy,
    ledger: Arc<AuditLedger>,
    notice_tx: mpsc::Sender<ApprovalNotice>,
    notice_rx: Mutex<Option<mpsc::Receiver<ApprovalNotice>>>,
}

impl ApprovalGate {
    pub fn new(sod: SodPolicy, ledger: Arc<AuditLedger>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            pending: Mutex::new(HashMap::new()),
            session_approvers: Mutex::new(HashMap::new()),
            sod,
            ledger,
            notice_tx: tx,
            notice_rx: Mutex::new(Some(rx)),
        }
    }

    /// Take the notice receiver (used by the operator surface to listen for
    /// new approval requests). Can only be taken once.
    pub fn take_notice_receiver(&self) -> Option<mpsc::Receiver<ApprovalNotice>> {
        self.notice_rx.lock().take()
    }

    /// Outstanding gates, oldest first.
    pub fn pending(&self) -> Vec<PendingSummary> {
        let mut out: Vec<PendingSummary> = self
            .pending
            .lock()
            .iter()
            .map(|(id, p)| PendingSummary {
                id: *id,
                action_kind: p.request.action_kind.clone(),
                target: p.request.target.clone(),
                classification: p.request.classification,
                initiator_id: p.initiator_id.clone(),
                requested_at: p.requested_at,
            })
            .collect();
        out.sort_by_key(|s| s.requested_at);
        out
    }

    /// Park a request until a human resolves it or the timeout auto-denies.
    ///
    /// Suspends the caller — this is the one place a governed action
    /// legitimately blocks, bounded by `timeout`.
    pub async fn request_approval(
        &self,
        request: &ActionRequest,
        workflow_session: Option<Uuid>,
        initiator_id: &str,
        attestation_prompt: Option<String>,
        timeout: Duration,
    ) -> Result<ApprovalOutcome> {
        let id = Uuid::new_v4();
        self.request_approval_with_id(
            id,
            request,
            workflow_session,
            initiator_id,
            attestation_prompt,
            timeout,
        )
        .await
    }

    /// [`request_approval`](Self::request_approval) with a caller-chosen
    /// pending id, so the id can be published before the call suspends.
    pub async fn request_approval_with_id(
        &self,
        id: Uuid,
        request: &ActionRequest,
        workflow_session: Option<Uuid>,
        initiator_id: &str,
        attestation_prompt: Option<String>,
        timeout: Duration,
    ) -> Result<ApprovalOutcome> {
        let (responder, mut rx) = oneshot::channel();
        let requested_at = Utc::now();

        {
            let mut pending = self.pending.lock();
            pending.insert(
                id,
                Pending {
                    request: request.clone(),
                    initiator_id: initiator_id.to_string(),
                    workflow_session,
                    attestation_prompt: attestation_prompt.clone(),
                    requested_at,
                    responder,
                },
            );
        }

        info!(
            pending_id = %id,
            action_kind = %request.action_kind,
            target = %request.target,
            "requesting human approval"
        );

        // Advisory: an operator surface may or may not be listening.
        let _ = self.notice_tx.try_send(ApprovalNotice {
            id,
            action_kind: request.action_kind.clone(),
            target: request.target.clone(),
            classification: request.classification,
            attestation_prompt,
            requested_at,
            timeout_ms: timeout.as_millis() as u64,
        });

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(resolution)) => Ok(outcome_of(resolution)),
            Ok(Err(_closed)) => {
                // Responder dropped without resolving — fail secure.
                self.pending.lock().remove(&id);
                self.ledger.append(AuditPayload::from_request(
                    request,
                    AuditOutcome::ApprovalDenied,
                    "approval gate closed without resolution",
                ))?;
                Ok(ApprovalOutcome::Denied {
                    approver_id: String::new(),
                    reason: "gate closed".into(),
                })
            }
            Err(_elapsed) => {
                if self.pending.lock().remove(&id).is_some() {
                    // We own the timeout: exactly one audit record for it.
                    warn!(pending_id = %id, "approval request timed out, auto-denying");
                    self.ledger.append(AuditPayload::from_request(
                        request,
                        AuditOutcome::TimedOut,
                        "timeout",
                    ))?;
                    Ok(ApprovalOutcome::TimedOut)
                } else {
                    // A resolver claimed the entry right at the deadline; its
                    // signal is already in flight.
                    match rx.await {
                        Ok(resolution) => Ok(outcome_of(resolution)),
                        Err(_) => Ok(ApprovalOutcome::Denied {
                            approver_id: String::new(),
                            reason: "gate closed".into(),
                        }),
                    }
                }
            }
        }
    }

    /// Resolve a pending gate. Exactly one resolution per pending id —
    /// resolving twice (or after timeout) yields [`WardenError::PendingNotFound`].
    /// `attestation` accompanies approvals; denial reasons travel on
    /// [`ResolveDecision::Deny`].
    ///
    /// Separation-of-duties violations block the approval attempt and leave
    /// the gate pending for a different approver; the attempt itself is
    /// audited.
    pub fn resolve(
        &self,
        pending_id: Uuid,
        decision: ResolveDecision,
        approver: &SessionActor,
        attestation: Option<String>,
    ) -> Result<AuditEntry> {
        let claimed = {
            let mut pending = self.pending.lock();
            let entry = pending
                .get(&pending_id)
                .ok_or(WardenError::PendingNotFound { pending_id })?;

            if let Some(violation) = self.sod.check(
                &entry.request.action_kind,
                &entry.initiator_id,
                approver,
                &self.session_approvers_for(entry.workflow_session),
            ) {
                let audit = AuditPayload::from_request(
                    &entry.request,
                    AuditOutcome::Denied,
                    format!(
                        "separation of duties: {violation} (approver '{}')",
                        approver.id
                    ),
                );
                drop(pending);
                self.ledger.append(audit)?;
                return Err(WardenError::SeparationOfDuties {
                    approver_id: approver.id.clone(),
                    reason: violation.to_string(),
                });
            }

            if matches!(decision, ResolveDecision::Approve)
                && entry.attestation_prompt.is_some()
                && attestation.is_none()
            {
                return Err(WardenError::AttestationRequired { pending_id });
            }

            // Checks passed: claim the entry. Whoever removes it owns the
            // resolution.
            pending
                .remove(&pending_id)
                .ok_or(WardenError::PendingNotFound { pending_id })?
        };
        let session = claimed.workflow_session;
        let request = claimed.request;
        let responder = claimed.responder;

        let (outcome, reasoning, resolution) = match decision {
            ResolveDecision::Approve => {
                if let Some(s) = session {
                    self.session_approvers
                        .lock()
                        .entry(s)
                        .or_default()
                        .insert(approver.id.clone());
                }
                let mut reasoning =
                    format!("approved by '{}' ({})", approver.id, approver.role);
                if let Some(a) = &attestation {
                    reasoning.push_str(&format!("; attestation: {a}"));
                }
                (
                    AuditOutcome::ApprovalGranted,
                    reasoning,
                    Resolution::Approved {
                        approver_id: approver.id.clone(),
                        attestation: attestation.clone(),
                    },
                )
            }
            ResolveDecision::Deny { reason } => (
                AuditOutcome::ApprovalDenied,
                format!("denied by '{}' ({}): {reason}", approver.id, approver.role),
                Resolution::Denied {
                    approver_id: approver.id.clone(),
                    reason,
                },
            ),
        };

        let audit_entry =
            self.ledger
                .append(AuditPayload::from_request(&request, outcome, reasoning))?;

        info!(
            pending_id = %pending_id,
            approver = %approver.id,
            outcome = outcome.as_str(),
            "approval gate resolved"
        );

        if responder.send(resolution).is_err() {
            // Waiter gave up (cancelled) between our claim and this send.
            warn!(pending_id = %pending_id, "resolution had no waiting caller");
        }

        Ok(audit_entry)
    }

    /// Drop the four-eyes approver history for a finished workflow session.
    pub fn clear_session(&self, session: Uuid) {
        if self.session_approvers.lock().remove(&session).is_some() {
            info!(session = %session, "cleared session approver history");
        }
    }

    fn session_approvers_for(&self, session: Option<Uuid>) -> HashSet<String> {
        match session {
            Some(s) => self
                .session_approvers
                .lock()
                .get(&s)
                .cloned()
                .unwrap_or_default(),
            None => HashSet::new(),
        }
    }
}

fn outcome_of(resolution: Resolution) -> ApprovalOutcome {
    match resolution {
        Resolution::Approved {
            approver_id,
            attestation,
        } => ApprovalOutcome::Approved {
            approver_id,
            attestation,
        },
        Resolution::Denied {
            approver_id,
            reason,
        } => ApprovalOutcome::Denied {
            approver_id,
            reason,
        },
    }
}

