use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use warden_core::{ActionRequest, ActorRole, Classification, Result, WardenError};
use warden_workflow::{Finding, Viability, Workflow, WorkflowDef, WorkflowStatus};

use crate::kernel::Kernel;
use crate::providers::EffectProvider;

/// A finding as reported in an effect's output, before attribution.
#[derive(Debug, Deserialize)]
struct ReportedFinding {
    subject: String,
    viability: Viability,
    #[serde(default)]
    magnitude: f64,
    #[serde(default)]
    citations: Vec<String>,
}

/// Drives a workflow through the kernel, one governed step at a time.
///
/// Each step becomes an [`ActionRequest`]; steps marked `requires_approval`
/// are submitted with the mandatory classification so the kernel parks them
/// at the approval gate. Step failures feed back into the workflow's own
/// critical/non-critical handling instead of aborting the run.
pub struct WorkflowRunner {
    kernel: Arc<Kernel>,
    workflow: Workflow,
}

impl WorkflowRunner {
    pub fn new(kernel: Arc<Kernel>, def: WorkflowDef) -> Result<Self> {
        Ok(Self {
            kernel,
            workflow: Workflow::start(def)?,
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn status(&self) -> WorkflowStatus {
        self.workflow.status
    }

    /// Execute the current step through the kernel and fold the outcome back
    /// into the workflow. Returns the workflow's status after the step.
    pub async fn run_step(&mut self, effect: &dyn EffectProvider) -> Result<WorkflowStatus> {
        let step = self
            .workflow
            .current_step_def()
            .cloned()
            .ok_or_else(|| WardenError::Workflow("workflow is not running".into()))?;

        let classification = if step.requires_approval {
            Classification::Mandatory
        } else {
            Classification::Internal
        };
        let request = ActionRequest::new(
            step.actor_id.clone(),
            ActorRole::Agent,
            step.action_kind.clone(),
            format!("workflow:{}/step/{}", self.workflow.def.name, step.order),
            classification,
            json!({ "task": step.task }),
        );

        if step.requires_approval {
            self.workflow.status = WorkflowStatus::AwaitingApproval;
            info!(
                workflow = %self.workflow.def.name,
                step = step.order,
                "step awaiting human approval"
            );
        }

        let result = self
            .kernel
            .execute_in_session(
                request,
                effect,
                Some(self.workflow.def.id),
                &self.workflow.def.initiator_id,
            )
            .await;

        match result {
            Ok(output) => {
                let findings = if step.discovery_enabled {
                    extract_findings(&output, &step.actor_id)
                } else {
                    Vec::new()
                };
                let summary = output
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| output.to_string());
                self.workflow.advance(summary, findings)?;
            }
            Err(e) => {
                warn!(
                    workflow = %self.workflow.def.name,
                    step = step.order,
                    error = %e,
                    "step rejected or failed"
                );
                // Restore from the approval park before recording the failure.
                if self.workflow.status == WorkflowStatus::AwaitingApproval {
                    self.workflow.status = WorkflowStatus::Running;
                }
                self.workflow.fail_step(e.to_string())?;
            }
        }

        if self.workflow.status.is_terminal() {
            self.kernel.gate().clear_session(self.workflow.def.id);
        }
        Ok(self.workflow.status)
    }

    /// Run steps until the workflow reaches a terminal status.
    pub async fn run_to_completion(
        &mut self,
        effect: &dyn EffectProvider,
    ) -> Result<WorkflowStatus> {
        while !self.workflow.status.is_terminal() {
            self.run_step(effect).await?;
        }
        Ok(self.workflow.status)
    }

    /// Stop the workflow and surface the final state.
    pub fn stop(&mut self, reason: impl Into<String>) -> WorkflowStatus {
        self.workflow.stop(reason);
        self.kernel.gate().clear_session(self.workflow.def.id);
        self.workflow.status
    }
}

/// Pull reported findings out of an effect's output, attributing them to the
/// step's actor. Unparseable entries are dropped with a warning rather than
/// failing the step.
fn extract_findings(output: &Value, discovered_by: &str) -> Vec<Finding> {
    let Some(raw) = output.get("findings").and_then(Value::as_array) else {
        return Vec::new();
    };
    raw.iter()
        .filter_map(|v| match ReportedFinding::deserialize(v) {
            Ok(r) => {
                let mut finding =
                    Finding::new(discovered_by, r.subject, r.viability, r.magnitude);
                finding.citations = r.citations;
                Some(finding)
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed finding from effect output");
                None
            }
        })
        .collect()
}
