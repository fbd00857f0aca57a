use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_core::{Result, WardenError};

use crate::definition::{Phase, WorkflowDef};
use crate::registry::{Finding, Registry};

/// Where a workflow is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    /// Parked at an approval gate for the current step.
    AwaitingApproval,
    Complete,
    Failed,
    Stopped,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Stopped)
    }
}

/// Record of one finished step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    pub order: usize,
    pub actor_id: String,
    pub task: String,
    pub output: String,
    pub completed_at: DateTime<Utc>,
    pub findings_recorded: usize,
}

/// A step failure recorded against the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowError {
    pub step_order: usize,
    pub message: String,
    pub at: DateTime<Utc>,
    /// Whether this failure halted the workflow.
    pub fatal: bool,
}

/// Live state of one workflow run.
///
/// Mutated only one step at a time: `advance` on success, `fail_step` on
/// failure, `stop` for an explicit halt. Terminal once all steps complete or
/// the workflow is stopped/failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub def: WorkflowDef,
    pub current_step: usize,
    pub phase: Phase,
    pub status: WorkflowStatus,
    pub completed: Vec<CompletedStep>,
    pub errors: Vec<WorkflowError>,
    pub registry: Registry,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Start a workflow from a validated definition.
    pub fn start(def: WorkflowDef) -> Result<Self> {
        def.validate()?;
        let phase = def.steps[0].phase;
        info!(workflow = %def.name, steps = def.steps.len(), "workflow started");
        Ok(Self {
            def,
            current_step: 0,
            phase,
            status: WorkflowStatus::Running,
            completed: Vec::new(),
            errors: Vec::new(),
            registry: Registry::new(),
            started_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    pub fn total_steps(&self) -> usize {
        self.def.steps.len()
    }

    /// The step the engine is currently on, or `None` once terminal.
    pub fn current_step_def(&self) -> Option<&crate::definition::StepDef> {
        if self.status.is_terminal() {
            return None;
        }
        self.def.steps.get(self.current_step)
    }

    /// Complete the current step and move the cursor forward.
    ///
    /// Findings are merged into the registry only for discovery-enabled
    /// steps; an empty list is valid and common. Supplying findings on a
    /// step without discovery is a caller bug and is rejected.
    pub fn advance(&mut self, output: impl Into<String>, findings: Vec<Finding>) -> Result<()> {
        let step = self
            .current_step_def()
            .ok_or_else(|| WardenError::Workflow("workflow is not running".into()))?
            .clone();

        if !step.discovery_enabled && !findings.is_empty() {
            return Err(WardenError::Workflow(format!(
                "step {} of '{}' does not accept discoveries",
                step.order, self.def.name
            )));
        }

        let findings_recorded = findings.len();
        for finding in findings {
            self.registry.append(finding);
        }

        self.completed.push(CompletedStep {
            order: step.order,
            actor_id: step.actor_id.clone(),
            task: step.task.clone(),
            output: output.into(),
            completed_at: Utc::now(),
            findings_recorded,
        });

        self.current_step += 1;
        self.recompute_position();
        info!(
            workflow = %self.def.name,
            step = step.order,
            findings = findings_recorded,
            phase = %self.phase,
            "step completed"
        );
        Ok(())
    }

    /// Record a step failure. Critical steps halt the workflow; non-critical
    /// ones degrade gracefully and the engine moves on.
    pub fn fail_step(&mut self, message: impl Into<String>) -> Result<()> {
        let step = self
            .current_step_def()
            .ok_or_else(|| WardenError::Workflow("workflow is not running".into()))?
            .clone();
        let message = message.into();
        let fatal = step.critical;

        self.errors.push(WorkflowError {
            step_order: step.order,
            message: message.clone(),
            at: Utc::now(),
            fatal,
        });

        if fatal {
            warn!(
                workflow = %self.def.name,
                step = step.order,
                error = %message,
                "critical step failed, halting workflow"
            );
            self.status = WorkflowStatus::Failed;
        } else {
            warn!(
                workflow = %self.def.name,
                step = step.order,
                error = %message,
                "step failed, continuing"
            );
            self.current_step += 1;
            self.recompute_position();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Explicitly stop the workflow. Terminal; already-completed steps and
    /// audit records are untouched.
    pub fn stop(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(workflow = %self.def.name, %reason, "workflow stopped");
        self.errors.push(WorkflowError {
            step_order: self.current_step,
            message: format!("stopped: {reason}"),
            at: Utc::now(),
            fatal: true,
        });
        self.status = WorkflowStatus::Stopped;
        self.updated_at = Utc::now();
    }

    /// Fraction of steps completed, 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        let total = self.total_steps() as f32;
        if total == 0.0 {
            return 0.0;
        }
        self.completed.len() as f32 / total
    }

    fn recompute_position(&mut self) {
        if self.current_step >= self.total_steps() {
            self.status = WorkflowStatus::Complete;
        } else {
            self.phase = self.def.steps[self.current_step].phase;
            if self.status == WorkflowStatus::AwaitingApproval {
                self.status = WorkflowStatus::Running;
            }
        }
        self.updated_at = Utc::now();
    }
}
