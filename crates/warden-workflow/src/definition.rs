use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use warden_core::{Result, WardenError};

/// The phases a workflow moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intake,
    Analysis,
    Strategy,
    Delivery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Intake => "intake",
            Self::Analysis => "analysis",
            Self::Strategy => "strategy",
            Self::Delivery => "delivery",
        };
        write!(f, "{s}")
    }
}

/// One step in a workflow template. Immutable once the workflow is defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub order: usize,
    pub phase: Phase,
    /// The agent assigned to perform the step.
    pub actor_id: String,
    /// The capability the step invokes, e.g. "docs.summarize".
    pub action_kind: String,
    /// Human-readable description of the work.
    pub task: String,
    /// Halt at the approval gate before this step commits.
    #[serde(default)]
    pub requires_approval: bool,
    /// Whether this step may surface findings into the registry.
    #[serde(default)]
    pub discovery_enabled: bool,
    /// A failure in this step halts the workflow instead of degrading.
    #[serde(default)]
    pub critical: bool,
}

/// An immutable workflow template: an ordered, phase-partitioned list of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub id: Uuid,
    pub name: String,
    /// Who started this workflow; approval gates compare approvers against
    /// this for self-approval checks.
    pub initiator_id: String,
    pub steps: Vec<StepDef>,
}

impl WorkflowDef {
    pub fn new(name: impl Into<String>, initiator_id: impl Into<String>, steps: Vec<StepDef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            initiator_id: initiator_id.into(),
            steps,
        }
    }

    /// Check that steps are contiguous from zero and phases never move
    /// backwards — phases must partition the step list in order.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(WardenError::Workflow(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }
        let mut last_phase = self.steps[0].phase;
        for (i, step) in self.steps.iter().enumerate() {
            if step.order != i {
                return Err(WardenError::Workflow(format!(
                    "workflow '{}': step at position {i} has order {}",
                    self.name, step.order
                )));
            }
            if step.phase < last_phase {
                return Err(WardenError::Workflow(format!(
                    "workflow '{}': phase {} regresses at step {i}",
                    self.name, step.phase
                )));
            }
            last_phase = step.phase;
        }
        Ok(())
    }
}
