//! Workflow engine tests: advancement, phase tracking, failure handling,
//! and finding registration.

use warden_workflow::{
    Finding, Phase, StepDef, Viability, Workflow, WorkflowDef, WorkflowStatus,
};

fn step(order: usize, phase: Phase) -> StepDef {
    StepDef {
        order,
        phase,
        actor_id: format!("agent-{order}"),
        action_kind: "docs.analyze".into(),
        task: format!("task {order}"),
        requires_approval: false,
        discovery_enabled: false,
        critical: false,
    }
}

fn three_step_def() -> WorkflowDef {
    WorkflowDef::new(
        "review",
        "alice",
        vec![
            step(0, Phase::Intake),
            step(1, Phase::Analysis),
            step(2, Phase::Delivery),
        ],
    )
}

mod advancement {
    use super::*;

    #[test]
    fn test_runs_to_completion() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Running);
        assert_eq!(wf.phase, Phase::Intake);

        wf.advance("intake done", vec![]).unwrap();
        assert_eq!(wf.phase, Phase::Analysis);
        assert_eq!(wf.current_step, 1);

        wf.advance("analysis done", vec![]).unwrap();
        assert_eq!(wf.phase, Phase::Delivery);

        wf.advance("delivered", vec![]).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Complete);
        assert_eq!(wf.completed.len(), 3);
        assert!((wf.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_advance_after_terminal_rejected() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        wf.stop("operator abort");
        assert!(wf.advance("late", vec![]).is_err());
    }

    #[test]
    fn test_completed_steps_record_output() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        wf.advance("summary: 12 documents", vec![]).unwrap();
        assert_eq!(wf.completed[0].output, "summary: 12 documents");
        assert_eq!(wf.completed[0].actor_id, "agent-0");
    }

    #[test]
    fn test_awaiting_approval_clears_on_advance() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        wf.status = WorkflowStatus::AwaitingApproval;
        wf.advance("approved and done", vec![]).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Running);
    }
}

mod failures {
    use super::*;

    #[test]
    fn test_critical_failure_halts() {
        let mut def = three_step_def();
        def.steps[1].critical = true;
        let mut wf = Workflow::start(def).unwrap();

        wf.advance("ok", vec![]).unwrap();
        wf.fail_step("upstream timeout").unwrap();

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.errors.len(), 1);
        assert!(wf.errors[0].fatal);
        assert!(wf.advance("too late", vec![]).is_err());
    }

    #[test]
    fn test_noncritical_failure_continues() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        wf.fail_step("flaky fetch").unwrap();

        assert_eq!(wf.status, WorkflowStatus::Running);
        assert_eq!(wf.current_step, 1);
        assert_eq!(wf.errors.len(), 1);
        assert!(!wf.errors[0].fatal);

        wf.advance("ok", vec![]).unwrap();
        wf.advance("ok", vec![]).unwrap();
        assert_eq!(wf.status, WorkflowStatus::Complete);
        // only two steps actually completed
        assert_eq!(wf.completed.len(), 2);
    }

    #[test]
    fn test_stop_is_terminal() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        wf.advance("ok", vec![]).unwrap();
        wf.stop("budget exhausted");

        assert_eq!(wf.status, WorkflowStatus::Stopped);
        assert_eq!(wf.completed.len(), 1);
        assert!(wf.current_step_def().is_none());
        assert!(wf.fail_step("after stop").is_err());
    }
}

mod findings {
    use super::*;

    #[test]
    fn test_discovery_step_records_findings() {
        let mut def = three_step_def();
        def.steps[1].discovery_enabled = true;
        let mut wf = Workflow::start(def).unwrap();

        wf.advance("ok", vec![]).unwrap();
        wf.advance(
            "found anomalies",
            vec![
                Finding::new("agent-1", "duplicate invoice", Viability::Confirmed, 950.0),
                Finding::new("agent-1", "stale vendor record", Viability::Speculative, 0.0),
            ],
        )
        .unwrap();

        assert_eq!(wf.registry.len(), 2);
        assert_eq!(wf.registry.summary().by_viability[&Viability::Confirmed], 1);
        assert_eq!(wf.completed[1].findings_recorded, 2);
    }

    #[test]
    fn test_findings_on_non_discovery_step_rejected() {
        let mut wf = Workflow::start(three_step_def()).unwrap();
        let err = wf.advance(
            "sneaky",
            vec![Finding::new("agent-0", "x", Viability::Probable, 1.0)],
        );
        assert!(err.is_err());
        // the step did not complete
        assert_eq!(wf.current_step, 0);
        assert!(wf.registry.is_empty());
    }

    #[test]
    fn test_registry_survives_step_failures() {
        let mut def = three_step_def();
        def.steps[0].discovery_enabled = true;
        let mut wf = Workflow::start(def).unwrap();

        wf.advance(
            "ok",
            vec![Finding::new("agent-0", "early find", Viability::Probable, 10.0)],
        )
        .unwrap();
        wf.fail_step("soft error").unwrap();

        assert_eq!(wf.registry.len(), 1);
        assert_eq!(wf.registry.findings()[0].subject, "early find");
    }
}
