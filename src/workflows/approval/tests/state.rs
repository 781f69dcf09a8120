use super::common::fixed_now;
use crate::workflows::approval::domain::{
    ApplicationPhase, ApplicationState, ApprovalLevelId, WorkflowStageId, WorkflowVersionId,
};
use crate::workflows::approval::schema::{ApprovalLevel, StageType, WorkflowStage};
use crate::workflows::approval::state::{
    ApprovalsStage, Direction, StageSnapshot, StateError, StateMachine,
};

const SUBMIT: WorkflowStageId = WorkflowStageId(1);
const REVIEW: WorkflowStageId = WorkflowStageId(2);
const DONE: WorkflowStageId = WorkflowStageId(3);

const LEVEL_ONE: ApprovalLevelId = ApprovalLevelId(11);
const LEVEL_TWO: ApprovalLevelId = ApprovalLevelId(12);
const LEVEL_THREE: ApprovalLevelId = ApprovalLevelId(13);

fn stage(id: WorkflowStageId, stage_type: StageType, ordinal: u32) -> WorkflowStage {
    WorkflowStage {
        id,
        workflow_version_id: WorkflowVersionId(5),
        name: stage_type.label().to_string(),
        stage_type,
        ordinal,
        updated_at: fixed_now(),
    }
}

fn level(id: ApprovalLevelId, ordinal: u32, active: bool) -> ApprovalLevel {
    ApprovalLevel {
        id,
        stage_id: REVIEW,
        name: format!("Level {ordinal}"),
        ordinal,
        active,
        is_default: ordinal == 1,
        updated_at: fixed_now(),
    }
}

fn snapshots() -> Vec<StageSnapshot> {
    vec![
        StageSnapshot {
            stage: stage(SUBMIT, StageType::FormSubmission, 1),
            levels: Vec::new(),
        },
        StageSnapshot {
            stage: stage(REVIEW, StageType::Approvals, 2),
            levels: vec![
                level(LEVEL_ONE, 1, true),
                level(LEVEL_TWO, 2, false),
                level(LEVEL_THREE, 3, true),
            ],
        },
        StageSnapshot {
            stage: stage(DONE, StageType::Finished, 3),
            levels: Vec::new(),
        },
    ]
}

fn at(stage_id: WorkflowStageId, level: Option<ApprovalLevelId>, phase: ApplicationPhase) -> ApplicationState {
    ApplicationState {
        stage_id,
        approval_level_id: level,
        phase,
    }
}

#[test]
fn applications_start_in_draft_on_the_form_stage() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);

    let state = machine.on_application_start().expect("start");

    assert_eq!(state, at(SUBMIT, None, ApplicationPhase::Draft));
}

#[test]
fn start_rejects_a_version_without_stages() {
    let stages: Vec<StageSnapshot> = Vec::new();
    let machine = StateMachine::new(&stages);
    assert_eq!(machine.on_application_start().unwrap_err(), StateError::EmptyVersion);
}

#[test]
fn start_rejects_a_version_that_opens_with_approvals() {
    let stages = vec![StageSnapshot {
        stage: stage(REVIEW, StageType::Approvals, 1),
        levels: vec![level(LEVEL_ONE, 1, true)],
    }];
    let machine = StateMachine::new(&stages);

    let error = machine.on_application_start().unwrap_err();

    assert_eq!(
        error,
        StateError::StartOnNonFormStage {
            found: StageType::Approvals.label()
        }
    );
}

#[test]
fn next_enters_the_first_active_level() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let draft = at(SUBMIT, None, ApplicationPhase::Draft);

    let next = machine.advance(&draft, Direction::Next).expect("advance");

    assert_eq!(next, at(REVIEW, Some(LEVEL_ONE), ApplicationPhase::InProgress));
}

#[test]
fn next_skips_inactive_levels() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(REVIEW, Some(LEVEL_ONE), ApplicationPhase::InProgress);

    let next = machine.advance(&current, Direction::Next).expect("advance");

    assert_eq!(next, at(REVIEW, Some(LEVEL_THREE), ApplicationPhase::InProgress));
}

#[test]
fn next_past_the_last_level_completes_the_workflow() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(REVIEW, Some(LEVEL_THREE), ApplicationPhase::InProgress);

    let next = machine.advance(&current, Direction::Next).expect("advance");

    assert_eq!(next, at(DONE, None, ApplicationPhase::Completed));
}

#[test]
fn next_at_the_finished_stage_is_rejected() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(DONE, None, ApplicationPhase::Completed);

    let error = machine.advance(&current, Direction::Next).unwrap_err();

    assert_eq!(error, StateError::EndOfWorkflow);
}

#[test]
fn previous_walks_back_through_active_levels() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(REVIEW, Some(LEVEL_THREE), ApplicationPhase::InProgress);

    let previous = machine.advance(&current, Direction::Previous).expect("advance");

    assert_eq!(previous, at(REVIEW, Some(LEVEL_ONE), ApplicationPhase::InProgress));
}

#[test]
fn previous_from_the_first_level_reopens_the_form_stage() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(REVIEW, Some(LEVEL_ONE), ApplicationPhase::InProgress);

    let previous = machine.advance(&current, Direction::Previous).expect("advance");

    assert_eq!(previous, at(SUBMIT, None, ApplicationPhase::Draft));
}

#[test]
fn previous_from_the_finished_stage_reenters_the_review_stage() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(DONE, None, ApplicationPhase::Completed);

    let previous = machine.advance(&current, Direction::Previous).expect("advance");

    assert_eq!(previous, at(REVIEW, Some(LEVEL_ONE), ApplicationPhase::InProgress));
}

#[test]
fn previous_at_the_first_stage_is_rejected() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(SUBMIT, None, ApplicationPhase::Draft);

    let error = machine.advance(&current, Direction::Previous).unwrap_err();

    assert_eq!(error, StateError::StartOfWorkflow);
}

#[test]
fn foreign_stage_is_rejected() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(WorkflowStageId(99), None, ApplicationPhase::Draft);

    let error = machine.advance(&current, Direction::Next).unwrap_err();

    assert_eq!(error, StateError::UnknownStage(WorkflowStageId(99)));
}

#[test]
fn foreign_level_is_rejected() {
    let stages = snapshots();
    let machine = StateMachine::new(&stages);
    let current = at(REVIEW, Some(ApprovalLevelId(99)), ApplicationPhase::InProgress);

    let error = machine.advance(&current, Direction::Next).unwrap_err();

    assert_eq!(error, StateError::UnknownLevel(ApprovalLevelId(99)));
}

#[test]
#[should_panic(expected = "non-approvals stage")]
fn approvals_navigation_rejects_other_stage_types() {
    let snapshot = StageSnapshot {
        stage: stage(SUBMIT, StageType::FormSubmission, 1),
        levels: Vec::new(),
    };
    let _ = ApprovalsStage::new(&snapshot);
}
