//! Application state machine over a workflow version's ordered stages.
//!
//! Stage behavior is dispatched by an explicit match on `StageType`; each
//! variant is a small set of pure functions. Entry/exit hooks emit tracing
//! events, the boundary where the host records activity/audit entries.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{ApplicationPhase, ApplicationState, ApprovalLevelId, WorkflowStageId};
use super::schema::{ApprovalLevel, StageType, WorkflowStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("workflow version has no stages")]
    EmptyVersion,
    #[error("applications may only start on a form submission stage, found {found}")]
    StartOnNonFormStage { found: &'static str },
    #[error("stage {0:?} is not part of this workflow version")]
    UnknownStage(WorkflowStageId),
    #[error("approval level {0:?} is not part of this stage")]
    UnknownLevel(ApprovalLevelId),
    #[error("application is already at the final state")]
    EndOfWorkflow,
    #[error("application is already at the initial state")]
    StartOfWorkflow,
}

/// A stage together with its ordered approval levels (empty for stages that
/// are not approvals-typed).
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: WorkflowStage,
    pub levels: Vec<ApprovalLevel>,
}

/// Level navigation for an approvals stage. Constructing this against any
/// other stage type is a caller bug.
pub(crate) struct ApprovalsStage<'a> {
    snapshot: &'a StageSnapshot,
}

impl<'a> ApprovalsStage<'a> {
    pub(crate) fn new(snapshot: &'a StageSnapshot) -> Self {
        assert!(
            snapshot.stage.stage_type == StageType::Approvals,
            "ApprovalsStage constructed for a non-approvals stage"
        );
        Self { snapshot }
    }

    fn active_levels(&self) -> impl Iterator<Item = &ApprovalLevel> {
        self.snapshot.levels.iter().filter(|level| level.active)
    }

    pub(crate) fn first_level(&self) -> Option<&ApprovalLevel> {
        self.active_levels().min_by_key(|level| level.ordinal)
    }

    fn ordinal_of(&self, id: ApprovalLevelId) -> Result<u32, StateError> {
        self.snapshot
            .levels
            .iter()
            .find(|level| level.id == id)
            .map(|level| level.ordinal)
            .ok_or(StateError::UnknownLevel(id))
    }

    pub(crate) fn level_after(
        &self,
        id: ApprovalLevelId,
    ) -> Result<Option<&ApprovalLevel>, StateError> {
        let ordinal = self.ordinal_of(id)?;
        Ok(self
            .active_levels()
            .filter(|level| level.ordinal > ordinal)
            .min_by_key(|level| level.ordinal))
    }

    pub(crate) fn level_before(
        &self,
        id: ApprovalLevelId,
    ) -> Result<Option<&ApprovalLevel>, StateError> {
        let ordinal = self.ordinal_of(id)?;
        Ok(self
            .active_levels()
            .filter(|level| level.ordinal < ordinal)
            .max_by_key(|level| level.ordinal))
    }
}

pub struct StateMachine<'a> {
    stages: &'a [StageSnapshot],
}

impl<'a> StateMachine<'a> {
    /// `stages` must be ordered by stage ordinal.
    pub fn new(stages: &'a [StageSnapshot]) -> Self {
        Self { stages }
    }

    /// Applications may only start in a form-submission stage.
    pub fn on_application_start(&self) -> Result<ApplicationState, StateError> {
        let first = self.stages.first().ok_or(StateError::EmptyVersion)?;
        if first.stage.stage_type != StageType::FormSubmission {
            return Err(StateError::StartOnNonFormStage {
                found: first.stage.stage_type.label(),
            });
        }
        let state = self.initial_state(first);
        self.on_state_entry(&state);
        Ok(state)
    }

    pub fn initial_state(&self, snapshot: &StageSnapshot) -> ApplicationState {
        let (approval_level_id, phase) = match snapshot.stage.stage_type {
            StageType::FormSubmission => (None, ApplicationPhase::Draft),
            StageType::Approvals => (
                ApprovalsStage::new(snapshot)
                    .first_level()
                    .map(|level| level.id),
                ApplicationPhase::InProgress,
            ),
            StageType::Finished => (None, ApplicationPhase::Completed),
        };
        ApplicationState {
            stage_id: snapshot.stage.id,
            approval_level_id,
            phase,
        }
    }

    pub fn advance(
        &self,
        current: &ApplicationState,
        direction: Direction,
    ) -> Result<ApplicationState, StateError> {
        match direction {
            Direction::Next => self.next_state(current),
            Direction::Previous => self.previous_state(current),
        }
    }

    pub fn next_state(&self, current: &ApplicationState) -> Result<ApplicationState, StateError> {
        let (index, snapshot) = self.locate(current.stage_id)?;
        let next = match snapshot.stage.stage_type {
            StageType::FormSubmission => self.initial_of_stage_after(index)?,
            StageType::Approvals => {
                let approvals = ApprovalsStage::new(snapshot);
                let following = match current.approval_level_id {
                    Some(level) => approvals.level_after(level)?,
                    None => approvals.first_level(),
                };
                match following {
                    Some(level) => ApplicationState {
                        stage_id: snapshot.stage.id,
                        approval_level_id: Some(level.id),
                        phase: ApplicationPhase::InProgress,
                    },
                    None => self.initial_of_stage_after(index)?,
                }
            }
            StageType::Finished => return Err(StateError::EndOfWorkflow),
        };
        self.on_state_exit(current);
        self.on_state_entry(&next);
        Ok(next)
    }

    pub fn previous_state(
        &self,
        current: &ApplicationState,
    ) -> Result<ApplicationState, StateError> {
        let (index, snapshot) = self.locate(current.stage_id)?;
        let previous = match snapshot.stage.stage_type {
            StageType::Approvals => {
                let approvals = ApprovalsStage::new(snapshot);
                let preceding = match current.approval_level_id {
                    Some(level) => approvals.level_before(level)?,
                    None => None,
                };
                match preceding {
                    Some(level) => ApplicationState {
                        stage_id: snapshot.stage.id,
                        approval_level_id: Some(level.id),
                        phase: ApplicationPhase::InProgress,
                    },
                    None => self.initial_of_stage_before(index)?,
                }
            }
            StageType::FormSubmission | StageType::Finished => {
                self.initial_of_stage_before(index)?
            }
        };
        self.on_state_exit(current);
        self.on_state_entry(&previous);
        Ok(previous)
    }

    pub fn on_state_entry(&self, state: &ApplicationState) {
        info!(
            stage = state.stage_id.0,
            level = state.approval_level_id.map(|id| id.0),
            phase = state.phase.label(),
            "application entered state"
        );
    }

    pub fn on_state_exit(&self, state: &ApplicationState) {
        info!(
            stage = state.stage_id.0,
            level = state.approval_level_id.map(|id| id.0),
            phase = state.phase.label(),
            "application left state"
        );
    }

    fn locate(&self, stage: WorkflowStageId) -> Result<(usize, &StageSnapshot), StateError> {
        self.stages
            .iter()
            .enumerate()
            .find(|(_, snapshot)| snapshot.stage.id == stage)
            .ok_or(StateError::UnknownStage(stage))
    }

    fn initial_of_stage_after(&self, index: usize) -> Result<ApplicationState, StateError> {
        self.stages
            .get(index + 1)
            .map(|snapshot| self.initial_state(snapshot))
            .ok_or(StateError::EndOfWorkflow)
    }

    fn initial_of_stage_before(&self, index: usize) -> Result<ApplicationState, StateError> {
        if index == 0 {
            return Err(StateError::StartOfWorkflow);
        }
        Ok(self.initial_state(&self.stages[index - 1]))
    }
}
