use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApprovalLevelId, AssignmentType, WorkflowId, WorkflowStageId, WorkflowVersionId,
};
use super::ordinal::OrdinalItem;

/// Stage behavior variants. Dispatch is an explicit match per variant in the
/// state machine rather than trait objects; each variant is a small set of
/// pure functions keyed by this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    FormSubmission,
    Approvals,
    Finished,
}

impl StageType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FormSubmission => "Form submission",
            Self::Approvals => "Approvals",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub assignment_type: AssignmentType,
    pub active_version: Option<WorkflowVersionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: WorkflowVersionId,
    pub workflow_id: WorkflowId,
}

/// An ordered stage within a workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: WorkflowStageId,
    pub workflow_version_id: WorkflowVersionId,
    pub name: String,
    pub stage_type: StageType,
    pub ordinal: u32,
    pub updated_at: DateTime<Utc>,
}

impl OrdinalItem for WorkflowStage {
    fn item_id(&self) -> u64 {
        self.id.0
    }

    fn scope_id(&self) -> u64 {
        self.workflow_version_id.0
    }

    fn ordinal(&self) -> u32 {
        self.ordinal
    }

    fn set_ordinal(&mut self, ordinal: u32) {
        self.ordinal = ordinal;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// An ordered sign-off checkpoint within an approvals stage.
///
/// Every approvals stage keeps at least one level; the first-created level is
/// the stage default and can only be deactivated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub id: ApprovalLevelId,
    pub stage_id: WorkflowStageId,
    pub name: String,
    pub ordinal: u32,
    pub active: bool,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

impl OrdinalItem for ApprovalLevel {
    fn item_id(&self) -> u64 {
        self.id.0
    }

    fn scope_id(&self) -> u64 {
        self.stage_id.0
    }

    fn ordinal(&self) -> u32 {
        self.ordinal
    }

    fn set_ordinal(&mut self, ordinal: u32) {
        self.ordinal = ordinal;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
