use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::directory::Directory;
use super::domain::{
    Application, ApplicationId, ApprovalLevelId, ApproverId, ApproverRecord, Assignment,
    AssignmentId, AssignmentStatus, AssignmentType, HierarchyNodeId, JobAssignmentId, NewApprover,
    UserId, WorkflowId, WorkflowStageId, WorkflowVersionId,
};
use super::hierarchy::HierarchyProvider;
use super::inheritance::{InheritanceBuilder, InheritanceError, RebuildReport};
use super::ordinal::{self, OrdinalError};
use super::repository::{RebuildPlan, RepositoryError, WorkflowRepository};
use super::resolver::{ApproverResolver, ResolverError};
use super::schema::{ApprovalLevel, StageType, Workflow, WorkflowStage, WorkflowVersion};
use super::state::{Direction, StageSnapshot, StateError, StateMachine};

/// Error raised by the approval workflow service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Inheritance(#[from] InheritanceError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Ordinal(#[from] OrdinalError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("workflow {0:?} not found")]
    WorkflowNotFound(WorkflowId),
    #[error("workflow {0:?} has no active version")]
    NoActiveVersion(WorkflowId),
    #[error("workflow version {0:?} not found")]
    VersionNotFound(WorkflowVersionId),
    #[error("stage {0:?} not found")]
    StageNotFound(WorkflowStageId),
    #[error("approval level {0:?} not found")]
    LevelNotFound(ApprovalLevelId),
    #[error("assignment {0:?} not found")]
    AssignmentNotFound(AssignmentId),
    #[error("approver {0:?} not found")]
    ApproverNotFound(ApproverId),
    #[error("application {0:?} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("stage {0:?} is not an approvals stage")]
    NotAnApprovalsStage(WorkflowStageId),
    #[error("approval level {level:?} does not belong to workflow {workflow:?}")]
    LevelOutsideWorkflow {
        level: ApprovalLevelId,
        workflow: WorkflowId,
    },
    #[error("the default approval level {0:?} can only be deactivated, not deleted")]
    DefaultLevelUndeletable(ApprovalLevelId),
    #[error("approver {0:?} is inherited; remove the own row on its source assignment instead")]
    InheritedApproverImmutable(ApproverId),
}

/// Everything created when a workflow is first set up.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowSetup {
    pub workflow: Workflow,
    pub version: WorkflowVersion,
    pub default_assignment: Assignment,
}

/// Service composing the repository, hierarchy, and directory collaborators.
/// Callers serialize mutating operations per workflow version; every rebuild
/// is applied as one atomic plan.
pub struct ApprovalWorkflowService<R> {
    repository: Arc<R>,
    hierarchy: Arc<dyn HierarchyProvider>,
    directory: Arc<dyn Directory>,
}

impl<R> ApprovalWorkflowService<R>
where
    R: WorkflowRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        hierarchy: Arc<dyn HierarchyProvider>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            repository,
            hierarchy,
            directory,
        }
    }

    // --- workflow setup -------------------------------------------------

    /// Create a workflow with one active version and its default (root)
    /// assignment, already activated.
    pub fn create_workflow(
        &self,
        name: &str,
        assignment_type: AssignmentType,
        default_node: HierarchyNodeId,
    ) -> Result<WorkflowSetup, ServiceError> {
        let workflow_id = WorkflowId(self.repository.next_id());
        let version = WorkflowVersion {
            id: WorkflowVersionId(self.repository.next_id()),
            workflow_id,
        };
        let workflow = Workflow {
            id: workflow_id,
            name: name.to_string(),
            assignment_type,
            active_version: Some(version.id),
        };
        let default_assignment = Assignment {
            id: AssignmentId(self.repository.next_id()),
            workflow_id,
            assignment_type,
            node: default_node,
            is_default: true,
            status: AssignmentStatus::Active,
        };

        self.repository.insert_workflow(workflow.clone())?;
        self.repository.insert_version(version.clone())?;
        self.repository
            .insert_assignment(default_assignment.clone())?;

        info!(workflow = workflow_id.0, name, "workflow created");
        Ok(WorkflowSetup {
            workflow,
            version,
            default_assignment,
        })
    }

    /// Append a stage to a version. An approvals stage starts with its
    /// default "Level 1", which can never be deleted.
    pub fn add_stage(
        &self,
        version_id: WorkflowVersionId,
        name: &str,
        stage_type: StageType,
    ) -> Result<WorkflowStage, ServiceError> {
        let version = self.require_version(version_id)?;
        let siblings = self.repository.stages_for_version(version.id)?;
        let stage = WorkflowStage {
            id: WorkflowStageId(self.repository.next_id()),
            workflow_version_id: version.id,
            name: name.to_string(),
            stage_type,
            ordinal: ordinal::allocate(&siblings),
            updated_at: Utc::now(),
        };
        self.repository.insert_stage(stage.clone())?;

        if stage_type == StageType::Approvals {
            let level = ApprovalLevel {
                id: ApprovalLevelId(self.repository.next_id()),
                stage_id: stage.id,
                name: "Level 1".to_string(),
                ordinal: 1,
                active: true,
                is_default: true,
                updated_at: Utc::now(),
            };
            self.repository.insert_level(level)?;
        }
        Ok(stage)
    }

    // --- approval level management ---------------------------------------

    pub fn add_approval_level(
        &self,
        stage_id: WorkflowStageId,
        name: &str,
    ) -> Result<ApprovalLevel, ServiceError> {
        let stage = self.require_approvals_stage(stage_id)?;
        let siblings = self.repository.levels_for_stage(stage.id)?;
        let level = ApprovalLevel {
            id: ApprovalLevelId(self.repository.next_id()),
            stage_id: stage.id,
            name: name.to_string(),
            ordinal: ordinal::allocate(&siblings),
            active: true,
            is_default: false,
            updated_at: Utc::now(),
        };
        self.repository.insert_level(level.clone())?;
        Ok(level)
    }

    pub fn deactivate_approval_level(
        &self,
        level_id: ApprovalLevelId,
    ) -> Result<ApprovalLevel, ServiceError> {
        let mut level = self.require_level(level_id)?;
        if level.active {
            level.active = false;
            level.updated_at = Utc::now();
            self.repository.update_level(level.clone())?;
        }
        Ok(level)
    }

    /// Delete a non-default level, close the ordinal gap among its siblings,
    /// and drop every approver row configured against it.
    pub fn delete_approval_level(&self, level_id: ApprovalLevelId) -> Result<(), ServiceError> {
        let level = self.require_level(level_id)?;
        if level.is_default {
            return Err(ServiceError::DefaultLevelUndeletable(level_id));
        }
        let stage = self.require_stage(level.stage_id)?;
        let workflow_id = self.require_version(stage.workflow_version_id)?.workflow_id;

        let removed = self.repository.delete_level(level_id)?;
        let mut siblings = self.repository.levels_for_stage(stage.id)?;
        let before: Vec<(ApprovalLevelId, u32)> = siblings
            .iter()
            .map(|sibling| (sibling.id, sibling.ordinal))
            .collect();
        ordinal::close_gap(stage.id.0, &removed, &mut siblings, Utc::now())?;
        self.persist_changed_levels(&siblings, &before)?;

        let mut plan = RebuildPlan::default();
        for assignment in self.repository.assignments_for_workflow(workflow_id)? {
            for row in self.repository.approvers_at(assignment.id, level_id)? {
                plan.deletes.push(row.id);
            }
        }
        if !plan.is_empty() {
            self.repository.apply_rebuild(plan)?;
        }
        Ok(())
    }

    pub fn reorder_approval_levels(
        &self,
        stage_id: WorkflowStageId,
        new_order: &[ApprovalLevelId],
    ) -> Result<(), ServiceError> {
        let stage = self.require_approvals_stage(stage_id)?;
        let mut levels = self.repository.levels_for_stage(stage.id)?;
        let before: Vec<(ApprovalLevelId, u32)> = levels
            .iter()
            .map(|level| (level.id, level.ordinal))
            .collect();
        let ids: Vec<u64> = new_order.iter().map(|id| id.0).collect();
        ordinal::reorder(stage.id.0, &mut levels, &ids, Utc::now())?;
        self.persist_changed_levels(&levels, &before)?;
        Ok(())
    }

    pub fn reorder_stages(
        &self,
        version_id: WorkflowVersionId,
        new_order: &[WorkflowStageId],
    ) -> Result<(), ServiceError> {
        let version = self.require_version(version_id)?;
        let mut stages = self.repository.stages_for_version(version.id)?;
        let before: Vec<(WorkflowStageId, u32)> = stages
            .iter()
            .map(|stage| (stage.id, stage.ordinal))
            .collect();
        let ids: Vec<u64> = new_order.iter().map(|id| id.0).collect();
        ordinal::reorder(version.id.0, &mut stages, &ids, Utc::now())?;
        for stage in &stages {
            let unchanged = before
                .iter()
                .any(|(id, ord)| *id == stage.id && *ord == stage.ordinal);
            if !unchanged {
                self.repository.update_stage(stage.clone())?;
            }
        }
        Ok(())
    }

    // --- assignments ------------------------------------------------------

    /// Register an override assignment for a hierarchy node, in draft until
    /// explicitly activated. A workflow carries at most one assignment per
    /// node.
    pub fn create_assignment(
        &self,
        workflow_id: WorkflowId,
        node: HierarchyNodeId,
    ) -> Result<Assignment, ServiceError> {
        let workflow = self.require_workflow(workflow_id)?;
        if self.repository.assignment_at_node(workflow_id, node)?.is_some() {
            return Err(RepositoryError::Conflict.into());
        }
        let assignment = Assignment {
            id: AssignmentId(self.repository.next_id()),
            workflow_id,
            assignment_type: workflow.assignment_type,
            node,
            is_default: false,
            status: AssignmentStatus::Draft,
        };
        self.repository.insert_assignment(assignment.clone())?;
        Ok(assignment)
    }

    /// Activate an assignment and rebuild inheritance starting at its node.
    pub fn activate_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<RebuildReport, ServiceError> {
        let mut assignment = self.require_assignment(assignment_id)?;
        if assignment.status != AssignmentStatus::Active {
            assignment.status = AssignmentStatus::Active;
            self.repository.update_assignment(assignment.clone())?;
        }
        self.rebuild_at(&assignment)
    }

    // --- approvers --------------------------------------------------------

    /// Add an own approver row at (assignment, level). Any inherited rows at
    /// that node for the level are removed in the same atomic plan — an
    /// active set is never a mix of own and inherited — and the new own set
    /// is propagated to descendants lacking their own override.
    pub fn add_approver(
        &self,
        assignment_id: AssignmentId,
        level_id: ApprovalLevelId,
        approver: NewApprover,
    ) -> Result<ApproverRecord, ServiceError> {
        let assignment = self.require_assignment(assignment_id)?;
        let level = self.require_level(level_id)?;
        self.require_level_in_workflow(&level, assignment.workflow_id)?;

        let row = ApproverRecord {
            id: ApproverId(self.repository.next_id()),
            assignment_id,
            approval_level_id: level_id,
            type_code: approver.type_code(),
            identifier: approver.identifier(),
            ancestor_id: None,
            active: true,
        };

        let mut plan = RebuildPlan::default();
        for existing in self.repository.approvers_at(assignment_id, level_id)? {
            if existing.is_inherited() {
                plan.deletes.push(existing.id);
            }
        }
        plan.inserts.push(row.clone());
        self.repository.apply_rebuild(plan)?;

        self.rebuild_at(&assignment)?;
        Ok(row)
    }

    /// Remove an own approver row and re-derive the subtree: the node falls
    /// back to inheriting from the next ancestor up, or to an empty set.
    pub fn remove_approver(&self, approver_id: ApproverId) -> Result<RebuildReport, ServiceError> {
        let row = self
            .repository
            .approver(approver_id)?
            .ok_or(ServiceError::ApproverNotFound(approver_id))?;
        if row.is_inherited() {
            return Err(ServiceError::InheritedApproverImmutable(approver_id));
        }
        let assignment = self.require_assignment(row.assignment_id)?;
        self.repository.delete_approver(approver_id)?;
        self.rebuild_at(&assignment)
    }

    /// Approver rows at (assignment, level), own and inherited, sorted by id.
    pub fn approvers_at(
        &self,
        assignment_id: AssignmentId,
        level_id: ApprovalLevelId,
    ) -> Result<Vec<ApproverRecord>, ServiceError> {
        self.require_assignment(assignment_id)?;
        self.require_level(level_id)?;
        let mut rows = self.repository.approvers_at(assignment_id, level_id)?;
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    /// Recompute inherited rows for the subtree rooted at `assignment_id`.
    pub fn rebuild(&self, assignment_id: AssignmentId) -> Result<RebuildReport, ServiceError> {
        let assignment = self.require_assignment(assignment_id)?;
        self.rebuild_at(&assignment)
    }

    /// Resolve the active approver rows at (assignment, level) into concrete
    /// user ids for `applicant`.
    pub fn resolve_approvers(
        &self,
        assignment_id: AssignmentId,
        level_id: ApprovalLevelId,
        applicant: UserId,
        job_assignment: Option<JobAssignmentId>,
    ) -> Result<BTreeSet<UserId>, ServiceError> {
        let rows: Vec<ApproverRecord> = self
            .approvers_at(assignment_id, level_id)?
            .into_iter()
            .filter(|row| row.active)
            .collect();
        let resolver =
            ApproverResolver::from_user(self.directory.as_ref(), applicant, job_assignment);
        Ok(resolver.resolve(&rows, Utc::now())?)
    }

    // --- applications -----------------------------------------------------

    pub fn start_application(
        &self,
        assignment_id: AssignmentId,
        applicant: UserId,
    ) -> Result<Application, ServiceError> {
        let assignment = self.require_assignment(assignment_id)?;
        let version = self.active_version_for(assignment.workflow_id)?;
        let snapshots = self.stage_snapshots(version.id)?;
        let machine = StateMachine::new(&snapshots);
        let state = machine.on_application_start()?;

        let application = Application {
            id: ApplicationId(self.repository.next_id()),
            workflow_version_id: version.id,
            assignment_id,
            applicant,
            state,
        };
        self.repository.insert_application(application.clone())?;
        info!(
            application = application.id.0,
            applicant = applicant.0,
            "application started"
        );
        Ok(application)
    }

    pub fn advance_application(
        &self,
        application_id: ApplicationId,
        direction: Direction,
    ) -> Result<Application, ServiceError> {
        let mut application = self.require_application(application_id)?;
        let snapshots = self.stage_snapshots(application.workflow_version_id)?;
        let machine = StateMachine::new(&snapshots);
        application.state = machine.advance(&application.state, direction)?;
        self.repository.update_application(application.clone())?;
        Ok(application)
    }

    pub fn application(&self, application_id: ApplicationId) -> Result<Application, ServiceError> {
        self.require_application(application_id)
    }

    /// Resolve approvers for an application's current approval level; empty
    /// when the application is not sitting on one.
    pub fn resolve_current_approvers(
        &self,
        application_id: ApplicationId,
        job_assignment: Option<JobAssignmentId>,
    ) -> Result<BTreeSet<UserId>, ServiceError> {
        let application = self.require_application(application_id)?;
        match application.state.approval_level_id {
            Some(level) => self.resolve_approvers(
                application.assignment_id,
                level,
                application.applicant,
                job_assignment,
            ),
            None => Ok(BTreeSet::new()),
        }
    }

    // --- helpers ----------------------------------------------------------

    fn rebuild_at(&self, assignment: &Assignment) -> Result<RebuildReport, ServiceError> {
        let version = self.active_version_for(assignment.workflow_id)?;
        let builder = InheritanceBuilder::new(self.repository.as_ref(), self.hierarchy.as_ref());
        Ok(builder.rebuild_tree_for_assignment(assignment, &version)?)
    }

    fn stage_snapshots(
        &self,
        version_id: WorkflowVersionId,
    ) -> Result<Vec<StageSnapshot>, ServiceError> {
        let mut snapshots = Vec::new();
        for stage in self.repository.stages_for_version(version_id)? {
            let levels = if stage.stage_type == StageType::Approvals {
                self.repository.levels_for_stage(stage.id)?
            } else {
                Vec::new()
            };
            snapshots.push(StageSnapshot { stage, levels });
        }
        Ok(snapshots)
    }

    fn persist_changed_levels(
        &self,
        levels: &[ApprovalLevel],
        before: &[(ApprovalLevelId, u32)],
    ) -> Result<(), ServiceError> {
        for level in levels {
            let unchanged = before
                .iter()
                .any(|(id, ord)| *id == level.id && *ord == level.ordinal);
            if !unchanged {
                self.repository.update_level(level.clone())?;
            }
        }
        Ok(())
    }

    fn require_workflow(&self, id: WorkflowId) -> Result<Workflow, ServiceError> {
        self.repository
            .workflow(id)?
            .ok_or(ServiceError::WorkflowNotFound(id))
    }

    fn active_version_for(&self, workflow_id: WorkflowId) -> Result<WorkflowVersion, ServiceError> {
        let workflow = self.require_workflow(workflow_id)?;
        let version_id = workflow
            .active_version
            .ok_or(ServiceError::NoActiveVersion(workflow_id))?;
        self.require_version(version_id)
    }

    fn require_version(&self, id: WorkflowVersionId) -> Result<WorkflowVersion, ServiceError> {
        self.repository
            .version(id)?
            .ok_or(ServiceError::VersionNotFound(id))
    }

    fn require_stage(&self, id: WorkflowStageId) -> Result<WorkflowStage, ServiceError> {
        self.repository
            .stage(id)?
            .ok_or(ServiceError::StageNotFound(id))
    }

    fn require_approvals_stage(&self, id: WorkflowStageId) -> Result<WorkflowStage, ServiceError> {
        let stage = self.require_stage(id)?;
        if stage.stage_type != StageType::Approvals {
            return Err(ServiceError::NotAnApprovalsStage(id));
        }
        Ok(stage)
    }

    fn require_level(&self, id: ApprovalLevelId) -> Result<ApprovalLevel, ServiceError> {
        self.repository
            .level(id)?
            .ok_or(ServiceError::LevelNotFound(id))
    }

    fn require_level_in_workflow(
        &self,
        level: &ApprovalLevel,
        workflow_id: WorkflowId,
    ) -> Result<(), ServiceError> {
        let stage = self.require_stage(level.stage_id)?;
        let version = self.require_version(stage.workflow_version_id)?;
        if version.workflow_id != workflow_id {
            return Err(ServiceError::LevelOutsideWorkflow {
                level: level.id,
                workflow: workflow_id,
            });
        }
        Ok(())
    }

    fn require_assignment(&self, id: AssignmentId) -> Result<Assignment, ServiceError> {
        self.repository
            .assignment(id)?
            .ok_or(ServiceError::AssignmentNotFound(id))
    }

    fn require_application(&self, id: ApplicationId) -> Result<Application, ServiceError> {
        self.repository
            .application(id)?
            .ok_or(ServiceError::ApplicationNotFound(id))
    }
}
