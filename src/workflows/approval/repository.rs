use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::domain::{
    Application, ApplicationId, ApprovalLevelId, ApproverId, ApproverRecord, Assignment,
    AssignmentId, HierarchyNodeId, WorkflowId, WorkflowStageId, WorkflowVersionId,
};
use super::schema::{ApprovalLevel, Workflow, WorkflowStage, WorkflowVersion};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Batched approver-row mutation produced by the inheritance builder. Applied
/// as a whole or not at all, so a rebuild never leaves partial writes behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    pub deletes: Vec<ApproverId>,
    pub inserts: Vec<ApproverRecord>,
}

impl RebuildPlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

/// Storage abstraction so the engine can be exercised in isolation.
/// Persistence schema is an implementation detail; callers serialize writers
/// per workflow version.
pub trait WorkflowRepository: Send + Sync {
    /// Allocate the next id from the repository-wide sequence.
    fn next_id(&self) -> u64;

    fn insert_workflow(&self, workflow: Workflow) -> Result<(), RepositoryError>;
    fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    fn insert_version(&self, version: WorkflowVersion) -> Result<(), RepositoryError>;
    fn version(&self, id: WorkflowVersionId) -> Result<Option<WorkflowVersion>, RepositoryError>;

    fn insert_stage(&self, stage: WorkflowStage) -> Result<(), RepositoryError>;
    fn update_stage(&self, stage: WorkflowStage) -> Result<(), RepositoryError>;
    fn stage(&self, id: WorkflowStageId) -> Result<Option<WorkflowStage>, RepositoryError>;
    /// Stages of a version ordered by ordinal.
    fn stages_for_version(
        &self,
        version: WorkflowVersionId,
    ) -> Result<Vec<WorkflowStage>, RepositoryError>;

    fn insert_level(&self, level: ApprovalLevel) -> Result<(), RepositoryError>;
    fn update_level(&self, level: ApprovalLevel) -> Result<(), RepositoryError>;
    fn delete_level(&self, id: ApprovalLevelId) -> Result<ApprovalLevel, RepositoryError>;
    fn level(&self, id: ApprovalLevelId) -> Result<Option<ApprovalLevel>, RepositoryError>;
    /// Levels of a stage ordered by ordinal.
    fn levels_for_stage(
        &self,
        stage: WorkflowStageId,
    ) -> Result<Vec<ApprovalLevel>, RepositoryError>;

    fn insert_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError>;
    fn update_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError>;
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError>;
    fn assignments_for_workflow(
        &self,
        workflow: WorkflowId,
    ) -> Result<Vec<Assignment>, RepositoryError>;
    fn assignment_at_node(
        &self,
        workflow: WorkflowId,
        node: HierarchyNodeId,
    ) -> Result<Option<Assignment>, RepositoryError>;

    fn approver(&self, id: ApproverId) -> Result<Option<ApproverRecord>, RepositoryError>;
    fn delete_approver(&self, id: ApproverId) -> Result<ApproverRecord, RepositoryError>;
    fn approvers_at(
        &self,
        assignment: AssignmentId,
        level: ApprovalLevelId,
    ) -> Result<Vec<ApproverRecord>, RepositoryError>;
    /// Apply a rebuild plan atomically: all deletes and inserts, or none.
    fn apply_rebuild(&self, plan: RebuildPlan) -> Result<(), RepositoryError>;

    fn insert_application(&self, application: Application) -> Result<(), RepositoryError>;
    fn update_application(&self, application: Application) -> Result<(), RepositoryError>;
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;
}

#[derive(Debug, Default)]
struct Tables {
    workflows: BTreeMap<WorkflowId, Workflow>,
    versions: BTreeMap<WorkflowVersionId, WorkflowVersion>,
    stages: BTreeMap<WorkflowStageId, WorkflowStage>,
    levels: BTreeMap<ApprovalLevelId, ApprovalLevel>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    approvers: BTreeMap<ApproverId, ApproverRecord>,
    applications: BTreeMap<ApplicationId, Application>,
}

/// In-memory repository backing the demo server and tests. A single mutex
/// guards all tables, which makes `apply_rebuild` atomic and gives the
/// single-writer-per-version behavior the engine assumes.
#[derive(Debug)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    sequence: AtomicU64,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            sequence: AtomicU64::new(1),
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("repository mutex poisoned")
    }
}

impl WorkflowRepository for MemoryRepository {
    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn insert_workflow(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.workflows.contains_key(&workflow.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    fn workflow(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.lock().workflows.get(&id).cloned())
    }

    fn insert_version(&self, version: WorkflowVersion) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.versions.contains_key(&version.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.versions.insert(version.id, version);
        Ok(())
    }

    fn version(&self, id: WorkflowVersionId) -> Result<Option<WorkflowVersion>, RepositoryError> {
        Ok(self.lock().versions.get(&id).cloned())
    }

    fn insert_stage(&self, stage: WorkflowStage) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.stages.contains_key(&stage.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.stages.insert(stage.id, stage);
        Ok(())
    }

    fn update_stage(&self, stage: WorkflowStage) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.stages.contains_key(&stage.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.stages.insert(stage.id, stage);
        Ok(())
    }

    fn stage(&self, id: WorkflowStageId) -> Result<Option<WorkflowStage>, RepositoryError> {
        Ok(self.lock().stages.get(&id).cloned())
    }

    fn stages_for_version(
        &self,
        version: WorkflowVersionId,
    ) -> Result<Vec<WorkflowStage>, RepositoryError> {
        let tables = self.lock();
        let mut stages: Vec<WorkflowStage> = tables
            .stages
            .values()
            .filter(|stage| stage.workflow_version_id == version)
            .cloned()
            .collect();
        stages.sort_by_key(|stage| stage.ordinal);
        Ok(stages)
    }

    fn insert_level(&self, level: ApprovalLevel) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.levels.contains_key(&level.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.levels.insert(level.id, level);
        Ok(())
    }

    fn update_level(&self, level: ApprovalLevel) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.levels.contains_key(&level.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.levels.insert(level.id, level);
        Ok(())
    }

    fn delete_level(&self, id: ApprovalLevelId) -> Result<ApprovalLevel, RepositoryError> {
        let mut tables = self.lock();
        tables.levels.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn level(&self, id: ApprovalLevelId) -> Result<Option<ApprovalLevel>, RepositoryError> {
        Ok(self.lock().levels.get(&id).cloned())
    }

    fn levels_for_stage(
        &self,
        stage: WorkflowStageId,
    ) -> Result<Vec<ApprovalLevel>, RepositoryError> {
        let tables = self.lock();
        let mut levels: Vec<ApprovalLevel> = tables
            .levels
            .values()
            .filter(|level| level.stage_id == stage)
            .cloned()
            .collect();
        levels.sort_by_key(|level| level.ordinal);
        Ok(levels)
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.assignments.contains_key(&assignment.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn update_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.assignments.contains_key(&assignment.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError> {
        Ok(self.lock().assignments.get(&id).cloned())
    }

    fn assignments_for_workflow(
        &self,
        workflow: WorkflowId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let tables = self.lock();
        Ok(tables
            .assignments
            .values()
            .filter(|assignment| assignment.workflow_id == workflow)
            .cloned()
            .collect())
    }

    fn assignment_at_node(
        &self,
        workflow: WorkflowId,
        node: HierarchyNodeId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let tables = self.lock();
        Ok(tables
            .assignments
            .values()
            .find(|assignment| assignment.workflow_id == workflow && assignment.node == node)
            .cloned())
    }

    fn approver(&self, id: ApproverId) -> Result<Option<ApproverRecord>, RepositoryError> {
        Ok(self.lock().approvers.get(&id).cloned())
    }

    fn delete_approver(&self, id: ApproverId) -> Result<ApproverRecord, RepositoryError> {
        let mut tables = self.lock();
        tables.approvers.remove(&id).ok_or(RepositoryError::NotFound)
    }

    fn approvers_at(
        &self,
        assignment: AssignmentId,
        level: ApprovalLevelId,
    ) -> Result<Vec<ApproverRecord>, RepositoryError> {
        let tables = self.lock();
        Ok(tables
            .approvers
            .values()
            .filter(|row| row.assignment_id == assignment && row.approval_level_id == level)
            .cloned()
            .collect())
    }

    fn apply_rebuild(&self, plan: RebuildPlan) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        for id in &plan.deletes {
            if !tables.approvers.contains_key(id) {
                return Err(RepositoryError::NotFound);
            }
        }
        for row in &plan.inserts {
            if tables.approvers.contains_key(&row.id) {
                return Err(RepositoryError::Conflict);
            }
        }
        for id in plan.deletes {
            tables.approvers.remove(&id);
        }
        for row in plan.inserts {
            tables.approvers.insert(row.id, row);
        }
        Ok(())
    }

    fn insert_application(&self, application: Application) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.applications.insert(application.id, application);
        Ok(())
    }

    fn update_application(&self, application: Application) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if !tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.applications.insert(application.id, application);
        Ok(())
    }

    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock().applications.get(&id).cloned())
    }
}
