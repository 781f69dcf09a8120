use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::approval::directory::{InMemoryDirectory, JobAssignment};
use crate::workflows::approval::domain::{
    Assignment, AssignmentType, HierarchyNodeId, JobAssignmentId, UserId,
};
use crate::workflows::approval::hierarchy::InMemoryHierarchy;
use crate::workflows::approval::repository::{MemoryRepository, WorkflowRepository};
use crate::workflows::approval::schema::{
    ApprovalLevel, StageType, Workflow, WorkflowStage, WorkflowVersion,
};
use crate::workflows::approval::service::ApprovalWorkflowService;
use crate::workflows::approval::{approval_router, WorkflowId};

// Organisation tree used throughout: ROOT -> BRANCH -> LEAF, with a second
// branch ROOT -> SIDE_BRANCH -> SIDE_LEAF for convergence checks.
pub(super) const ROOT: HierarchyNodeId = HierarchyNodeId(10);
pub(super) const BRANCH: HierarchyNodeId = HierarchyNodeId(20);
pub(super) const LEAF: HierarchyNodeId = HierarchyNodeId(30);
pub(super) const SIDE_BRANCH: HierarchyNodeId = HierarchyNodeId(21);
pub(super) const SIDE_LEAF: HierarchyNodeId = HierarchyNodeId(31);

pub(super) const APPLICANT: UserId = UserId(100);
pub(super) const REVIEWER: UserId = UserId(101);
pub(super) const AUDITOR: UserId = UserId(102);
pub(super) const MANAGER: UserId = UserId(103);
pub(super) const STAND_IN: UserId = UserId(104);

pub(super) const APPLICANT_JOB: JobAssignmentId = JobAssignmentId(900);

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp")
}

pub(super) fn hierarchy() -> InMemoryHierarchy {
    let mut tree = InMemoryHierarchy::new();
    tree.link(AssignmentType::Organisation, ROOT, BRANCH);
    tree.link(AssignmentType::Organisation, BRANCH, LEAF);
    tree.link(AssignmentType::Organisation, ROOT, SIDE_BRANCH);
    tree.link(AssignmentType::Organisation, SIDE_BRANCH, SIDE_LEAF);
    tree
}

pub(super) fn directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    for user in [APPLICANT, REVIEWER, AUDITOR, MANAGER, STAND_IN] {
        directory.add_user(user);
    }
    directory.upsert_job_assignment(JobAssignment {
        id: APPLICANT_JOB,
        user_id: APPLICANT,
        manager_id: Some(MANAGER),
        temporary_manager_id: None,
        temporary_manager_expires: None,
    });
    directory
}

pub(super) fn build_service() -> (
    ApprovalWorkflowService<MemoryRepository>,
    Arc<MemoryRepository>,
    Arc<InMemoryDirectory>,
) {
    let repository = Arc::new(MemoryRepository::new());
    let directory = Arc::new(directory());
    let service = ApprovalWorkflowService::new(
        repository.clone(),
        Arc::new(hierarchy()),
        directory.clone(),
    );
    (service, repository, directory)
}

/// A workflow with a Submit form stage, a two-level Review stage, and a Done
/// stage, assigned to ROOT by default.
pub(super) struct WorkflowFixture {
    pub(super) workflow: Workflow,
    pub(super) version: WorkflowVersion,
    pub(super) root_assignment: Assignment,
    pub(super) submit_stage: WorkflowStage,
    pub(super) review_stage: WorkflowStage,
    pub(super) finished_stage: WorkflowStage,
    pub(super) first_level: ApprovalLevel,
    pub(super) second_level: ApprovalLevel,
}

pub(super) fn seed_workflow(
    service: &ApprovalWorkflowService<MemoryRepository>,
    repository: &MemoryRepository,
) -> WorkflowFixture {
    let setup = service
        .create_workflow("Onboarding approval", AssignmentType::Organisation, ROOT)
        .expect("workflow setup");
    let submit_stage = service
        .add_stage(setup.version.id, "Submit", StageType::FormSubmission)
        .expect("submit stage");
    let review_stage = service
        .add_stage(setup.version.id, "Review", StageType::Approvals)
        .expect("review stage");
    let finished_stage = service
        .add_stage(setup.version.id, "Done", StageType::Finished)
        .expect("finished stage");

    let first_level = repository
        .levels_for_stage(review_stage.id)
        .expect("levels")
        .into_iter()
        .next()
        .expect("default level");
    let second_level = service
        .add_approval_level(review_stage.id, "Level 2")
        .expect("second level");

    WorkflowFixture {
        workflow: setup.workflow,
        version: setup.version,
        root_assignment: setup.default_assignment,
        submit_stage,
        review_stage,
        finished_stage,
        first_level,
        second_level,
    }
}

pub(super) fn activate_node(
    service: &ApprovalWorkflowService<MemoryRepository>,
    repository: &MemoryRepository,
    workflow: WorkflowId,
    node: HierarchyNodeId,
) -> Assignment {
    let assignment = service
        .create_assignment(workflow, node)
        .expect("assignment created");
    service
        .activate_assignment(assignment.id)
        .expect("assignment activated");
    repository
        .assignment(assignment.id)
        .expect("assignment fetch")
        .expect("assignment exists")
}

pub(super) fn approval_router_with_service(
    service: ApprovalWorkflowService<MemoryRepository>,
) -> axum::Router {
    approval_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
