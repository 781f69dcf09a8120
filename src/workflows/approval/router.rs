use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicationId, ApprovalLevelId, ApproverId, AssignmentId, JobAssignmentId, NewApprover, UserId,
};
use super::repository::{RepositoryError, WorkflowRepository};
use super::service::{ApprovalWorkflowService, ServiceError};
use super::state::Direction;

/// Router builder exposing HTTP endpoints for approver administration,
/// inheritance rebuilds, resolution, and the application lifecycle.
pub fn approval_router<R>(service: Arc<ApprovalWorkflowService<R>>) -> Router
where
    R: WorkflowRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/assignments/:assignment_id/levels/:level_id/approvers",
            post(add_approver_handler::<R>).get(list_approvers_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/levels/:level_id/resolve",
            post(resolve_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/rebuild",
            post(rebuild_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/activate",
            post(activate_handler::<R>),
        )
        .route("/api/v1/approvers/:approver_id", delete(remove_approver_handler::<R>))
        .route("/api/v1/applications", post(start_application_handler::<R>))
        .route(
            "/api/v1/applications/:application_id",
            get(get_application_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/advance",
            post(advance_application_handler::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveRequest {
    applicant: UserId,
    #[serde(default)]
    job_assignment: Option<JobAssignmentId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartApplicationRequest {
    assignment_id: AssignmentId,
    applicant: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdvanceRequest {
    direction: Direction,
}

pub(crate) async fn add_approver_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path((assignment_id, level_id)): Path<(u64, u64)>,
    axum::Json(approver): axum::Json<NewApprover>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.add_approver(
        AssignmentId(assignment_id),
        ApprovalLevelId(level_id),
        approver,
    ) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn list_approvers_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path((assignment_id, level_id)): Path<(u64, u64)>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.approvers_at(AssignmentId(assignment_id), ApprovalLevelId(level_id)) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn remove_approver_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path(approver_id): Path<u64>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.remove_approver(ApproverId(approver_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn rebuild_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path(assignment_id): Path<u64>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.rebuild(AssignmentId(assignment_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn activate_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path(assignment_id): Path<u64>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.activate_assignment(AssignmentId(assignment_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn resolve_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path((assignment_id, level_id)): Path<(u64, u64)>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.resolve_approvers(
        AssignmentId(assignment_id),
        ApprovalLevelId(level_id),
        request.applicant,
        request.job_assignment,
    ) {
        Ok(approvers) => (
            StatusCode::OK,
            axum::Json(json!({ "approvers": approvers })),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn start_application_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    axum::Json(request): axum::Json<StartApplicationRequest>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.start_application(request.assignment_id, request.applicant) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn get_application_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.application(ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, axum::Json(application)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn advance_application_handler<R>(
    State(service): State<Arc<ApprovalWorkflowService<R>>>,
    Path(application_id): Path<u64>,
    axum::Json(request): axum::Json<AdvanceRequest>,
) -> Response
where
    R: WorkflowRepository + 'static,
{
    match service.advance_application(ApplicationId(application_id), request.direction) {
        Ok(application) => (StatusCode::OK, axum::Json(application)).into_response(),
        Err(error) => error_response(&error),
    }
}

fn error_response(error: &ServiceError) -> Response {
    let status = match error {
        ServiceError::WorkflowNotFound(_)
        | ServiceError::VersionNotFound(_)
        | ServiceError::StageNotFound(_)
        | ServiceError::LevelNotFound(_)
        | ServiceError::AssignmentNotFound(_)
        | ServiceError::ApproverNotFound(_)
        | ServiceError::ApplicationNotFound(_)
        | ServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Inheritance(_)
        | ServiceError::Resolver(_)
        | ServiceError::Ordinal(_)
        | ServiceError::State(_)
        | ServiceError::NoActiveVersion(_)
        | ServiceError::NotAnApprovalsStage(_)
        | ServiceError::LevelOutsideWorkflow { .. }
        | ServiceError::DefaultLevelUndeletable(_)
        | ServiceError::InheritedApproverImmutable(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };

    let body = axum::Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}
