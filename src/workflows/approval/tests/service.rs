use std::collections::BTreeSet;

use super::common::*;
use crate::workflows::approval::domain::{ApplicationPhase, AssignmentType, NewApprover};
use crate::workflows::approval::ordinal::OrdinalError;
use crate::workflows::approval::repository::{RepositoryError, WorkflowRepository};
use crate::workflows::approval::schema::StageType;
use crate::workflows::approval::service::ServiceError;
use crate::workflows::approval::state::Direction;

#[test]
fn create_workflow_activates_a_default_root_assignment() {
    let (service, repository, _) = build_service();
    let setup = service
        .create_workflow("Onboarding approval", AssignmentType::Organisation, ROOT)
        .expect("workflow setup");

    assert_eq!(setup.workflow.active_version, Some(setup.version.id));
    assert!(setup.default_assignment.is_default);
    assert!(setup.default_assignment.is_active());
    assert_eq!(setup.default_assignment.node, ROOT);

    let stored = repository
        .assignment(setup.default_assignment.id)
        .expect("fetch")
        .expect("persisted");
    assert_eq!(stored, setup.default_assignment);
}

#[test]
fn approvals_stages_start_with_an_undeletable_default_level() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    assert!(fixture.first_level.is_default);
    assert_eq!(fixture.first_level.ordinal, 1);

    let error = service.delete_approval_level(fixture.first_level.id).unwrap_err();
    assert!(matches!(error, ServiceError::DefaultLevelUndeletable(id) if id == fixture.first_level.id));

    service
        .deactivate_approval_level(fixture.first_level.id)
        .expect("deactivation is still allowed");
}

#[test]
fn deleting_a_level_closes_the_ordinal_gap_and_drops_its_rows() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    let third_level = service
        .add_approval_level(fixture.review_stage.id, "Level 3")
        .expect("third level");
    service
        .add_approver(
            fixture.root_assignment.id,
            fixture.second_level.id,
            NewApprover::User(REVIEWER),
        )
        .expect("row on doomed level");

    service
        .delete_approval_level(fixture.second_level.id)
        .expect("level deleted");

    let levels = repository
        .levels_for_stage(fixture.review_stage.id)
        .expect("levels");
    let ordinals: Vec<(u64, u32)> = levels.iter().map(|level| (level.id.0, level.ordinal)).collect();
    assert_eq!(
        ordinals,
        vec![(fixture.first_level.id.0, 1), (third_level.id.0, 2)]
    );
    assert!(repository
        .approvers_at(fixture.root_assignment.id, fixture.second_level.id)
        .expect("rows")
        .is_empty());
}

#[test]
fn reorder_levels_reassigns_dense_ordinals() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    service
        .reorder_approval_levels(
            fixture.review_stage.id,
            &[fixture.second_level.id, fixture.first_level.id],
        )
        .expect("reordered");

    let levels = repository
        .levels_for_stage(fixture.review_stage.id)
        .expect("levels");
    assert_eq!(levels[0].id, fixture.second_level.id);
    assert_eq!(levels[0].ordinal, 1);
    assert_eq!(levels[1].id, fixture.first_level.id);
    assert_eq!(levels[1].ordinal, 2);
}

#[test]
fn reorder_rejects_a_partial_level_list() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    let error = service
        .reorder_approval_levels(fixture.review_stage.id, &[fixture.second_level.id])
        .unwrap_err();

    assert!(matches!(
        error,
        ServiceError::Ordinal(OrdinalError::SizeMismatch { expected: 2, found: 1 })
    ));
}

#[test]
fn reorder_stages_moves_whole_stages() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    service
        .reorder_stages(
            fixture.version.id,
            &[fixture.submit_stage.id, fixture.finished_stage.id, fixture.review_stage.id],
        )
        .expect("reordered");

    let stages = repository
        .stages_for_version(fixture.version.id)
        .expect("stages");
    let names: Vec<&str> = stages.iter().map(|stage| stage.name.as_str()).collect();
    assert_eq!(names, vec!["Submit", "Done", "Review"]);
}

#[test]
fn assignments_are_unique_per_workflow_node() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    let error = service
        .create_assignment(fixture.workflow.id, ROOT)
        .unwrap_err();

    assert!(matches!(error, ServiceError::Repository(RepositoryError::Conflict)));
    let occupant = repository
        .assignment_at_node(fixture.workflow.id, ROOT)
        .expect("lookup")
        .expect("node is taken");
    assert_eq!(occupant.id, fixture.root_assignment.id);

    let free = repository
        .assignment_at_node(fixture.workflow.id, BRANCH)
        .expect("lookup");
    assert!(free.is_none());
    service
        .create_assignment(fixture.workflow.id, BRANCH)
        .expect("a free node still accepts an assignment");
}

#[test]
fn add_approver_rejects_a_level_from_another_workflow() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    let other = service
        .create_workflow("Offboarding approval", AssignmentType::Organisation, SIDE_BRANCH)
        .expect("second workflow");
    let other_stage = service
        .add_stage(other.version.id, "Review", StageType::Approvals)
        .expect("stage");
    let other_level = repository
        .levels_for_stage(other_stage.id)
        .expect("levels")
        .remove(0);

    let error = service
        .add_approver(
            fixture.root_assignment.id,
            other_level.id,
            NewApprover::User(REVIEWER),
        )
        .unwrap_err();

    assert!(matches!(
        error,
        ServiceError::LevelOutsideWorkflow { level, workflow }
            if level == other_level.id && workflow == fixture.workflow.id
    ));
}

#[test]
fn inherited_rows_cannot_be_removed_directly() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    let branch = activate_node(&service, &repository, fixture.workflow.id, BRANCH);
    service
        .add_approver(
            fixture.root_assignment.id,
            fixture.first_level.id,
            NewApprover::User(REVIEWER),
        )
        .expect("root row");

    let inherited = service
        .approvers_at(branch.id, fixture.first_level.id)
        .expect("rows")
        .remove(0);
    let error = service.remove_approver(inherited.id).unwrap_err();

    assert!(matches!(error, ServiceError::InheritedApproverImmutable(id) if id == inherited.id));
}

#[test]
fn resolve_approvers_combines_users_and_manager_chain() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    let leaf = activate_node(&service, &repository, fixture.workflow.id, LEAF);
    service
        .add_approver(
            fixture.root_assignment.id,
            fixture.first_level.id,
            NewApprover::User(REVIEWER),
        )
        .expect("user row");
    service
        .add_approver(
            fixture.root_assignment.id,
            fixture.first_level.id,
            NewApprover::manager(),
        )
        .expect("manager row");

    let approvers = service
        .resolve_approvers(leaf.id, fixture.first_level.id, APPLICANT, None)
        .expect("resolution");

    assert_eq!(approvers, BTreeSet::from([REVIEWER, MANAGER]));
}

#[test]
fn resolution_ignores_inactive_rows() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    let row = service
        .add_approver(
            fixture.root_assignment.id,
            fixture.first_level.id,
            NewApprover::User(REVIEWER),
        )
        .expect("row");

    let mut stored = repository
        .approver(row.id)
        .expect("fetch")
        .expect("present");
    stored.active = false;
    repository
        .apply_rebuild(crate::workflows::approval::repository::RebuildPlan {
            deletes: vec![row.id],
            inserts: Vec::new(),
        })
        .expect("row removed");
    repository
        .apply_rebuild(crate::workflows::approval::repository::RebuildPlan {
            deletes: Vec::new(),
            inserts: vec![stored],
        })
        .expect("row reinserted inactive");

    let approvers = service
        .resolve_approvers(fixture.root_assignment.id, fixture.first_level.id, APPLICANT, None)
        .expect("resolution");

    assert!(approvers.is_empty());
}

#[test]
fn applications_walk_submit_review_done() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);

    let application = service
        .start_application(fixture.root_assignment.id, APPLICANT)
        .expect("started");
    assert_eq!(application.state.stage_id, fixture.submit_stage.id);
    assert_eq!(application.state.phase, ApplicationPhase::Draft);

    let first = service
        .advance_application(application.id, Direction::Next)
        .expect("to first level");
    assert_eq!(first.state.approval_level_id, Some(fixture.first_level.id));
    assert_eq!(first.state.phase, ApplicationPhase::InProgress);

    let second = service
        .advance_application(application.id, Direction::Next)
        .expect("to second level");
    assert_eq!(second.state.approval_level_id, Some(fixture.second_level.id));

    let done = service
        .advance_application(application.id, Direction::Next)
        .expect("to finished");
    assert_eq!(done.state.stage_id, fixture.finished_stage.id);
    assert_eq!(done.state.phase, ApplicationPhase::Completed);

    let stored = service.application(application.id).expect("fetch");
    assert_eq!(stored.state, done.state);
}

#[test]
fn advancing_skips_deactivated_levels() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    service
        .deactivate_approval_level(fixture.second_level.id)
        .expect("deactivated");

    let application = service
        .start_application(fixture.root_assignment.id, APPLICANT)
        .expect("started");
    service
        .advance_application(application.id, Direction::Next)
        .expect("to first level");
    let done = service
        .advance_application(application.id, Direction::Next)
        .expect("past the inactive level");

    assert_eq!(done.state.stage_id, fixture.finished_stage.id);
    assert_eq!(done.state.phase, ApplicationPhase::Completed);
}

#[test]
fn current_approvers_are_empty_outside_approval_levels() {
    let (service, repository, _) = build_service();
    let fixture = seed_workflow(&service, &repository);
    service
        .add_approver(
            fixture.root_assignment.id,
            fixture.first_level.id,
            NewApprover::User(REVIEWER),
        )
        .expect("row");

    let application = service
        .start_application(fixture.root_assignment.id, APPLICANT)
        .expect("started");
    assert!(service
        .resolve_current_approvers(application.id, None)
        .expect("resolution")
        .is_empty());

    service
        .advance_application(application.id, Direction::Next)
        .expect("to first level");
    assert_eq!(
        service
            .resolve_current_approvers(application.id, None)
            .expect("resolution"),
        BTreeSet::from([REVIEWER])
    );
}
