//! Approver inheritance builder.
//!
//! Recomputes which inherited approver rows should exist at an assignment
//! node and every descendant after any change to own rows, a new override
//! assignment, or an activation. Own rows always win locally; descendants
//! without an override receive copies of the nearest ancestor's own rows.

use std::collections::BTreeMap;

use tracing::debug;

use super::domain::{
    ApprovalLevelId, ApproverId, ApproverRecord, Assignment, AssignmentId, AssignmentType,
    HierarchyNodeId, WorkflowId,
};
use super::hierarchy::HierarchyProvider;
use super::repository::{RebuildPlan, RepositoryError, WorkflowRepository};
use super::schema::{StageType, WorkflowVersion};

#[derive(Debug, thiserror::Error)]
pub enum InheritanceError {
    #[error("assignment {assignment:?} does not belong to workflow {workflow:?}")]
    AssignmentOutsideWorkflow {
        assignment: AssignmentId,
        workflow: WorkflowId,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of a rebuild, counting rows the plan actually rewrote. A repeat
/// rebuild with no intervening changes reports zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RebuildReport {
    pub deleted: usize,
    pub inserted: usize,
}

pub struct InheritanceBuilder<'a, R: WorkflowRepository + ?Sized> {
    repository: &'a R,
    hierarchy: &'a dyn HierarchyProvider,
}

impl<'a, R: WorkflowRepository + ?Sized> InheritanceBuilder<'a, R> {
    pub fn new(repository: &'a R, hierarchy: &'a dyn HierarchyProvider) -> Self {
        Self {
            repository,
            hierarchy,
        }
    }

    /// Recompute inherited rows for the subtree rooted at `assignment`, per
    /// approval level across all approvals stages of `version`. The computed
    /// plan is applied atomically; a node whose rows are already correct is
    /// left untouched, so repeated rebuilds neither duplicate rows nor drift
    /// `ancestor_id`.
    pub fn rebuild_tree_for_assignment(
        &self,
        assignment: &Assignment,
        version: &WorkflowVersion,
    ) -> Result<RebuildReport, InheritanceError> {
        if version.workflow_id != assignment.workflow_id {
            return Err(InheritanceError::AssignmentOutsideWorkflow {
                assignment: assignment.id,
                workflow: version.workflow_id,
            });
        }

        let mut levels = Vec::new();
        for stage in self.repository.stages_for_version(version.id)? {
            if stage.stage_type == StageType::Approvals {
                levels.extend(self.repository.levels_for_stage(stage.id)?);
            }
        }

        let by_node: BTreeMap<HierarchyNodeId, Assignment> = self
            .repository
            .assignments_for_workflow(version.workflow_id)?
            .into_iter()
            .map(|row| (row.node, row))
            .collect();

        let mut plan = RebuildPlan::default();
        for level in &levels {
            let source = self.source_rows_above(assignment, level.id, &by_node)?;
            self.propagate(
                assignment.node,
                assignment.assignment_type,
                level.id,
                &source,
                &by_node,
                &mut plan,
            )?;
        }

        let report = RebuildReport {
            deleted: plan.deletes.len(),
            inserted: plan.inserts.len(),
        };
        if !plan.is_empty() {
            self.repository.apply_rebuild(plan)?;
        }
        debug!(
            assignment = assignment.id.0,
            node = assignment.node.0,
            deleted = report.deleted,
            inserted = report.inserted,
            "approver inheritance rebuilt"
        );
        Ok(report)
    }

    /// Own active rows at the nearest ancestor assignment that has any,
    /// walking the hierarchy-restricted parent chain. Nodes without an
    /// assignment row, and assignments that are not active, are transparent.
    /// Empty when no ancestor supplies approvers — a valid state.
    fn source_rows_above(
        &self,
        start: &Assignment,
        level: ApprovalLevelId,
        by_node: &BTreeMap<HierarchyNodeId, Assignment>,
    ) -> Result<Vec<ApproverRecord>, RepositoryError> {
        let kind = start.assignment_type;
        let mut cursor = self.hierarchy.parent_of(kind, start.node);
        while let Some(node) = cursor {
            if let Some(candidate) = by_node.get(&node) {
                if candidate.is_active() {
                    let own = self.own_active_rows(candidate.id, level)?;
                    if !own.is_empty() {
                        return Ok(own);
                    }
                }
            }
            cursor = self.hierarchy.parent_of(kind, node);
        }
        Ok(Vec::new())
    }

    fn propagate(
        &self,
        node: HierarchyNodeId,
        kind: AssignmentType,
        level: ApprovalLevelId,
        source: &[ApproverRecord],
        by_node: &BTreeMap<HierarchyNodeId, Assignment>,
        plan: &mut RebuildPlan,
    ) -> Result<(), RepositoryError> {
        let mut next_source = source.to_vec();
        if let Some(assignment) = by_node.get(&node) {
            if assignment.is_active() {
                let own = self.own_active_rows(assignment.id, level)?;
                if own.is_empty() {
                    self.plan_inherited_rows(assignment.id, level, source, plan)?;
                } else {
                    // Own rows win locally and become the source below.
                    next_source = own;
                }
            }
            // Draft/archived assignments get no rows written but stay
            // transparent so their descendants keep inheriting from above.
        }

        for child in self.hierarchy.children_of(kind, node) {
            self.propagate(child, kind, level, &next_source, by_node, plan)?;
        }
        Ok(())
    }

    /// Replace the node's inherited rows for `level` with copies of `source`
    /// unless they already match, keeping row ids stable across rebuilds.
    fn plan_inherited_rows(
        &self,
        assignment: AssignmentId,
        level: ApprovalLevelId,
        source: &[ApproverRecord],
        plan: &mut RebuildPlan,
    ) -> Result<(), RepositoryError> {
        let existing: Vec<ApproverRecord> = self
            .repository
            .approvers_at(assignment, level)?
            .into_iter()
            .filter(ApproverRecord::is_inherited)
            .collect();

        let mut desired: Vec<(ApproverId, u8, u64)> = source
            .iter()
            .map(|row| (row.id, row.type_code, row.identifier))
            .collect();
        desired.sort_unstable();
        let mut current: Vec<(ApproverId, u8, u64)> = existing
            .iter()
            .filter(|row| row.active)
            .filter_map(|row| row.ancestor_id.map(|a| (a, row.type_code, row.identifier)))
            .collect();
        current.sort_unstable();

        let all_active = existing.iter().all(|row| row.active);
        if desired == current && all_active && existing.len() == source.len() {
            return Ok(());
        }

        plan.deletes.extend(existing.iter().map(|row| row.id));
        for origin in source {
            plan.inserts.push(ApproverRecord {
                id: ApproverId(self.repository.next_id()),
                assignment_id: assignment,
                approval_level_id: level,
                type_code: origin.type_code,
                identifier: origin.identifier,
                ancestor_id: Some(origin.id),
                active: true,
            });
        }
        Ok(())
    }

    fn own_active_rows(
        &self,
        assignment: AssignmentId,
        level: ApprovalLevelId,
    ) -> Result<Vec<ApproverRecord>, RepositoryError> {
        let mut rows: Vec<ApproverRecord> = self
            .repository
            .approvers_at(assignment, level)?
            .into_iter()
            .filter(|row| row.active && row.is_own())
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}
