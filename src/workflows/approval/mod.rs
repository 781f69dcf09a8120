//! Multi-stage approval workflows with hierarchical approver inheritance.
//!
//! A workflow version owns an ordered list of stages; approvals stages own
//! ordered approval levels. Workflows attach to nodes of an organisational
//! tree through assignments, and approver rows configured on an assignment
//! cascade to descendant assignments until one of them defines its own rows.
//! At runtime the resolver turns stored approver rows into concrete user ids
//! and the state machine walks applications through stages and levels.

pub mod directory;
pub mod domain;
pub mod hierarchy;
pub mod inheritance;
pub mod ordinal;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod schema;
pub mod service;
pub mod state;

#[cfg(test)]
mod tests;

pub use directory::{Directory, InMemoryDirectory, JobAssignment};
pub use domain::{
    Application, ApplicationId, ApplicationPhase, ApplicationState, ApprovalLevelId, ApproverId,
    ApproverKind, ApproverRecord, Assignment, AssignmentId, AssignmentStatus, AssignmentType,
    HierarchyNodeId, JobAssignmentId, NewApprover, UserId, WorkflowId, WorkflowStageId,
    WorkflowVersionId,
};
pub use hierarchy::{HierarchyProvider, InMemoryHierarchy};
pub use inheritance::{InheritanceBuilder, InheritanceError, RebuildReport};
pub use ordinal::{OrdinalError, OrdinalItem};
pub use repository::{MemoryRepository, RebuildPlan, RepositoryError, WorkflowRepository};
pub use resolver::{ApproverResolver, ResolverError};
pub use router::approval_router;
pub use schema::{ApprovalLevel, StageType, Workflow, WorkflowStage, WorkflowVersion};
pub use service::{ApprovalWorkflowService, ServiceError, WorkflowSetup};
pub use state::{Direction, StageSnapshot, StateError, StateMachine};
