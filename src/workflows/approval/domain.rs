use serde::{Deserialize, Serialize};

/// Identifier wrapper for directory users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowVersionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowStageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApprovalLevelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApproverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobAssignmentId(pub u64);

/// Identifier of a node in the external organizational hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HierarchyNodeId(pub u64);

/// Kind of external hierarchy a workflow's assignments are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Cohort,
    Organisation,
    Position,
}

impl AssignmentType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cohort => "Cohort",
            Self::Organisation => "Organisation",
            Self::Position => "Position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Draft,
    Active,
    Archived,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::Archived => "Archived",
        }
    }
}

/// A workflow-bound node in the organizational hierarchy, eligible to hold
/// approver overrides. Parent/child relations are not stored here; they are
/// derived by walking the external hierarchy restricted to nodes that have a
/// matching assignment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub workflow_id: WorkflowId,
    pub assignment_type: AssignmentType,
    pub node: HierarchyNodeId,
    pub is_default: bool,
    pub status: AssignmentStatus,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

pub const APPROVER_TYPE_USER: u8 = 1;
pub const APPROVER_TYPE_RELATIONSHIP: u8 = 2;

/// The only relationship the resolver currently understands.
pub const RELATIONSHIP_MANAGER: u64 = 1;

/// Resolvable approver kinds. Stored rows carry the raw type code so that a
/// corrupted code surfaces as a typed resolution failure instead of being
/// silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverKind {
    User,
    Relationship,
}

impl ApproverKind {
    pub const fn code(self) -> u8 {
        match self {
            Self::User => APPROVER_TYPE_USER,
            Self::Relationship => APPROVER_TYPE_RELATIONSHIP,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            APPROVER_TYPE_USER => Some(Self::User),
            APPROVER_TYPE_RELATIONSHIP => Some(Self::Relationship),
            _ => None,
        }
    }
}

/// An approver row attached to one (assignment, approval level) pair.
///
/// `ancestor_id = None` marks a row configured directly at this node ("own");
/// `Some(id)` marks an inherited copy pointing at the own row it was derived
/// from on an ancestor assignment. The inheritance builder owns the lifecycle
/// of inherited copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverRecord {
    pub id: ApproverId,
    pub assignment_id: AssignmentId,
    pub approval_level_id: ApprovalLevelId,
    pub type_code: u8,
    pub identifier: u64,
    pub ancestor_id: Option<ApproverId>,
    pub active: bool,
}

impl ApproverRecord {
    pub fn is_own(&self) -> bool {
        self.ancestor_id.is_none()
    }

    pub fn is_inherited(&self) -> bool {
        self.ancestor_id.is_some()
    }

    pub fn kind(&self) -> Option<ApproverKind> {
        ApproverKind::from_code(self.type_code)
    }
}

/// Approver payload accepted from administrators when configuring a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "identifier")]
pub enum NewApprover {
    User(UserId),
    Relationship(u64),
}

impl NewApprover {
    pub const fn type_code(self) -> u8 {
        match self {
            Self::User(_) => APPROVER_TYPE_USER,
            Self::Relationship(_) => APPROVER_TYPE_RELATIONSHIP,
        }
    }

    pub const fn identifier(self) -> u64 {
        match self {
            Self::User(user) => user.0,
            Self::Relationship(relationship) => relationship,
        }
    }

    /// Shorthand for the manager relationship.
    pub const fn manager() -> Self {
        Self::Relationship(RELATIONSHIP_MANAGER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationPhase {
    Draft,
    InProgress,
    Completed,
}

impl ApplicationPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// Composite position of an application inside its workflow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub stage_id: WorkflowStageId,
    pub approval_level_id: Option<ApprovalLevelId>,
    pub phase: ApplicationPhase,
}

/// An applicant's journey through one workflow version, pinned to the
/// assignment node it was raised against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub workflow_version_id: WorkflowVersionId,
    pub assignment_id: AssignmentId,
    pub applicant: UserId,
    pub state: ApplicationState,
}
