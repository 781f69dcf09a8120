use std::collections::BTreeMap;

use super::domain::{AssignmentType, HierarchyNodeId};

/// Read access to the external organizational hierarchy an assignment tree is
/// drawn from. Injected so the inheritance builder can be exercised against
/// an in-memory tree; implementations must be acyclic and total (every valid
/// node resolves).
pub trait HierarchyProvider: Send + Sync {
    fn parent_of(&self, kind: AssignmentType, node: HierarchyNodeId) -> Option<HierarchyNodeId>;
    fn children_of(&self, kind: AssignmentType, node: HierarchyNodeId) -> Vec<HierarchyNodeId>;
}

/// Hierarchy backed by parent pointers, used by the demo server and tests.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    parents: BTreeMap<(AssignmentType, HierarchyNodeId), HierarchyNodeId>,
}

impl InMemoryHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` as a direct descendant of `parent`.
    pub fn link(&mut self, kind: AssignmentType, parent: HierarchyNodeId, child: HierarchyNodeId) {
        self.parents.insert((kind, child), parent);
    }
}

impl HierarchyProvider for InMemoryHierarchy {
    fn parent_of(&self, kind: AssignmentType, node: HierarchyNodeId) -> Option<HierarchyNodeId> {
        self.parents.get(&(kind, node)).copied()
    }

    fn children_of(&self, kind: AssignmentType, node: HierarchyNodeId) -> Vec<HierarchyNodeId> {
        self.parents
            .iter()
            .filter(|((child_kind, _), parent)| *child_kind == kind && **parent == node)
            .map(|((_, child), _)| *child)
            .collect()
    }
}
