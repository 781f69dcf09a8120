use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{JobAssignmentId, UserId};

/// A user's job assignment as reported by the organizational directory.
/// Captures the manager chain the resolver walks for relationship approvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAssignment {
    pub id: JobAssignmentId,
    pub user_id: UserId,
    pub manager_id: Option<UserId>,
    pub temporary_manager_id: Option<UserId>,
    pub temporary_manager_expires: Option<DateTime<Utc>>,
}

impl JobAssignment {
    /// Current manager plus, while not expired, the temporary manager as an
    /// additional candidate — never a replacement.
    pub fn manager_candidates(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let mut candidates = Vec::new();
        if let Some(manager) = self.manager_id {
            candidates.push(manager);
        }
        if let Some(temporary) = self.temporary_manager_id {
            let expired = self
                .temporary_manager_expires
                .is_some_and(|expires| expires <= now);
            if !expired {
                candidates.push(temporary);
            }
        }
        candidates
    }
}

/// Directory lookups the resolver depends on. Approvers are stored as
/// declarative tuples, so recipients are recomputed against current
/// organizational data at resolution time rather than frozen when configured.
pub trait Directory: Send + Sync {
    fn user_exists(&self, user: UserId) -> bool;
    fn job_assignments_for(&self, user: UserId) -> Vec<JobAssignment>;
    fn job_assignment(&self, id: JobAssignmentId) -> Option<JobAssignment>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: BTreeSet<UserId>,
    job_assignments: BTreeMap<JobAssignmentId, JobAssignment>,
}

/// Mutable in-memory directory used by the demo server and tests. Interior
/// mutability lets tests delete users and job assignments after the service
/// has taken its handle.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserId) {
        let mut state = self.state.lock().expect("directory mutex poisoned");
        state.users.insert(user);
    }

    pub fn remove_user(&self, user: UserId) {
        let mut state = self.state.lock().expect("directory mutex poisoned");
        state.users.remove(&user);
    }

    pub fn upsert_job_assignment(&self, job: JobAssignment) {
        let mut state = self.state.lock().expect("directory mutex poisoned");
        state.job_assignments.insert(job.id, job);
    }

    pub fn remove_job_assignment(&self, id: JobAssignmentId) {
        let mut state = self.state.lock().expect("directory mutex poisoned");
        state.job_assignments.remove(&id);
    }
}

impl Directory for InMemoryDirectory {
    fn user_exists(&self, user: UserId) -> bool {
        let state = self.state.lock().expect("directory mutex poisoned");
        state.users.contains(&user)
    }

    fn job_assignments_for(&self, user: UserId) -> Vec<JobAssignment> {
        let state = self.state.lock().expect("directory mutex poisoned");
        state
            .job_assignments
            .values()
            .filter(|job| job.user_id == user)
            .cloned()
            .collect()
    }

    fn job_assignment(&self, id: JobAssignmentId) -> Option<JobAssignment> {
        let state = self.state.lock().expect("directory mutex poisoned");
        state.job_assignments.get(&id).cloned()
    }
}
