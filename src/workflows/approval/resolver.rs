//! Runtime resolution of abstract approvers into concrete user ids.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::directory::{Directory, JobAssignment};
use super::domain::{
    ApproverKind, ApproverRecord, JobAssignmentId, UserId, RELATIONSHIP_MANAGER,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("unknown assignment approver type code {0}")]
    UnknownApproverType(u8),
    #[error("unknown approver relationship {0}")]
    UnknownRelationship(u64),
}

/// Resolves approver rows for one applicant. An optional job assignment id
/// disambiguates applicants holding several job assignments; without it every
/// current job assignment contributes its manager chain.
pub struct ApproverResolver<'a> {
    directory: &'a dyn Directory,
    applicant: UserId,
    job_assignment: Option<JobAssignmentId>,
}

impl<'a> ApproverResolver<'a> {
    pub fn from_user(
        directory: &'a dyn Directory,
        applicant: UserId,
        job_assignment: Option<JobAssignmentId>,
    ) -> Self {
        Self {
            directory,
            applicant,
            job_assignment,
        }
    }

    /// Union of candidate user ids across all records, deduplicated.
    ///
    /// A deleted user or job assignment yields nothing for that record — not
    /// a failure. An unrecognized type code or relationship aborts the whole
    /// call: it signals corrupted stored data, not a per-record condition.
    pub fn resolve(
        &self,
        records: &[ApproverRecord],
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<UserId>, ResolverError> {
        let mut approvers = BTreeSet::new();
        for record in records {
            match record.kind() {
                Some(ApproverKind::User) => {
                    let user = UserId(record.identifier);
                    if self.directory.user_exists(user) {
                        approvers.insert(user);
                    }
                }
                Some(ApproverKind::Relationship) => {
                    if record.identifier != RELATIONSHIP_MANAGER {
                        return Err(ResolverError::UnknownRelationship(record.identifier));
                    }
                    for job in self.applicant_job_assignments() {
                        approvers.extend(job.manager_candidates(now));
                    }
                }
                None => return Err(ResolverError::UnknownApproverType(record.type_code)),
            }
        }
        Ok(approvers)
    }

    fn applicant_job_assignments(&self) -> Vec<JobAssignment> {
        match self.job_assignment {
            Some(id) => self
                .directory
                .job_assignment(id)
                .into_iter()
                .filter(|job| job.user_id == self.applicant)
                .collect(),
            None => self.directory.job_assignments_for(self.applicant),
        }
    }
}
