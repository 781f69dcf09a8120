//! Approval workflow engine.
//!
//! Workflows are bound to a tree of assignment nodes drawn from an external
//! organizational hierarchy. Approvers configured at one node propagate to
//! descendant nodes until a node declares its own override, and at runtime an
//! abstract approver (a fixed user or a relationship such as "manager")
//! resolves to concrete user ids for a specific applicant.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
