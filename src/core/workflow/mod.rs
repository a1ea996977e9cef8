// Moderator workflow - registry, decisions, penalty policy and the audit trail.

pub mod audit_store;
pub mod penalty_policy;
pub mod workflow_models;
pub mod workflow_service;

pub use audit_store::*;
pub use penalty_policy::*;
pub use workflow_models::*;
pub use workflow_service::*;
