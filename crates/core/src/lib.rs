pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod roles;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::property::{ApprovalState, Property, PropertyId, PropertyKind};
pub use domain::workflow::{
    Actor, DecisionKind, EntityType, Stage, StageDecision, Workflow, WorkflowId, WorkflowStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use roles::Role;
pub use workflow::engine::{stage_plan, DecisionOutcome, WorkflowEngine, WorkflowError};
