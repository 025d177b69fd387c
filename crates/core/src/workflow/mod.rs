pub mod engine;

pub use engine::{stage_plan, DecisionOutcome, WorkflowEngine, WorkflowError};
