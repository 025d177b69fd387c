pub mod property;
pub mod workflow;
