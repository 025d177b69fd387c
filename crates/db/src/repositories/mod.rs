use async_trait::async_trait;
use thiserror::Error;

use estateflow_core::domain::property::{Property, PropertyId};
use estateflow_core::domain::workflow::{EntityType, Workflow, WorkflowId};

pub mod memory;
pub mod property;
pub mod workflow;

pub use memory::{InMemoryPropertyRepository, InMemoryWorkflowRepository};
pub use property::SqlPropertyRepository;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    async fn save(&self, property: Property) -> Result<(), RepositoryError>;
    async fn list(&self, limit: u32) -> Result<Vec<Property>, RepositoryError>;
}

/// Workflow persistence. `apply_decision` and `reopen` carry the concurrency
/// guard: a decision only lands if the target stage is still pending in
/// storage, otherwise the call surfaces `Conflict`.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<Workflow>, RepositoryError>;

    /// Persist a freshly created workflow. Fails with `Conflict` when the
    /// entity already has one.
    async fn create(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    /// Persist the decision recorded on `stage_number` of the workflow's
    /// current attempt plus the advanced workflow row.
    async fn apply_decision(
        &self,
        workflow: &Workflow,
        stage_number: u32,
    ) -> Result<(), RepositoryError>;

    /// Persist a resubmission: the new attempt's pending stages and the
    /// reopened workflow row.
    async fn reopen(&self, workflow: &Workflow) -> Result<(), RepositoryError>;
}
