pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{ScenarioSeedInfo, SeedDataset, SeedReport, SeedVerification};
pub use repositories::{
    InMemoryPropertyRepository, InMemoryWorkflowRepository, PropertyRepository, RepositoryError,
    SqlPropertyRepository, SqlWorkflowRepository, WorkflowRepository,
};
