use std::collections::HashMap;

use tokio::sync::RwLock;

use estateflow_core::domain::property::{Property, PropertyId};
use estateflow_core::domain::workflow::{EntityType, StageDecision, Workflow, WorkflowId};

use super::{PropertyRepository, RepositoryError, WorkflowRepository};

#[derive(Default)]
pub struct InMemoryPropertyRepository {
    properties: RwLock<HashMap<String, Property>>,
}

#[async_trait::async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let properties = self.properties.read().await;
        Ok(properties.get(&id.0).cloned())
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        properties.insert(property.id.0.clone(), property);
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<Property>, RepositoryError> {
        let properties = self.properties.read().await;
        let mut listed: Vec<Property> = properties.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listed.truncate(limit as usize);
        Ok(listed)
    }
}

/// Keeps the same conflict semantics as the SQL repository so services can be
/// tested against either implementation.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, Workflow>>,
}

#[async_trait::async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id.0).cloned())
    }

    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .find(|workflow| {
                workflow.entity_type == entity_type && workflow.entity_id == entity_id
            })
            .cloned())
    }

    async fn create(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        let duplicate = workflows.values().any(|existing| {
            existing.entity_type == workflow.entity_type
                && existing.entity_id == workflow.entity_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "a workflow already exists for {} `{}`",
                workflow.entity_type.as_str(),
                workflow.entity_id
            )));
        }
        workflows.insert(workflow.id.0.clone(), workflow.clone());
        Ok(())
    }

    async fn apply_decision(
        &self,
        workflow: &Workflow,
        stage_number: u32,
    ) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        let stored = workflows.get(&workflow.id.0).ok_or_else(|| {
            RepositoryError::Decode(format!("workflow `{}` is not stored", workflow.id.0))
        })?;

        let attempt = workflow.attempt;
        let still_pending = stored.stages.iter().any(|stage| {
            stage.attempt == attempt
                && stage.stage_number == stage_number
                && stage.decision == StageDecision::Pending
        });
        if !still_pending {
            return Err(RepositoryError::Conflict(format!(
                "stage {stage_number} was decided by a concurrent request"
            )));
        }

        workflows.insert(workflow.id.0.clone(), workflow.clone());
        Ok(())
    }

    async fn reopen(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow.clone());
        Ok(())
    }
}
