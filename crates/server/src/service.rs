use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use estateflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink,
};
use estateflow_core::domain::property::{
    ApprovalState, Property, PropertyId, PropertyKind,
};
use estateflow_core::domain::workflow::{
    Actor, DecisionKind, EntityType, Workflow,
};
use estateflow_core::errors::{ApplicationError, DomainError};
use estateflow_core::workflow::engine::{DecisionOutcome, WorkflowEngine};
use estateflow_db::repositories::{PropertyRepository, RepositoryError, WorkflowRepository};

/// Inputs for registering a new property. The service assigns the id.
#[derive(Clone, Debug)]
pub struct RegisterProperty {
    pub name: String,
    pub address: String,
    pub owner_id: String,
    pub kind: PropertyKind,
    pub market_value: Option<Decimal>,
}

/// A stage decision request as it arrives from the interface layer. When
/// `stage_number` is absent the decision targets the current stage.
#[derive(Clone, Debug)]
pub struct DecisionRequest {
    pub stage_number: Option<u32>,
    pub decision: DecisionKind,
    pub actor: Actor,
    pub comments: Option<String>,
}

/// Application service tying the workflow engine to persistence. Holds
/// repositories behind trait objects so tests can run against the in-memory
/// implementations.
pub struct ApprovalService {
    properties: Arc<dyn PropertyRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    engine: WorkflowEngine,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalService {
    pub fn new(
        properties: Arc<dyn PropertyRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { properties, workflows, engine: WorkflowEngine, audit }
    }

    pub async fn register_property(
        &self,
        input: RegisterProperty,
        correlation_id: &str,
    ) -> Result<Property, ApplicationError> {
        let now = Utc::now();
        let property = Property {
            id: PropertyId(Uuid::new_v4().to_string()),
            name: input.name,
            address: input.address,
            owner_id: input.owner_id,
            kind: input.kind,
            market_value: input.market_value,
            approval_state: ApprovalState::NotSubmitted,
            created_at: now,
            updated_at: now,
        };
        property.validate().map_err(DomainError::from)?;

        self.properties.save(property.clone()).await.map_err(persistence_error)?;
        self.audit.emit(
            AuditEvent::new(
                Some(property.id.clone()),
                correlation_id,
                "property.registered",
                AuditCategory::Ingress,
                property.owner_id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("kind", property.kind.label()),
        );
        Ok(property)
    }

    pub async fn get_property(&self, id: &str) -> Result<Property, ApplicationError> {
        self.properties
            .find_by_id(&PropertyId(id.to_string()))
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ApplicationError::NotFound { resource: "property", id: id.to_string() })
    }

    pub async fn list_properties(&self, limit: u32) -> Result<Vec<Property>, ApplicationError> {
        self.properties.list(limit).await.map_err(persistence_error)
    }

    /// Start the approval workflow for a property. The stage plan is derived
    /// from the property kind and the first stage is active immediately.
    pub async fn submit_for_approval(
        &self,
        property_id: &str,
        correlation_id: &str,
    ) -> Result<Workflow, ApplicationError> {
        let mut property = self.get_property(property_id).await?;

        let workflow = self.engine.create(
            EntityType::Property,
            property.id.0.clone(),
            &property.kind,
            property.owner_id.clone(),
        );
        self.workflows.create(&workflow).await.map_err(persistence_error)?;

        property.sync_from_workflow(workflow.status, workflow.updated_at);
        self.properties.save(property.clone()).await.map_err(persistence_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(property.id.clone()),
                correlation_id,
                "workflow.submitted",
                AuditCategory::Workflow,
                property.owner_id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("workflow_id", workflow.id.0.clone())
            .with_metadata("stages", workflow.stages.len().to_string()),
        );
        Ok(workflow)
    }

    /// Record a stage decision and mirror the resulting status onto the
    /// property. A stale decision surfaces as `Conflict` from storage.
    pub async fn decide(
        &self,
        property_id: &str,
        request: DecisionRequest,
        correlation_id: &str,
    ) -> Result<(Workflow, DecisionOutcome), ApplicationError> {
        let mut property = self.get_property(property_id).await?;
        let mut workflow = self.get_workflow(property_id).await?;

        // Closed workflows have no current stage; the engine rejects the
        // decision before the fallback stage number matters.
        let stage_number =
            request.stage_number.or(workflow.current_stage).unwrap_or(1);

        let context = AuditContext::new(
            Some(property.id.clone()),
            correlation_id,
            request.actor.user_id.clone(),
        );
        let outcome = self
            .engine
            .apply_with_audit(
                &mut workflow,
                stage_number,
                request.decision,
                &request.actor,
                request.comments,
                Utc::now(),
                self.audit.as_ref(),
                &context,
            )
            .map_err(DomainError::from)?;

        self.workflows
            .apply_decision(&workflow, stage_number)
            .await
            .map_err(persistence_error)?;

        property.sync_from_workflow(workflow.status, workflow.updated_at);
        self.properties.save(property).await.map_err(persistence_error)?;

        Ok((workflow, outcome))
    }

    /// Reopen a workflow parked in `MoreInfoRequired` with a fresh attempt.
    pub async fn resubmit(
        &self,
        property_id: &str,
        correlation_id: &str,
    ) -> Result<Workflow, ApplicationError> {
        let mut property = self.get_property(property_id).await?;
        let mut workflow = self.get_workflow(property_id).await?;

        self.engine
            .resubmit(&mut workflow, &property.kind, property.owner_id.clone(), Utc::now())
            .map_err(DomainError::from)?;
        self.workflows.reopen(&workflow).await.map_err(persistence_error)?;

        property.sync_from_workflow(workflow.status, workflow.updated_at);
        self.properties.save(property.clone()).await.map_err(persistence_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(property.id.clone()),
                correlation_id,
                "workflow.resubmitted",
                AuditCategory::Workflow,
                property.owner_id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("attempt", workflow.attempt.to_string()),
        );
        Ok(workflow)
    }

    pub async fn get_workflow(&self, property_id: &str) -> Result<Workflow, ApplicationError> {
        self.workflows
            .find_by_entity(EntityType::Property, property_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "workflow",
                id: property_id.to_string(),
            })
    }
}

fn persistence_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
        other => ApplicationError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use estateflow_core::audit::InMemoryAuditSink;
    use estateflow_core::domain::property::{ApprovalState, PropertyKind};
    use estateflow_core::domain::workflow::{Actor, DecisionKind, WorkflowStatus};
    use estateflow_core::errors::ApplicationError;
    use estateflow_core::roles::Role;
    use estateflow_db::repositories::{InMemoryPropertyRepository, InMemoryWorkflowRepository};

    use super::{ApprovalService, DecisionRequest, RegisterProperty};

    fn service_with_sink() -> (ApprovalService, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        let service = ApprovalService::new(
            Arc::new(InMemoryPropertyRepository::default()),
            Arc::new(InMemoryWorkflowRepository::default()),
            Arc::new(sink.clone()),
        );
        (service, sink)
    }

    fn condo_input() -> RegisterProperty {
        RegisterProperty {
            name: "Azure Heights 12B".to_string(),
            address: "88 Marina Boulevard".to_string(),
            owner_id: "owner-1".to_string(),
            kind: PropertyKind::Condominium { unit_number: "12B".to_string(), floor: 12 },
            market_value: Some(Decimal::new(18_000_000, 2)),
        }
    }

    fn decision(decision: DecisionKind, role: Role) -> DecisionRequest {
        DecisionRequest {
            stage_number: None,
            decision,
            actor: Actor { user_id: format!("user-{}", role.as_str()), role },
            comments: None,
        }
    }

    #[tokio::test]
    async fn register_rejects_invalid_kind_fields() {
        let (service, _) = service_with_sink();
        let mut input = condo_input();
        input.kind = PropertyKind::Condominium { unit_number: "  ".to_string(), floor: 3 };

        let error = service.register_property(input, "req-1").await.expect_err("invalid unit");
        assert!(matches!(error, ApplicationError::Domain(_)));
    }

    #[tokio::test]
    async fn full_approval_path_mirrors_status_onto_property() {
        let (service, _) = service_with_sink();
        let property =
            service.register_property(condo_input(), "req-1").await.expect("register");
        assert_eq!(property.approval_state, ApprovalState::NotSubmitted);

        let workflow =
            service.submit_for_approval(&property.id.0, "req-2").await.expect("submit");
        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        let stored = service.get_property(&property.id.0).await.expect("get");
        assert_eq!(stored.approval_state, ApprovalState::InProgress);

        service
            .decide(&property.id.0, decision(DecisionKind::Approved, Role::EstatesOfficer), "req-3")
            .await
            .expect("stage 1");
        let (_, outcome) = service
            .decide(
                &property.id.0,
                decision(DecisionKind::Approved, Role::PropertyManager),
                "req-4",
            )
            .await
            .expect("stage 2");
        assert!(outcome.closed());

        let approved = service.get_property(&property.id.0).await.expect("get");
        assert_eq!(approved.approval_state, ApprovalState::Approved);
    }

    #[tokio::test]
    async fn double_submit_is_a_conflict() {
        let (service, _) = service_with_sink();
        let property =
            service.register_property(condo_input(), "req-1").await.expect("register");

        service.submit_for_approval(&property.id.0, "req-2").await.expect("first submit");
        let error = service
            .submit_for_approval(&property.id.0, "req-3")
            .await
            .expect_err("second submit");
        assert!(matches!(error, ApplicationError::Conflict(_)));
    }

    #[tokio::test]
    async fn more_info_then_resubmit_opens_a_second_attempt() {
        let (service, _) = service_with_sink();
        let property =
            service.register_property(condo_input(), "req-1").await.expect("register");
        service.submit_for_approval(&property.id.0, "req-2").await.expect("submit");

        service
            .decide(&property.id.0, decision(DecisionKind::MoreInfo, Role::EstatesOfficer), "req-3")
            .await
            .expect("more info");
        let parked = service.get_property(&property.id.0).await.expect("get");
        assert_eq!(parked.approval_state, ApprovalState::MoreInfoRequired);

        let workflow = service.resubmit(&property.id.0, "req-4").await.expect("resubmit");
        assert_eq!(workflow.attempt, 2);
        assert_eq!(workflow.status, WorkflowStatus::InProgress);

        let reopened = service.get_property(&property.id.0).await.expect("get");
        assert_eq!(reopened.approval_state, ApprovalState::InProgress);
    }

    #[tokio::test]
    async fn decide_without_workflow_is_not_found() {
        let (service, _) = service_with_sink();
        let property =
            service.register_property(condo_input(), "req-1").await.expect("register");

        let error = service
            .decide(&property.id.0, decision(DecisionKind::Approved, Role::EstatesOfficer), "req-2")
            .await
            .expect_err("no workflow yet");
        assert!(matches!(error, ApplicationError::NotFound { resource: "workflow", .. }));
    }

    #[tokio::test]
    async fn lifecycle_emits_audit_trail() {
        let (service, sink) = service_with_sink();
        let property =
            service.register_property(condo_input(), "req-1").await.expect("register");
        service.submit_for_approval(&property.id.0, "req-2").await.expect("submit");
        service
            .decide(&property.id.0, decision(DecisionKind::Approved, Role::EstatesOfficer), "req-3")
            .await
            .expect("stage 1");

        let event_types: Vec<String> =
            sink.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(
            event_types,
            vec!["property.registered", "workflow.submitted", "workflow.decision_applied"]
        );
    }
}
