use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::property::PropertyKind;
use crate::domain::workflow::{
    Actor, DecisionKind, EntityType, Stage, StageDecision, Workflow, WorkflowId, WorkflowStatus,
};
use crate::roles::Role;

/// Fixed stage sequence for a property kind. Commercial and land parcels get
/// a director sign-off on top of the officer/manager chain.
pub fn stage_plan(kind: &PropertyKind) -> &'static [Role] {
    match kind {
        PropertyKind::Commercial { .. } | PropertyKind::Land { .. } => {
            &[Role::EstatesOfficer, Role::PropertyManager, Role::EstatesDirector]
        }
        PropertyKind::Condominium { .. } | PropertyKind::Townhouse { .. } => {
            &[Role::EstatesOfficer, Role::PropertyManager]
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow is {status:?}; stage decisions are only accepted while in progress")]
    WorkflowClosed { status: WorkflowStatus },
    #[error("stage {stage_number} is not the current stage (current is {current:?})")]
    NotCurrentStage { stage_number: u32, current: Option<u32> },
    #[error("stage {stage_number} has already been decided")]
    StageAlreadyDecided { stage_number: u32 },
    #[error("role `{actor_role}` cannot decide a stage requiring `{required_role}`")]
    UnauthorizedRole { actor_role: Role, required_role: Role },
    #[error("workflow has no stage {stage_number}")]
    UnknownStage { stage_number: u32 },
    #[error("resubmission is only allowed from more_info_required (status is {status:?})")]
    ResubmitNotAllowed { status: WorkflowStatus },
}

/// What a decision did to the workflow, for callers that mirror status onto
/// the owning entity and for audit metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub stage_number: u32,
    pub decision: StageDecision,
    pub from_status: WorkflowStatus,
    pub to_status: WorkflowStatus,
    pub next_stage: Option<u32>,
}

impl DecisionOutcome {
    pub fn closed(&self) -> bool {
        self.to_status != WorkflowStatus::InProgress
    }
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    /// Create a workflow for an entity with all stages pending. The first
    /// stage activates immediately, so a freshly created workflow is already
    /// `InProgress` with the pointer at stage 1.
    pub fn create(
        &self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        kind: &PropertyKind,
        initiated_by: impl Into<String>,
    ) -> Workflow {
        let id = WorkflowId(Uuid::new_v4().to_string());
        let now = Utc::now();
        let stages = stage_plan(kind)
            .iter()
            .enumerate()
            .map(|(index, role)| Stage::pending(id.clone(), 1, index as u32 + 1, *role))
            .collect();

        Workflow {
            id,
            entity_type,
            entity_id: entity_id.into(),
            status: WorkflowStatus::InProgress,
            attempt: 1,
            current_stage: Some(1),
            initiated_by: initiated_by.into(),
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Authorization check for a stage decision: the stage must be current
    /// and the role must equal or outrank the stage's required role.
    pub fn can_decide(&self, workflow: &Workflow, stage_number: u32, role: Role) -> bool {
        if workflow.status != WorkflowStatus::InProgress {
            return false;
        }
        if workflow.current_stage != Some(stage_number) {
            return false;
        }
        workflow
            .stage(stage_number)
            .is_some_and(|stage| role.satisfies(stage.required_role))
    }

    /// Record a decision on the target stage and advance the workflow.
    ///
    /// Approve of a non-final stage moves the pointer forward; approve of the
    /// final stage closes the workflow as Approved. Reject and MoreInfo close
    /// it immediately, short-circuiting the remaining stages.
    pub fn apply(
        &self,
        workflow: &mut Workflow,
        stage_number: u32,
        decision: DecisionKind,
        actor: &Actor,
        comments: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let from_status = workflow.status;
        if from_status != WorkflowStatus::InProgress {
            return Err(WorkflowError::WorkflowClosed { status: from_status });
        }

        let Some(stage) = workflow.stage(stage_number) else {
            return Err(WorkflowError::UnknownStage { stage_number });
        };
        if stage.decision != StageDecision::Pending {
            return Err(WorkflowError::StageAlreadyDecided { stage_number });
        }
        if workflow.current_stage != Some(stage_number) {
            return Err(WorkflowError::NotCurrentStage {
                stage_number,
                current: workflow.current_stage,
            });
        }
        if !actor.role.satisfies(stage.required_role) {
            return Err(WorkflowError::UnauthorizedRole {
                actor_role: actor.role,
                required_role: stage.required_role,
            });
        }

        let final_stage = workflow.final_stage_number();
        let recorded: StageDecision = decision.into();
        {
            let stage = workflow
                .stage_mut(stage_number)
                .ok_or(WorkflowError::UnknownStage { stage_number })?;
            stage.decision = recorded;
            stage.decided_by = Some(actor.user_id.clone());
            stage.comments = comments;
            stage.decided_at = Some(decided_at);
        }

        let (to_status, next_stage) = match decision {
            DecisionKind::Approved if stage_number < final_stage => {
                (WorkflowStatus::InProgress, Some(stage_number + 1))
            }
            DecisionKind::Approved => (WorkflowStatus::Approved, None),
            DecisionKind::Rejected => (WorkflowStatus::Rejected, None),
            DecisionKind::MoreInfo => (WorkflowStatus::MoreInfoRequired, None),
        };

        workflow.status = to_status;
        workflow.current_stage = next_stage;
        workflow.updated_at = decided_at;

        Ok(DecisionOutcome { stage_number, decision: recorded, from_status, to_status, next_stage })
    }

    /// Reopen a workflow parked in `MoreInfoRequired`. A fresh attempt of the
    /// full stage plan goes pending; decided stages of earlier attempts are
    /// kept as immutable history.
    pub fn resubmit(
        &self,
        workflow: &mut Workflow,
        kind: &PropertyKind,
        initiated_by: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if workflow.status != WorkflowStatus::MoreInfoRequired {
            return Err(WorkflowError::ResubmitNotAllowed { status: workflow.status });
        }

        workflow.attempt += 1;
        let attempt = workflow.attempt;
        let id = workflow.id.clone();
        workflow.stages.extend(
            stage_plan(kind)
                .iter()
                .enumerate()
                .map(|(index, role)| Stage::pending(id.clone(), attempt, index as u32 + 1, *role)),
        );
        workflow.status = WorkflowStatus::InProgress;
        workflow.current_stage = Some(1);
        workflow.initiated_by = initiated_by.into();
        workflow.updated_at = at;
        Ok(())
    }

    pub fn apply_with_audit<S>(
        &self,
        workflow: &mut Workflow,
        stage_number: u32,
        decision: DecisionKind,
        actor: &Actor,
        comments: Option<String>,
        decided_at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<DecisionOutcome, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(workflow, stage_number, decision, actor, comments, decided_at);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.property_id.clone(),
                        audit.correlation_id.clone(),
                        "workflow.decision_applied",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("stage", outcome.stage_number.to_string())
                    .with_metadata("decision", format!("{:?}", outcome.decision))
                    .with_metadata("from", format!("{:?}", outcome.from_status))
                    .with_metadata("to", format!("{:?}", outcome.to_status)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.property_id.clone(),
                        audit.correlation_id.clone(),
                        "workflow.decision_rejected",
                        AuditCategory::Workflow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("stage", stage_number.to_string())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
