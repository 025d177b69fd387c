use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::Role;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Property,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    MoreInfoRequired,
}

/// Per-stage outcome. `Pending` is the only mutable state; everything else is
/// final for that stage within its attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDecision {
    Pending,
    Approved,
    Rejected,
    MoreInfo,
}

/// A caller-supplied decision. Deliberately excludes `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approved,
    Rejected,
    MoreInfo,
}

impl From<DecisionKind> for StageDecision {
    fn from(kind: DecisionKind) -> Self {
        match kind {
            DecisionKind::Approved => Self::Approved,
            DecisionKind::Rejected => Self::Rejected,
            DecisionKind::MoreInfo => Self::MoreInfo,
        }
    }
}

/// The `(user_id, role)` pair the workflow consumes. Identity and role
/// assignment live in external services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub workflow_id: WorkflowId,
    pub attempt: u32,
    pub stage_number: u32,
    pub required_role: Role,
    pub decision: StageDecision,
    pub decided_by: Option<String>,
    pub comments: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Stage {
    pub fn pending(
        workflow_id: WorkflowId,
        attempt: u32,
        stage_number: u32,
        required_role: Role,
    ) -> Self {
        Self {
            workflow_id,
            attempt,
            stage_number,
            required_role,
            decision: StageDecision::Pending,
            decided_by: None,
            comments: None,
            decided_at: None,
        }
    }
}

/// An approval process instance tied to one entity. The `current_stage`
/// pointer is an index invariant: while the workflow is in progress it names
/// the single pending stage of the current attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub status: WorkflowStatus,
    pub attempt: u32,
    pub current_stage: Option<u32>,
    pub initiated_by: String,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// The stage at the pointer, or None once the workflow has left
    /// `InProgress`.
    pub fn current_stage(&self) -> Option<&Stage> {
        let number = self.current_stage?;
        self.stage(number)
    }

    pub fn stage(&self, stage_number: u32) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| stage.attempt == self.attempt && stage.stage_number == stage_number)
    }

    pub fn stage_mut(&mut self, stage_number: u32) -> Option<&mut Stage> {
        let attempt = self.attempt;
        self.stages
            .iter_mut()
            .find(|stage| stage.attempt == attempt && stage.stage_number == stage_number)
    }

    /// Stages belonging to the current attempt, in stage order.
    pub fn active_stages(&self) -> impl Iterator<Item = &Stage> {
        let attempt = self.attempt;
        self.stages.iter().filter(move |stage| stage.attempt == attempt)
    }

    pub fn final_stage_number(&self) -> u32 {
        self.active_stages().map(|stage| stage.stage_number).max().unwrap_or(0)
    }

    pub fn pending_stage_count(&self) -> usize {
        self.active_stages()
            .filter(|stage| stage.decision == StageDecision::Pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{EntityType, Stage, StageDecision, Workflow, WorkflowId, WorkflowStatus};
    use crate::roles::Role;

    fn two_attempt_workflow() -> Workflow {
        let id = WorkflowId("WF-1".to_string());
        let now = Utc::now();
        let mut first = Stage::pending(id.clone(), 1, 1, Role::EstatesOfficer);
        first.decision = StageDecision::MoreInfo;
        Workflow {
            id: id.clone(),
            entity_type: EntityType::Property,
            entity_id: "P-1".to_string(),
            status: WorkflowStatus::InProgress,
            attempt: 2,
            current_stage: Some(1),
            initiated_by: "owner-1".to_string(),
            stages: vec![
                first,
                Stage::pending(id.clone(), 2, 1, Role::EstatesOfficer),
                Stage::pending(id, 2, 2, Role::PropertyManager),
            ],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stage_lookup_is_scoped_to_the_current_attempt() {
        let workflow = two_attempt_workflow();
        let current = workflow.current_stage().expect("current stage");
        assert_eq!(current.attempt, 2);
        assert_eq!(current.decision, StageDecision::Pending);
    }

    #[test]
    fn pending_count_ignores_prior_attempts() {
        let workflow = two_attempt_workflow();
        assert_eq!(workflow.pending_stage_count(), 2);
        assert_eq!(workflow.final_stage_number(), 2);
    }
}
