use chrono::{DateTime, Utc};
use sqlx::Row;

use estateflow_core::domain::workflow::{
    EntityType, Stage, StageDecision, Workflow, WorkflowId, WorkflowStatus,
};
use estateflow_core::roles::Role;

use super::{RepositoryError, WorkflowRepository};
use crate::DbPool;

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> WorkflowStatus {
    match s {
        "in_progress" => WorkflowStatus::InProgress,
        "approved" => WorkflowStatus::Approved,
        "rejected" => WorkflowStatus::Rejected,
        "more_info_required" => WorkflowStatus::MoreInfoRequired,
        _ => WorkflowStatus::Pending,
    }
}

pub fn workflow_status_as_str(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Pending => "pending",
        WorkflowStatus::InProgress => "in_progress",
        WorkflowStatus::Approved => "approved",
        WorkflowStatus::Rejected => "rejected",
        WorkflowStatus::MoreInfoRequired => "more_info_required",
    }
}

fn parse_decision(s: &str) -> StageDecision {
    match s {
        "approved" => StageDecision::Approved,
        "rejected" => StageDecision::Rejected,
        "more_info" => StageDecision::MoreInfo,
        _ => StageDecision::Pending,
    }
}

pub fn stage_decision_as_str(decision: StageDecision) -> &'static str {
    match decision {
        StageDecision::Pending => "pending",
        StageDecision::Approved => "approved",
        StageDecision::Rejected => "rejected",
        StageDecision::MoreInfo => "more_info",
    }
}

fn parse_entity_type(s: &str) -> Result<EntityType, RepositoryError> {
    match s {
        "property" => Ok(EntityType::Property),
        other => Err(RepositoryError::Decode(format!("unknown entity type `{other}`"))),
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_stage(row: &sqlx::sqlite::SqliteRow) -> Result<Stage, RepositoryError> {
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let attempt: i64 =
        row.try_get("attempt").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_number: i64 =
        row.try_get("stage_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let required_role: String =
        row.try_get("required_role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decision: String =
        row.try_get("decision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_by: Option<String> =
        row.try_get("decided_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comments: Option<String> =
        row.try_get("comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let required_role: Role = required_role
        .parse()
        .map_err(|e| RepositoryError::Decode(format!("required_role: {e}")))?;

    Ok(Stage {
        workflow_id: WorkflowId(workflow_id),
        attempt: attempt as u32,
        stage_number: stage_number as u32,
        required_role,
        decision: parse_decision(&decision),
        decided_by,
        comments,
        decided_at: decided_at.as_deref().map(parse_timestamp),
    })
}

fn row_to_workflow(
    row: &sqlx::sqlite::SqliteRow,
    stages: Vec<Stage>,
) -> Result<Workflow, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_type: String =
        row.try_get("entity_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let entity_id: String =
        row.try_get("entity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let attempt: i64 =
        row.try_get("attempt").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_stage: Option<i64> =
        row.try_get("current_stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let initiated_by: String =
        row.try_get("initiated_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Workflow {
        id: WorkflowId(id),
        entity_type: parse_entity_type(&entity_type)?,
        entity_id,
        status: parse_status(&status),
        attempt: attempt as u32,
        current_stage: current_stage.map(|n| n as u32),
        initiated_by,
        stages,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl SqlWorkflowRepository {
    async fn load_stages(&self, workflow_id: &str) -> Result<Vec<Stage>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT workflow_id, attempt, stage_number, required_role, decision,
                    decided_by, comments, decided_at
             FROM workflow_stage WHERE workflow_id = ?
             ORDER BY attempt ASC, stage_number ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stage).collect::<Result<Vec<_>, _>>()
    }

    async fn insert_stages(&self, stages: &[&Stage]) -> Result<(), RepositoryError> {
        for stage in stages {
            sqlx::query(
                "INSERT INTO workflow_stage (workflow_id, attempt, stage_number, required_role,
                                             decision, decided_by, comments, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&stage.workflow_id.0)
            .bind(stage.attempt as i64)
            .bind(stage.stage_number as i64)
            .bind(stage.required_role.as_str())
            .bind(stage_decision_as_str(stage.decision))
            .bind(&stage.decided_by)
            .bind(&stage.comments)
            .bind(stage.decided_at.map(|dt| dt.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn update_workflow_row(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE approval_workflow
             SET status = ?, attempt = ?, current_stage = ?, initiated_by = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(workflow_status_as_str(workflow.status))
        .bind(workflow.attempt as i64)
        .bind(workflow.current_stage.map(|n| n as i64))
        .bind(&workflow.initiated_by)
        .bind(workflow.updated_at.to_rfc3339())
        .bind(&workflow.id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, entity_type, entity_id, status, attempt, current_stage,
                    initiated_by, created_at, updated_at
             FROM approval_workflow WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => {
                let stages = self.load_stages(&id.0).await?;
                Ok(Some(row_to_workflow(r, stages)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, entity_type, entity_id, status, attempt, current_stage,
                    initiated_by, created_at, updated_at
             FROM approval_workflow WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => {
                let id: String =
                    r.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let stages = self.load_stages(&id).await?;
                Ok(Some(row_to_workflow(r, stages)?))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO approval_workflow (id, entity_type, entity_id, status, attempt,
                                            current_stage, initiated_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id.0)
        .bind(workflow.entity_type.as_str())
        .bind(&workflow.entity_id)
        .bind(workflow_status_as_str(workflow.status))
        .bind(workflow.attempt as i64)
        .bind(workflow.current_stage.map(|n| n as i64))
        .bind(&workflow.initiated_by)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                return Err(RepositoryError::Conflict(format!(
                    "a workflow already exists for {} `{}`",
                    workflow.entity_type.as_str(),
                    workflow.entity_id
                )));
            }
            Err(error) => return Err(error.into()),
        }

        let stages: Vec<&Stage> = workflow.stages.iter().collect();
        self.insert_stages(&stages).await
    }

    async fn apply_decision(
        &self,
        workflow: &Workflow,
        stage_number: u32,
    ) -> Result<(), RepositoryError> {
        let stage = workflow.stage(stage_number).ok_or_else(|| {
            RepositoryError::Decode(format!("workflow has no stage {stage_number}"))
        })?;

        // The pending predicate is the optimistic guard against two callers
        // deciding the same stage: the second UPDATE matches zero rows.
        let result = sqlx::query(
            "UPDATE workflow_stage
             SET decision = ?, decided_by = ?, comments = ?, decided_at = ?
             WHERE workflow_id = ? AND attempt = ? AND stage_number = ? AND decision = 'pending'",
        )
        .bind(stage_decision_as_str(stage.decision))
        .bind(&stage.decided_by)
        .bind(&stage.comments)
        .bind(stage.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&workflow.id.0)
        .bind(stage.attempt as i64)
        .bind(stage.stage_number as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "stage {stage_number} was decided by a concurrent request"
            )));
        }

        self.update_workflow_row(workflow).await
    }

    async fn reopen(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let attempt = workflow.attempt;
        let new_stages: Vec<&Stage> =
            workflow.stages.iter().filter(|stage| stage.attempt == attempt).collect();
        self.insert_stages(&new_stages).await?;
        self.update_workflow_row(workflow).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use estateflow_core::domain::property::PropertyKind;
    use estateflow_core::domain::workflow::{
        Actor, DecisionKind, EntityType, StageDecision, WorkflowStatus,
    };
    use estateflow_core::roles::Role;
    use estateflow_core::workflow::engine::WorkflowEngine;

    use super::SqlWorkflowRepository;
    use crate::repositories::{RepositoryError, WorkflowRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn condo() -> PropertyKind {
        PropertyKind::Condominium { unit_number: "7A".to_string(), floor: 7 }
    }

    fn officer() -> Actor {
        Actor { user_id: "u-officer".to_string(), role: Role::EstatesOfficer }
    }

    #[tokio::test]
    async fn create_and_find_round_trips_stages_in_order() {
        let pool = setup().await;
        let repo = SqlWorkflowRepository::new(pool);
        let workflow = WorkflowEngine.create(EntityType::Property, "P-1", &condo(), "owner-1");

        repo.create(&workflow).await.expect("create");
        let found = repo
            .find_by_entity(EntityType::Property, "P-1")
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.id, workflow.id);
        assert_eq!(found.status, WorkflowStatus::InProgress);
        assert_eq!(found.current_stage, Some(1));
        assert_eq!(found.stages.len(), 2);
        assert_eq!(found.stages[0].required_role, Role::EstatesOfficer);
        assert_eq!(found.stages[1].required_role, Role::PropertyManager);
    }

    #[tokio::test]
    async fn create_conflicts_when_entity_already_has_a_workflow() {
        let pool = setup().await;
        let repo = SqlWorkflowRepository::new(pool);

        let first = WorkflowEngine.create(EntityType::Property, "P-1", &condo(), "owner-1");
        repo.create(&first).await.expect("first create");

        let second = WorkflowEngine.create(EntityType::Property, "P-1", &condo(), "owner-1");
        let error = repo.create(&second).await.expect_err("duplicate entity");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn apply_decision_persists_stage_and_workflow_advance() {
        let pool = setup().await;
        let repo = SqlWorkflowRepository::new(pool);
        let engine = WorkflowEngine;
        let mut workflow = engine.create(EntityType::Property, "P-1", &condo(), "owner-1");
        repo.create(&workflow).await.expect("create");

        engine
            .apply(&mut workflow, 1, DecisionKind::Approved, &officer(), None, Utc::now())
            .expect("approve stage 1");
        repo.apply_decision(&workflow, 1).await.expect("persist decision");

        let found = repo.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(found.current_stage, Some(2));
        assert_eq!(found.stages[0].decision, StageDecision::Approved);
        assert_eq!(found.stages[0].decided_by.as_deref(), Some("u-officer"));
    }

    #[tokio::test]
    async fn second_decision_on_same_stage_is_a_conflict() {
        let pool = setup().await;
        let repo = SqlWorkflowRepository::new(pool);
        let engine = WorkflowEngine;
        let mut workflow = engine.create(EntityType::Property, "P-1", &condo(), "owner-1");
        repo.create(&workflow).await.expect("create");

        engine
            .apply(&mut workflow, 1, DecisionKind::Approved, &officer(), None, Utc::now())
            .expect("approve stage 1");
        repo.apply_decision(&workflow, 1).await.expect("first persist");

        // A second writer raced us to the same stage: the guarded UPDATE
        // matches nothing the second time.
        let error = repo.apply_decision(&workflow, 1).await.expect_err("double decision");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn reopen_persists_the_new_attempt() {
        let pool = setup().await;
        let repo = SqlWorkflowRepository::new(pool);
        let engine = WorkflowEngine;
        let mut workflow = engine.create(EntityType::Property, "P-1", &condo(), "owner-1");
        repo.create(&workflow).await.expect("create");

        engine
            .apply(
                &mut workflow,
                1,
                DecisionKind::MoreInfo,
                &officer(),
                Some("survey plan missing".to_string()),
                Utc::now(),
            )
            .expect("more info");
        repo.apply_decision(&workflow, 1).await.expect("persist more info");

        engine.resubmit(&mut workflow, &condo(), "owner-1", Utc::now()).expect("resubmit");
        repo.reopen(&workflow).await.expect("persist reopen");

        let found = repo.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(found.attempt, 2);
        assert_eq!(found.status, WorkflowStatus::InProgress);
        assert_eq!(found.stages.len(), 4);
        assert_eq!(found.pending_stage_count(), 2);
    }
}
