use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical seed contract: one property per approval scenario.
const SEED_SCENARIOS: &[SeedScenario] = &[
    SeedScenario {
        scenario: "commercial_in_review",
        property_id: "prop-commercial-001",
        approval_state: "in_progress",
        workflow_id: "wf-commercial-001",
        workflow_status: "in_progress",
        current_stage: Some(1),
        stage_count: 3,
        pending_stage_count: 3,
        description: "Commercial property mid-review, all stages pending",
    },
    SeedScenario {
        scenario: "condominium_approved",
        property_id: "prop-condo-001",
        approval_state: "approved",
        workflow_id: "wf-condo-001",
        workflow_status: "approved",
        current_stage: None,
        stage_count: 2,
        pending_stage_count: 0,
        description: "Condominium fully approved through both stages",
    },
    SeedScenario {
        scenario: "townhouse_more_info",
        property_id: "prop-town-001",
        approval_state: "more_info_required",
        workflow_id: "wf-town-001",
        workflow_status: "more_info_required",
        current_stage: None,
        stage_count: 2,
        pending_stage_count: 0,
        description: "Townhouse sent back for more information at stage 2",
    },
];

const SEED_PROPERTY_IDS: &[&str] = &["prop-commercial-001", "prop-condo-001", "prop-town-001"];

const SEED_WORKFLOW_IDS: &[&str] = &["wf-commercial-001", "wf-condo-001", "wf-town-001"];

/// Deterministic seed dataset covering the three canonical approval
/// scenarios. Loading is idempotent.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedReport, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let scenarios_seeded = SEED_SCENARIOS
            .iter()
            .map(|scenario| ScenarioSeedInfo {
                scenario: scenario.scenario,
                property_id: scenario.property_id,
                description: scenario.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedReport { scenarios_seeded })
    }

    /// Verify that the seeded rows match the scenario contract.
    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let mut checks = Vec::new();

        for scenario in SEED_SCENARIOS {
            let property_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM property WHERE id = ?1 AND approval_state = ?2)",
            )
            .bind(scenario.property_id)
            .bind(scenario.approval_state)
            .fetch_one(pool)
            .await?;
            checks.push((scenario.property_id, property_ok == 1));

            let workflow_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM approval_workflow
                 WHERE id = ?1 AND entity_id = ?2 AND status = ?3
                   AND current_stage IS ?4)",
            )
            .bind(scenario.workflow_id)
            .bind(scenario.property_id)
            .bind(scenario.workflow_status)
            .bind(scenario.current_stage)
            .fetch_one(pool)
            .await?;
            checks.push((scenario.workflow_id, workflow_ok == 1));

            let stage_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM workflow_stage WHERE workflow_id = ?1")
                    .bind(scenario.workflow_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((scenario.stage_count_label(), stage_count == scenario.stage_count));

            let pending_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM workflow_stage
                 WHERE workflow_id = ?1 AND decision = 'pending'",
            )
            .bind(scenario.workflow_id)
            .fetch_one(pool)
            .await?;
            checks.push((
                scenario.pending_count_label(),
                pending_count == scenario.pending_stage_count,
            ));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(SeedVerification { all_present, checks })
    }

    /// Remove the seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_workflows = sql_array_from_ids(SEED_WORKFLOW_IDS);
        let quoted_properties = sql_array_from_ids(SEED_PROPERTY_IDS);

        sqlx::query(&format!("DELETE FROM workflow_stage WHERE workflow_id IN {quoted_workflows}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM approval_workflow WHERE id IN {quoted_workflows}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM property WHERE id IN {quoted_properties}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedScenario {
    scenario: &'static str,
    property_id: &'static str,
    approval_state: &'static str,
    workflow_id: &'static str,
    workflow_status: &'static str,
    current_stage: Option<i64>,
    stage_count: i64,
    pending_stage_count: i64,
    description: &'static str,
}

impl SeedScenario {
    fn stage_count_label(&self) -> &'static str {
        match self.scenario {
            "commercial_in_review" => "commercial-stage-count",
            "condominium_approved" => "condo-stage-count",
            _ => "townhouse-stage-count",
        }
    }

    fn pending_count_label(&self) -> &'static str {
        match self.scenario {
            "commercial_in_review" => "commercial-pending-count",
            "condominium_approved" => "condo-pending-count",
            _ => "townhouse-pending-count",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedReport {
    pub scenarios_seeded: Vec<ScenarioSeedInfo>,
}

#[derive(Debug)]
pub struct ScenarioSeedInfo {
    pub scenario: &'static str,
    pub property_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn seed_load_verify_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = SeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = SeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present);
        assert_eq!(first.scenarios_seeded.len(), 3);

        let second = SeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = SeedDataset::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(second.scenarios_seeded.len(), 3);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_all_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        SeedDataset::load(&pool).await.expect("load seed fixtures");
        SeedDataset::clean(&pool).await.expect("clean seed fixtures");

        let verification = SeedDataset::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);

        let property_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM property")
            .fetch_one(&pool)
            .await
            .expect("count properties");
        assert_eq!(property_count, 0);
    }
}
