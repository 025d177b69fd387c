use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use estateflow_core::domain::property::{ApprovalState, Property, PropertyId, PropertyKind};

use super::{PropertyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPropertyRepository {
    pool: DbPool,
}

impl SqlPropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_state(s: &str) -> ApprovalState {
    match s {
        "pending" => ApprovalState::Pending,
        "in_progress" => ApprovalState::InProgress,
        "approved" => ApprovalState::Approved,
        "rejected" => ApprovalState::Rejected,
        "more_info_required" => ApprovalState::MoreInfoRequired,
        _ => ApprovalState::NotSubmitted,
    }
}

pub fn approval_state_as_str(state: ApprovalState) -> &'static str {
    match state {
        ApprovalState::NotSubmitted => "not_submitted",
        ApprovalState::Pending => "pending",
        ApprovalState::InProgress => "in_progress",
        ApprovalState::Approved => "approved",
        ApprovalState::Rejected => "rejected",
        ApprovalState::MoreInfoRequired => "more_info_required",
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_property(row: &sqlx::sqlite::SqliteRow) -> Result<Property, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let address: String =
        row.try_get("address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_id: String =
        row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_details: String =
        row.try_get("kind_details").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let market_value_str: Option<String> =
        row.try_get("market_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_str: String =
        row.try_get("approval_state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind: PropertyKind = serde_json::from_str(&kind_details)
        .map_err(|e| RepositoryError::Decode(format!("kind_details: {e}")))?;
    let market_value = market_value_str
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|e| RepositoryError::Decode(format!("market_value: {e}")))
        })
        .transpose()?;

    Ok(Property {
        id: PropertyId(id),
        name,
        address,
        owner_id,
        kind,
        market_value,
        approval_state: parse_state(&state_str),
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

#[async_trait::async_trait]
impl PropertyRepository for SqlPropertyRepository {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, address, owner_id, kind, kind_details, market_value,
                    approval_state, created_at, updated_at
             FROM property WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_property(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        let kind_details = serde_json::to_string(&property.kind)
            .map_err(|e| RepositoryError::Decode(format!("kind_details: {e}")))?;
        let market_value = property.market_value.map(|value| value.to_string());

        sqlx::query(
            "INSERT INTO property (id, name, address, owner_id, kind, kind_details,
                                   market_value, approval_state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 address = excluded.address,
                 owner_id = excluded.owner_id,
                 kind = excluded.kind,
                 kind_details = excluded.kind_details,
                 market_value = excluded.market_value,
                 approval_state = excluded.approval_state,
                 updated_at = excluded.updated_at",
        )
        .bind(&property.id.0)
        .bind(&property.name)
        .bind(&property.address)
        .bind(&property.owner_id)
        .bind(property.kind.label())
        .bind(&kind_details)
        .bind(&market_value)
        .bind(approval_state_as_str(property.approval_state))
        .bind(property.created_at.to_rfc3339())
        .bind(property.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<Property>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, name, address, owner_id, kind, kind_details, market_value,
                    approval_state, created_at, updated_at
             FROM property ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_property).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use estateflow_core::domain::property::{
        ApprovalState, Property, PropertyId, PropertyKind,
    };

    use super::SqlPropertyRepository;
    use crate::repositories::PropertyRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_property(id: &str) -> Property {
        let now = Utc::now();
        Property {
            id: PropertyId(id.to_string()),
            name: "Harbourview Plaza".to_string(),
            address: "12 Quay Street".to_string(),
            owner_id: "owner-7".to_string(),
            kind: PropertyKind::Commercial { floor_area_sqm: 2_400, zoning: "B2".to_string() },
            market_value: Some(Decimal::new(45_000_000, 2)),
            approval_state: ApprovalState::NotSubmitted,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id_round_trips_the_kind_variant() {
        let pool = setup().await;
        let repo = SqlPropertyRepository::new(pool);
        let property = sample_property("P-1001");

        repo.save(property.clone()).await.expect("save");
        let found = repo
            .find_by_id(&PropertyId("P-1001".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.id, property.id);
        assert_eq!(found.kind, property.kind);
        assert_eq!(found.market_value, property.market_value);
        assert_eq!(found.approval_state, ApprovalState::NotSubmitted);
    }

    #[tokio::test]
    async fn save_upserts_approval_state() {
        let pool = setup().await;
        let repo = SqlPropertyRepository::new(pool);

        let property = sample_property("P-1001");
        repo.save(property.clone()).await.expect("save");

        let mut updated = property;
        updated.approval_state = ApprovalState::InProgress;
        updated.updated_at = Utc::now();
        repo.save(updated).await.expect("upsert");

        let found = repo
            .find_by_id(&PropertyId("P-1001".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found.approval_state, ApprovalState::InProgress);
    }

    #[tokio::test]
    async fn list_returns_most_recent_first_up_to_limit() {
        let pool = setup().await;
        let repo = SqlPropertyRepository::new(pool);

        for (index, id) in ["P-1", "P-2", "P-3"].iter().enumerate() {
            let mut property = sample_property(id);
            property.created_at = Utc::now() + chrono::Duration::seconds(index as i64);
            repo.save(property).await.expect("save");
        }

        let listed = repo.list(2).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id.0, "P-3");
    }
}
