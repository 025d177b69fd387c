use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::workflow::WorkflowStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Property variants carry their own required fields; validation is a single
/// exhaustive match rather than per-type dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    Commercial { floor_area_sqm: u32, zoning: String },
    Condominium { unit_number: String, floor: i16 },
    Townhouse { lot_number: String },
    Land { parcel_number: String, area_sqm: u32 },
}

impl PropertyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Commercial { .. } => "commercial",
            Self::Condominium { .. } => "condominium",
            Self::Townhouse { .. } => "townhouse",
            Self::Land { .. } => "land",
        }
    }

    pub fn validate(&self) -> Result<(), PropertyError> {
        match self {
            Self::Commercial { floor_area_sqm, zoning } => {
                if *floor_area_sqm == 0 {
                    return Err(PropertyError::invalid(
                        "floor_area_sqm",
                        "commercial floor area must be greater than zero",
                    ));
                }
                if zoning.trim().is_empty() {
                    return Err(PropertyError::invalid(
                        "zoning",
                        "commercial properties require a zoning designation",
                    ));
                }
            }
            Self::Condominium { unit_number, .. } => {
                if unit_number.trim().is_empty() {
                    return Err(PropertyError::invalid(
                        "unit_number",
                        "condominium unit number is required",
                    ));
                }
            }
            Self::Townhouse { lot_number } => {
                if lot_number.trim().is_empty() {
                    return Err(PropertyError::invalid(
                        "lot_number",
                        "townhouse lot number is required",
                    ));
                }
            }
            Self::Land { parcel_number, area_sqm } => {
                if parcel_number.trim().is_empty() {
                    return Err(PropertyError::invalid(
                        "parcel_number",
                        "land parcel number is required",
                    ));
                }
                if *area_sqm == 0 {
                    return Err(PropertyError::invalid(
                        "area_sqm",
                        "land area must be greater than zero",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Denormalized approval status mirrored from the owning workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    NotSubmitted,
    Pending,
    InProgress,
    Approved,
    Rejected,
    MoreInfoRequired,
}

impl From<WorkflowStatus> for ApprovalState {
    fn from(status: WorkflowStatus) -> Self {
        match status {
            WorkflowStatus::Pending => Self::Pending,
            WorkflowStatus::InProgress => Self::InProgress,
            WorkflowStatus::Approved => Self::Approved,
            WorkflowStatus::Rejected => Self::Rejected,
            WorkflowStatus::MoreInfoRequired => Self::MoreInfoRequired,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub address: String,
    pub owner_id: String,
    pub kind: PropertyKind,
    pub market_value: Option<Decimal>,
    pub approval_state: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn validate(&self) -> Result<(), PropertyError> {
        if self.name.trim().is_empty() {
            return Err(PropertyError::invalid("name", "property name is required"));
        }
        if self.address.trim().is_empty() {
            return Err(PropertyError::invalid("address", "property address is required"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(PropertyError::invalid("owner_id", "property owner is required"));
        }
        if let Some(value) = self.market_value {
            if value < Decimal::ZERO {
                return Err(PropertyError::invalid(
                    "market_value",
                    "market value cannot be negative",
                ));
            }
        }
        self.kind.validate()
    }

    /// Mirror the workflow's aggregate status onto the property record.
    pub fn sync_from_workflow(&mut self, status: WorkflowStatus, at: DateTime<Utc>) {
        self.approval_state = status.into();
        self.updated_at = at;
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("property field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl PropertyError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }
}
