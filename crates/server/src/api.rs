use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use estateflow_core::domain::property::{Property, PropertyKind};
use estateflow_core::domain::workflow::{Actor, DecisionKind, Workflow};
use estateflow_core::errors::{ApplicationError, InterfaceError};
use estateflow_core::roles::Role;

use crate::service::{ApprovalService, DecisionRequest, RegisterProperty};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ApprovalService>,
}

pub fn router(service: Arc<ApprovalService>) -> Router {
    Router::new()
        .route("/api/property", post(register_property).get(list_properties))
        .route("/api/property/{id}", get(get_property))
        .route("/api/property/{id}/submit", post(submit_for_approval))
        .route("/api/property/{id}/approval", put(record_decision))
        .route("/api/property/{id}/resubmit", post(resubmit))
        .route("/api/property/{id}/workflow", get(get_workflow))
        .with_state(ApiState { service })
}

#[derive(Debug, Deserialize)]
pub struct RegisterPropertyRequest {
    pub name: String,
    pub address: String,
    pub owner_id: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
    pub market_value: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub decision: String,
    pub actor_id: String,
    pub actor_role: String,
    pub stage_number: Option<u32>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
}

/// Interface error rendered as an HTTP response. The detailed message is
/// logged; the client sees the stable user-facing message plus the
/// correlation id to quote in support requests.
pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_kind, correlation_id) = match &self.0 {
            InterfaceError::BadRequest { message, correlation_id } => {
                log_interface_error("bad_request", message, correlation_id);
                (StatusCode::BAD_REQUEST, "bad_request", correlation_id.clone())
            }
            InterfaceError::Unauthorized { message, correlation_id } => {
                log_interface_error("unauthorized", message, correlation_id);
                (StatusCode::FORBIDDEN, "unauthorized", correlation_id.clone())
            }
            InterfaceError::NotFound { message, correlation_id } => {
                log_interface_error("not_found", message, correlation_id);
                (StatusCode::NOT_FOUND, "not_found", correlation_id.clone())
            }
            InterfaceError::Conflict { message, correlation_id } => {
                log_interface_error("conflict", message, correlation_id);
                (StatusCode::CONFLICT, "conflict", correlation_id.clone())
            }
            InterfaceError::ServiceUnavailable { message, correlation_id } => {
                log_interface_error("service_unavailable", message, correlation_id);
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", correlation_id.clone())
            }
            InterfaceError::Internal { message, correlation_id } => {
                log_interface_error("internal", message, correlation_id);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", correlation_id.clone())
            }
        };

        let body = ErrorBody {
            error: error_kind.to_string(),
            message: self.0.user_message(),
            correlation_id,
        };
        (status, Json(body)).into_response()
    }
}

fn log_interface_error(kind: &str, message: &str, correlation_id: &str) {
    tracing::warn!(
        event_name = "api.request_failed",
        error_kind = kind,
        correlation_id,
        detail = message,
        "request failed"
    );
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

async fn register_property(
    State(state): State<ApiState>,
    Json(body): Json<RegisterPropertyRequest>,
) -> Result<(StatusCode, Json<Property>), ApiError> {
    let correlation_id = new_correlation_id();
    let property = state
        .service
        .register_property(
            RegisterProperty {
                name: body.name,
                address: body.address,
                owner_id: body.owner_id,
                kind: body.kind,
                market_value: body.market_value,
            },
            &correlation_id,
        )
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(property)))
}

async fn list_properties(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Property>>, ApiError> {
    let correlation_id = new_correlation_id();
    let properties = state
        .service
        .list_properties(params.limit.unwrap_or(50))
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(properties))
}

async fn get_property(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Property>, ApiError> {
    let correlation_id = new_correlation_id();
    let property = state
        .service
        .get_property(&id)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(property))
}

async fn submit_for_approval(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let correlation_id = new_correlation_id();
    let workflow = state
        .service
        .submit_for_approval(&id, &correlation_id)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn record_decision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<Workflow>, ApiError> {
    let correlation_id = new_correlation_id();
    let decision = parse_decision(&body.decision)
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    let role = Role::from_str(&body.actor_role)
        .map_err(|error| {
            ApiError::new(ApplicationError::InvalidArgument(error.to_string()), &correlation_id)
        })?;

    let (workflow, _outcome) = state
        .service
        .decide(
            &id,
            DecisionRequest {
                stage_number: body.stage_number,
                decision,
                actor: Actor { user_id: body.actor_id, role },
                comments: body.comments,
            },
            &correlation_id,
        )
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(workflow))
}

async fn resubmit(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let correlation_id = new_correlation_id();
    let workflow = state
        .service
        .resubmit(&id, &correlation_id)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(workflow))
}

async fn get_workflow(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let correlation_id = new_correlation_id();
    let workflow = state
        .service
        .get_workflow(&id)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    Ok(Json(workflow))
}

fn parse_decision(raw: &str) -> Result<DecisionKind, ApplicationError> {
    match raw {
        "approved" => Ok(DecisionKind::Approved),
        "rejected" => Ok(DecisionKind::Rejected),
        "more_info" => Ok(DecisionKind::MoreInfo),
        other => Err(ApplicationError::InvalidArgument(format!(
            "decision must be one of approved, rejected, more_info (got `{other}`)"
        ))),
    }
}
