use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{transfer_variance, transfer_variance::VarianceStatus},
    errors::ServiceError,
    handlers::ActorDto,
    services::investigations::InvestigateCommand,
    services::receiving::ReceiptOutcome,
    services::risk::RiskAssessment,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct VarianceSummary {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub line_item_id: Uuid,
    pub item_kind: String,
    pub item_id: Uuid,
    pub outlet_id: Uuid,
    pub expected_quantity: i32,
    pub received_quantity: i32,
    pub variance: i32,
    pub unit_cost: Decimal,
    pub variance_value: Decimal,
    pub severity: String,
    pub status: String,
    pub reason: Option<String>,
    pub root_cause: Option<String>,
    pub corrective_action: Option<String>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<transfer_variance::Model> for VarianceSummary {
    fn from(model: transfer_variance::Model) -> Self {
        Self {
            id: model.id,
            transfer_id: model.transfer_id,
            line_item_id: model.line_item_id,
            item_kind: model.item_kind,
            item_id: model.item_id,
            outlet_id: model.outlet_id,
            expected_quantity: model.expected_quantity,
            received_quantity: model.received_quantity,
            variance: model.variance,
            unit_cost: model.unit_cost,
            variance_value: model.variance_value,
            severity: model.severity,
            status: model.status,
            reason: model.reason,
            root_cause: model.root_cause,
            corrective_action: model.corrective_action,
            reported_by: model.reported_by,
            created_at: model.created_at,
            resolved_at: model.resolved_at,
        }
    }
}

/// Receipt result: the transfer in its final status plus any variances
/// the count produced.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub transfer: super::transfers::TransferSummary,
    pub variances: Vec<VarianceSummary>,
    pub newly_received: bool,
}

impl From<ReceiptOutcome> for ReceiptResponse {
    fn from(outcome: ReceiptOutcome) -> Self {
        Self {
            transfer: outcome.transfer.into(),
            variances: outcome.variances.into_iter().map(Into::into).collect(),
            newly_received: outcome.newly_received,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VarianceWithRiskResponse {
    pub variance: VarianceSummary,
    /// Recomputed on every read against the current open-variance
    /// population.
    pub risk: RiskAssessment,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VarianceListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub outlet_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InvestigateVarianceRequest {
    #[validate(length(min = 1, message = "root cause cannot be empty"))]
    pub root_cause: String,
    #[validate(length(min = 1, message = "corrective action cannot be empty"))]
    pub corrective_action: String,
    /// `investigating`, `resolved`, or `write_off`
    #[schema(value_type = String)]
    pub new_status: VarianceStatus,
    pub actor: ActorDto,
}

pub async fn list_variances(
    State(state): State<AppState>,
    Query(query): Query<VarianceListQuery>,
) -> ApiResult<PaginatedResponse<VarianceSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse().map_err(|_| {
                ServiceError::ValidationError(format!("unknown variance status '{}'", s))
            })
        })
        .transpose()?;

    let (variances, total) = state
        .services
        .variances
        .list_variances(page, limit, status, query.outlet_id)
        .await?;

    let items = variances.into_iter().map(VarianceSummary::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn get_variance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<VarianceWithRiskResponse> {
    match state.services.variances.get_variance_with_risk(id).await? {
        Some(with_risk) => Ok(Json(ApiResponse::success(VarianceWithRiskResponse {
            variance: with_risk.variance.into(),
            risk: with_risk.risk,
        }))),
        None => Err(ServiceError::NotFound(format!("Variance {} not found", id))),
    }
}

pub async fn investigate_variance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<InvestigateVarianceRequest>,
) -> ApiResult<VarianceSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let command = InvestigateCommand {
        root_cause: payload.root_cause,
        corrective_action: payload.corrective_action,
        new_status: payload.new_status,
    };

    let variance = state
        .services
        .variances
        .investigate(id, command, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(variance.into())))
}
