use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{transfer_line_item, transfer_packaging_line_item, transfer_request},
    errors::ServiceError,
    handlers::ActorDto,
    services::receiving::{ReceiptLine, ReceiveTransferCommand},
    services::transfers::{
        ApprovalLine, ApproveTransferCommand, CreateTransferCommand, NewPackagingLine,
        NewTransferLine, TransferDetail,
    },
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PackagingLineRequest {
    pub packaging_material_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransferRequest {
    pub source_outlet_id: Uuid,
    pub destination_outlet_id: Uuid,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<TransferLineRequest>,
    #[serde(default)]
    pub packaging_lines: Vec<PackagingLineRequest>,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApprovalLineRequest {
    pub line_item_id: Uuid,
    pub approved_quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveTransferRequest {
    #[serde(default)]
    pub lines: Vec<ApprovalLineRequest>,
    #[serde(default)]
    pub packaging_lines: Vec<ApprovalLineRequest>,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RejectTransferRequest {
    #[validate(length(min = 1, message = "reason cannot be empty"))]
    pub reason: String,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteTransferRequest {
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiptLineRequest {
    pub line_item_id: Uuid,
    pub quantity_received: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiveTransferRequest {
    #[serde(default)]
    pub lines: Vec<ReceiptLineRequest>,
    #[serde(default)]
    pub packaging_lines: Vec<ReceiptLineRequest>,
    pub actor: ActorDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelTransferRequest {
    pub actor: ActorDto,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferSummary {
    pub id: Uuid,
    pub transfer_number: String,
    pub source_outlet_id: Uuid,
    pub destination_outlet_id: Uuid,
    pub status: String,
    pub notes: Option<String>,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<transfer_request::Model> for TransferSummary {
    fn from(model: transfer_request::Model) -> Self {
        Self {
            id: model.id,
            transfer_number: model.transfer_number,
            source_outlet_id: model.source_outlet_id,
            destination_outlet_id: model.destination_outlet_id,
            status: model.status,
            notes: model.notes,
            requested_by: model.requested_by,
            requested_at: model.requested_at,
            approved_at: model.approved_at,
            dispatched_at: model.dispatched_at,
            received_at: model.received_at,
            completed_at: model.completed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineItemSummary {
    pub id: Uuid,
    pub product_id: Uuid,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub received_quantity: Option<i32>,
}

impl From<transfer_line_item::Model> for LineItemSummary {
    fn from(model: transfer_line_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            requested_quantity: model.requested_quantity,
            approved_quantity: model.approved_quantity,
            received_quantity: model.received_quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackagingLineSummary {
    pub id: Uuid,
    pub packaging_material_id: Uuid,
    pub requested_quantity: i32,
    pub approved_quantity: Option<i32>,
    pub received_quantity: Option<i32>,
}

impl From<transfer_packaging_line_item::Model> for PackagingLineSummary {
    fn from(model: transfer_packaging_line_item::Model) -> Self {
        Self {
            id: model.id,
            packaging_material_id: model.packaging_material_id,
            requested_quantity: model.requested_quantity,
            approved_quantity: model.approved_quantity,
            received_quantity: model.received_quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferDetailResponse {
    pub transfer: TransferSummary,
    pub lines: Vec<LineItemSummary>,
    pub packaging_lines: Vec<PackagingLineSummary>,
}

impl From<TransferDetail> for TransferDetailResponse {
    fn from(detail: TransferDetail) -> Self {
        Self {
            transfer: detail.transfer.into(),
            lines: detail.lines.into_iter().map(Into::into).collect(),
            packaging_lines: detail
                .packaging_lines
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

pub async fn create_transfer(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransferRequest>,
) -> ApiResult<TransferDetailResponse> {
    for line in &payload.lines {
        line.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    }
    for line in &payload.packaging_lines {
        line.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
    }

    let command = CreateTransferCommand {
        source_outlet_id: payload.source_outlet_id,
        destination_outlet_id: payload.destination_outlet_id,
        notes: payload.notes,
        lines: payload
            .lines
            .into_iter()
            .map(|l| NewTransferLine {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect(),
        packaging_lines: payload
            .packaging_lines
            .into_iter()
            .map(|l| NewPackagingLine {
                packaging_material_id: l.packaging_material_id,
                quantity: l.quantity,
            })
            .collect(),
    };

    let detail = state
        .services
        .transfers
        .create_transfer(command, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(detail.into())))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<TransferSummary>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse().map_err(|_| {
                ServiceError::ValidationError(format!("unknown transfer status '{}'", s))
            })
        })
        .transpose()?;

    let (transfers, total) = state
        .services
        .transfers
        .list_transfers(page, limit, status)
        .await?;

    let items = transfers.into_iter().map(TransferSummary::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TransferDetailResponse> {
    match state.services.transfers.get_transfer(id).await? {
        Some(detail) => Ok(Json(ApiResponse::success(detail.into()))),
        None => Err(ServiceError::NotFound(format!("Transfer {} not found", id))),
    }
}

pub async fn approve_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveTransferRequest>,
) -> ApiResult<TransferDetailResponse> {
    let command = ApproveTransferCommand {
        lines: payload
            .lines
            .into_iter()
            .map(|l| ApprovalLine {
                line_item_id: l.line_item_id,
                approved_quantity: l.approved_quantity,
            })
            .collect(),
        packaging_lines: payload
            .packaging_lines
            .into_iter()
            .map(|l| ApprovalLine {
                line_item_id: l.line_item_id,
                approved_quantity: l.approved_quantity,
            })
            .collect(),
    };

    let detail = state
        .services
        .transfers
        .approve_transfer(id, command, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(detail.into())))
}

pub async fn reject_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectTransferRequest>,
) -> ApiResult<TransferSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let transfer = state
        .services
        .transfers
        .reject_transfer(id, payload.reason, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(transfer.into())))
}

pub async fn complete_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteTransferRequest>,
) -> ApiResult<TransferSummary> {
    let outcome = state
        .services
        .transfers
        .complete_transfer(id, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(outcome.transfer.into())))
}

pub async fn receive_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReceiveTransferRequest>,
) -> ApiResult<super::variances::ReceiptResponse> {
    let command = ReceiveTransferCommand {
        lines: payload
            .lines
            .into_iter()
            .map(|l| ReceiptLine {
                line_item_id: l.line_item_id,
                quantity_received: l.quantity_received,
                reason: l.reason,
            })
            .collect(),
        packaging_lines: payload
            .packaging_lines
            .into_iter()
            .map(|l| ReceiptLine {
                line_item_id: l.line_item_id,
                quantity_received: l.quantity_received,
                reason: l.reason,
            })
            .collect(),
    };

    let outcome = state
        .services
        .receipts
        .receive_transfer(id, command, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(outcome.into())))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelTransferRequest>,
) -> ApiResult<TransferSummary> {
    let transfer = state
        .services
        .transfers
        .cancel_transfer(id, payload.actor.into())
        .await?;

    Ok(Json(ApiResponse::success(transfer.into())))
}
