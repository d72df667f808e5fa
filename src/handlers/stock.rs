use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    services::reconciliation::UnbalancedReference, ApiResponse, ApiResult, AppState,
};

/// On-hand quantity, always summed from the movement ledger.
#[derive(Debug, Serialize, ToSchema)]
pub struct OnHandResponse {
    pub outlet_id: Uuid,
    pub item_id: Uuid,
    pub on_hand: i64,
}

pub async fn get_product_on_hand(
    State(state): State<AppState>,
    Path((outlet_id, product_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<OnHandResponse> {
    let on_hand = state
        .services
        .ledger
        .product_on_hand(state.db.as_ref(), product_id, outlet_id)
        .await?;

    Ok(Json(ApiResponse::success(OnHandResponse {
        outlet_id,
        item_id: product_id,
        on_hand,
    })))
}

pub async fn get_packaging_on_hand(
    State(state): State<AppState>,
    Path((outlet_id, material_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<OnHandResponse> {
    let on_hand = state
        .services
        .ledger
        .packaging_on_hand(state.db.as_ref(), material_id, outlet_id)
        .await?;

    Ok(Json(ApiResponse::success(OnHandResponse {
        outlet_id,
        item_id: material_id,
        on_hand,
    })))
}

pub async fn list_unbalanced_references(
    State(state): State<AppState>,
) -> ApiResult<Vec<UnbalancedReference>> {
    let unbalanced = state
        .services
        .reconciliation
        .find_unbalanced_references(state.db.as_ref())
        .await?;

    Ok(Json(ApiResponse::success(unbalanced)))
}
