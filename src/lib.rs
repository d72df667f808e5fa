//! TransferDesk API Library
//!
//! Inter-outlet stock transfer and reconciliation engine: transfer
//! lifecycle, append-only stock ledgers, receipt variance detection,
//! fraud risk scoring, and variance investigation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod schema;
pub mod services;

use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::db::DbPool;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// The service set behind the HTTP surface.
#[derive(Clone)]
pub struct AppServices {
    pub transfers: services::transfers::TransferService,
    pub receipts: services::receiving::ReceiptService,
    pub variances: services::investigations::VarianceService,
    pub ledger: services::ledger::StockLedgerService,
    pub reconciliation: services::reconciliation::ReconciliationService,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: events::EventSender,
        config: &config::AppConfig,
    ) -> Self {
        Self {
            transfers: services::transfers::TransferService::new(db.clone(), event_sender.clone()),
            receipts: services::receiving::ReceiptService::new(
                db.clone(),
                event_sender,
                config.variance_thresholds.clone(),
            ),
            variances: services::investigations::VarianceService::new(db.clone()),
            ledger: services::ledger::StockLedgerService::new(),
            reconciliation: services::reconciliation::ReconciliationService::new(),
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Mounts every v1 route.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Transfer lifecycle
        .route(
            "/transfers",
            post(handlers::transfers::create_transfer).get(handlers::transfers::list_transfers),
        )
        .route("/transfers/:id", get(handlers::transfers::get_transfer))
        .route(
            "/transfers/:id/approve",
            post(handlers::transfers::approve_transfer),
        )
        .route(
            "/transfers/:id/reject",
            post(handlers::transfers::reject_transfer),
        )
        .route(
            "/transfers/:id/complete",
            post(handlers::transfers::complete_transfer),
        )
        .route(
            "/transfers/:id/receive",
            post(handlers::transfers::receive_transfer),
        )
        .route(
            "/transfers/:id/cancel",
            post(handlers::transfers::cancel_transfer),
        )
        // Variances & investigation
        .route("/variances", get(handlers::variances::list_variances))
        .route("/variances/:id", get(handlers::variances::get_variance))
        .route(
            "/variances/:id/investigate",
            post(handlers::variances::investigate_variance),
        )
        // Ledger reads
        .route(
            "/outlets/:outlet_id/stock/:product_id",
            get(handlers::stock::get_product_on_hand),
        )
        .route(
            "/outlets/:outlet_id/packaging-stock/:material_id",
            get(handlers::stock::get_packaging_on_hand),
        )
        // Conservation sweep for the nightly reconciliation job
        .route(
            "/reconciliation/unbalanced",
            get(handlers::stock::list_unbalanced_references),
        )
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "transferdesk-api",
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
