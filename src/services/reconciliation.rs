//! Ledger conservation sweep.
//!
//! The nightly reconciliation job calls this to find transfer lines whose
//! movements do not sum to zero. A non-empty result means a movement pair
//! was half-written; that is escalated, never silently repaired, because a
//! blind retry could double-write the surviving side.

use sea_orm::{
    sea_query::{Expr, Func}, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult,
    QueryFilter, QuerySelect,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{packaging_movement, stock_movement};
use crate::errors::ServiceError;

/// A transfer line whose ledger entries do not balance.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnbalancedReference {
    pub reference_id: Option<Uuid>,
    pub reference_line_id: Uuid,
    /// `stock` or `packaging`
    pub ledger: String,
    pub net_quantity: i64,
}

#[derive(FromQueryResult)]
struct BalanceRow {
    reference_id: Option<Uuid>,
    reference_line_id: Option<Uuid>,
    total: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationService;

impl ReconciliationService {
    pub fn new() -> Self {
        Self
    }

    /// Scans both ledgers for lines whose movements do not sum to zero.
    pub async fn find_unbalanced_references<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<Vec<UnbalancedReference>, ServiceError> {
        let mut unbalanced = Vec::new();

        let stock_rows = stock_movement::Entity::find()
            .select_only()
            .column(stock_movement::Column::ReferenceId)
            .column(stock_movement::Column::ReferenceLineId)
            .column_as(Expr::expr(Func::sum(Expr::col(stock_movement::Column::Quantity))), "total")
            .filter(stock_movement::Column::ReferenceLineId.is_not_null())
            .group_by(stock_movement::Column::ReferenceId)
            .group_by(stock_movement::Column::ReferenceLineId)
            .into_model::<BalanceRow>()
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        collect_unbalanced(&mut unbalanced, stock_rows, "stock");

        let packaging_rows = packaging_movement::Entity::find()
            .select_only()
            .column(packaging_movement::Column::ReferenceId)
            .column(packaging_movement::Column::ReferenceLineId)
            .column_as(Expr::expr(Func::sum(Expr::col(packaging_movement::Column::Quantity))), "total")
            .filter(packaging_movement::Column::ReferenceLineId.is_not_null())
            .group_by(packaging_movement::Column::ReferenceId)
            .group_by(packaging_movement::Column::ReferenceLineId)
            .into_model::<BalanceRow>()
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        collect_unbalanced(&mut unbalanced, packaging_rows, "packaging");

        for entry in &unbalanced {
            error!(
                reference_id = ?entry.reference_id,
                reference_line_id = %entry.reference_line_id,
                ledger = %entry.ledger,
                net_quantity = entry.net_quantity,
                "unbalanced ledger reference detected"
            );
        }

        Ok(unbalanced)
    }

    /// Verifies conservation for one transfer; `Consistency` error when any
    /// of its lines is unbalanced.
    pub async fn verify_transfer_balanced<C: ConnectionTrait>(
        &self,
        db: &C,
        transfer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let offenders: Vec<UnbalancedReference> = self
            .find_unbalanced_references(db)
            .await?
            .into_iter()
            .filter(|entry| entry.reference_id == Some(transfer_id))
            .collect();

        if offenders.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Consistency(format!(
                "transfer {} has {} unbalanced ledger line(s)",
                transfer_id,
                offenders.len()
            )))
        }
    }
}

fn collect_unbalanced(
    out: &mut Vec<UnbalancedReference>,
    rows: Vec<BalanceRow>,
    ledger: &str,
) {
    for row in rows {
        let net = row.total.unwrap_or(0);
        if net != 0 {
            if let Some(line_id) = row.reference_line_id {
                out.push(UnbalancedReference {
                    reference_id: row.reference_id,
                    reference_line_id: line_id,
                    ledger: ledger.to_string(),
                    net_quantity: net,
                });
            }
        }
    }
}
