//! Append-only movement ledgers for products and packaging materials.
//!
//! Every transfer is realized as a balanced debit/credit pair: one
//! negative entry at the source outlet and one positive entry of equal
//! magnitude at the destination, tagged with the transfer and line ids.
//! Pair writes take the caller's open transaction so both sides commit
//! together or not at all.

use sea_orm::{
    sea_query::{Expr, Func}, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    FromQueryResult, QueryFilter, QuerySelect, Set,
};
use tracing::info;
use uuid::Uuid;

use crate::entities::{packaging_movement, stock_movement, stock_movement::MovementType};
use crate::errors::ServiceError;

/// One balanced source→destination movement to record.
#[derive(Debug, Clone)]
pub struct TransferMovement {
    pub item_id: Uuid,
    pub source_outlet_id: Uuid,
    pub destination_outlet_id: Uuid,
    /// Magnitude moved; must be positive.
    pub quantity: i32,
    pub transfer_id: Uuid,
    pub line_item_id: Uuid,
    pub actor_id: Uuid,
    pub note: Option<String>,
}

#[derive(FromQueryResult)]
struct QuantitySum {
    total: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StockLedgerService;

impl StockLedgerService {
    pub fn new() -> Self {
        Self
    }

    /// Writes the balanced product pair inside the caller's transaction.
    pub async fn record_product_transfer_pair<C: ConnectionTrait>(
        &self,
        txn: &C,
        movement: &TransferMovement,
    ) -> Result<(), ServiceError> {
        validate_movement(movement)?;

        stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(movement.item_id),
            outlet_id: Set(movement.source_outlet_id),
            quantity: Set(-movement.quantity),
            movement_type: Set(MovementType::TransferOut.to_string()),
            reference_id: Set(Some(movement.transfer_id)),
            reference_line_id: Set(Some(movement.line_item_id)),
            note: Set(movement.note.clone()),
            created_by: Set(movement.actor_id),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(movement.item_id),
            outlet_id: Set(movement.destination_outlet_id),
            quantity: Set(movement.quantity),
            movement_type: Set(MovementType::TransferIn.to_string()),
            reference_id: Set(Some(movement.transfer_id)),
            reference_line_id: Set(Some(movement.line_item_id)),
            note: Set(movement.note.clone()),
            created_by: Set(movement.actor_id),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %movement.item_id,
            quantity = movement.quantity,
            transfer_id = %movement.transfer_id,
            "recorded product movement pair"
        );

        Ok(())
    }

    /// Writes the balanced packaging pair inside the caller's transaction.
    pub async fn record_packaging_transfer_pair<C: ConnectionTrait>(
        &self,
        txn: &C,
        movement: &TransferMovement,
    ) -> Result<(), ServiceError> {
        validate_movement(movement)?;

        packaging_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            packaging_material_id: Set(movement.item_id),
            outlet_id: Set(movement.source_outlet_id),
            quantity: Set(-movement.quantity),
            movement_type: Set(MovementType::TransferOut.to_string()),
            reference_id: Set(Some(movement.transfer_id)),
            reference_line_id: Set(Some(movement.line_item_id)),
            note: Set(movement.note.clone()),
            created_by: Set(movement.actor_id),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        packaging_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            packaging_material_id: Set(movement.item_id),
            outlet_id: Set(movement.destination_outlet_id),
            quantity: Set(movement.quantity),
            movement_type: Set(MovementType::TransferIn.to_string()),
            reference_id: Set(Some(movement.transfer_id)),
            reference_line_id: Set(Some(movement.line_item_id)),
            note: Set(movement.note.clone()),
            created_by: Set(movement.actor_id),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(
            packaging_material_id = %movement.item_id,
            quantity = movement.quantity,
            transfer_id = %movement.transfer_id,
            "recorded packaging movement pair"
        );

        Ok(())
    }

    /// On-hand quantity of a product at an outlet, summed from the ledger.
    /// Never trusts a cached counter: additive facts cannot drift.
    pub async fn product_on_hand<C: ConnectionTrait>(
        &self,
        db: &C,
        product_id: Uuid,
        outlet_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let row = stock_movement::Entity::find()
            .select_only()
            .column_as(Expr::expr(Func::sum(Expr::col(stock_movement::Column::Quantity))), "total")
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .filter(stock_movement::Column::OutletId.eq(outlet_id))
            .into_model::<QuantitySum>()
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    /// On-hand quantity of a packaging material at an outlet.
    pub async fn packaging_on_hand<C: ConnectionTrait>(
        &self,
        db: &C,
        packaging_material_id: Uuid,
        outlet_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let row = packaging_movement::Entity::find()
            .select_only()
            .column_as(Expr::expr(Func::sum(Expr::col(packaging_movement::Column::Quantity))), "total")
            .filter(packaging_movement::Column::PackagingMaterialId.eq(packaging_material_id))
            .filter(packaging_movement::Column::OutletId.eq(outlet_id))
            .into_model::<QuantitySum>()
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    /// Net quantity of all product movements tagged with a transfer line.
    /// Zero for every completed or received line; anything else is a
    /// conservation violation.
    pub async fn product_line_balance<C: ConnectionTrait>(
        &self,
        db: &C,
        line_item_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let row = stock_movement::Entity::find()
            .select_only()
            .column_as(Expr::expr(Func::sum(Expr::col(stock_movement::Column::Quantity))), "total")
            .filter(stock_movement::Column::ReferenceLineId.eq(line_item_id))
            .into_model::<QuantitySum>()
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    /// Net quantity of all packaging movements tagged with a transfer line.
    pub async fn packaging_line_balance<C: ConnectionTrait>(
        &self,
        db: &C,
        line_item_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let row = packaging_movement::Entity::find()
            .select_only()
            .column_as(Expr::expr(Func::sum(Expr::col(packaging_movement::Column::Quantity))), "total")
            .filter(packaging_movement::Column::ReferenceLineId.eq(line_item_id))
            .into_model::<QuantitySum>()
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    /// All product movements for a transfer, oldest first.
    pub async fn product_movements_for_transfer<C: ConnectionTrait>(
        &self,
        db: &C,
        transfer_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        use sea_orm::QueryOrder;

        stock_movement::Entity::find()
            .filter(stock_movement::Column::ReferenceId.eq(transfer_id))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

fn validate_movement(movement: &TransferMovement) -> Result<(), ServiceError> {
    if movement.quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "movement quantity must be positive, got {}",
            movement.quantity
        )));
    }
    if movement.source_outlet_id == movement.destination_outlet_id {
        return Err(ServiceError::ValidationError(
            "movement source and destination outlet must differ".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(quantity: i32) -> TransferMovement {
        TransferMovement {
            item_id: Uuid::new_v4(),
            source_outlet_id: Uuid::new_v4(),
            destination_outlet_id: Uuid::new_v4(),
            quantity,
            transfer_id: Uuid::new_v4(),
            line_item_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            note: None,
        }
    }

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        assert!(validate_movement(&movement(0)).is_err());
        assert!(validate_movement(&movement(-3)).is_err());
        assert!(validate_movement(&movement(1)).is_ok());
    }

    #[test]
    fn same_outlet_pair_is_rejected() {
        let mut m = movement(5);
        m.destination_outlet_id = m.source_outlet_id;
        assert!(validate_movement(&m).is_err());
    }
}
