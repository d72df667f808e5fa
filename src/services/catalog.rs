//! Catalog lookups for variance valuation.
//!
//! Unit costs are read once at receipt time and snapshotted into the
//! variance record, so historical variance values stay stable when the
//! catalog price later changes.

use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::entities::{packaging_material, product};
use crate::errors::ServiceError;

/// Point-in-time snapshot of a catalog item.
#[derive(Debug, Clone)]
pub struct ItemDetails {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }

    pub async fn get_product<C: ConnectionTrait>(
        &self,
        db: &C,
        product_id: Uuid,
    ) -> Result<ItemDetails, ServiceError> {
        let model = product::Entity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(ItemDetails {
            id: model.id,
            name: model.name,
            sku: model.sku,
            unit_cost: model.unit_cost,
        })
    }

    pub async fn get_packaging_material<C: ConnectionTrait>(
        &self,
        db: &C,
        material_id: Uuid,
    ) -> Result<ItemDetails, ServiceError> {
        let model = packaging_material::Entity::find_by_id(material_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Packaging material {} not found", material_id))
            })?;

        Ok(ItemDetails {
            id: model.id,
            name: model.name,
            sku: model.sku,
            unit_cost: model.unit_cost,
        })
    }
}
