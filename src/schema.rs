//! Builds the database schema directly from the entity definitions.
//!
//! Used by the integration tests (in-memory SQLite) and by `auto_migrate`
//! startup in development deployments.

use sea_orm::{ConnectionTrait, DbErr, Schema};

use crate::db::DbPool;
use crate::entities;

pub async fn create_all_tables(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(entities::Outlet),
        schema.create_table_from_entity(entities::OutletAccess),
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::PackagingMaterial),
        schema.create_table_from_entity(entities::TransferRequest),
        schema.create_table_from_entity(entities::TransferLineItem),
        schema.create_table_from_entity(entities::TransferPackagingLineItem),
        schema.create_table_from_entity(entities::StockMovement),
        schema.create_table_from_entity(entities::PackagingMovement),
        schema.create_table_from_entity(entities::TransferVariance),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(backend.build(&*statement)).await?;
    }

    Ok(())
}
