//! SeaORM entities for the transfer and reconciliation engine.
//!
//! Status and type columns persist as strings; each entity module owns the
//! typed enum and its round-trip conversions.

pub mod outlet;
pub mod outlet_access;
pub mod packaging_material;
pub mod packaging_movement;
pub mod product;
pub mod stock_movement;
pub mod transfer_line_item;
pub mod transfer_packaging_line_item;
pub mod transfer_request;
pub mod transfer_variance;

pub use outlet::Entity as Outlet;
pub use outlet_access::Entity as OutletAccess;
pub use packaging_material::Entity as PackagingMaterial;
pub use packaging_movement::Entity as PackagingMovement;
pub use product::Entity as Product;
pub use stock_movement::Entity as StockMovement;
pub use transfer_line_item::Entity as TransferLineItem;
pub use transfer_packaging_line_item::Entity as TransferPackagingLineItem;
pub use transfer_request::Entity as TransferRequest;
pub use transfer_variance::Entity as TransferVariance;
