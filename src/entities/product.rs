use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Database entity for products. `stock_quantity` is only moved by the
/// purchase-order receive flow, the return ship/receive flows, and explicit
/// stock adjustments, always inside a transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub stock_quantity: i32,
    pub min_stock_level: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_order_item::Entity")]
    InventoryOrderItems,
    #[sea_orm(has_many = "super::supplier_return_item::Entity")]
    SupplierReturnItems,
}

impl Related<super::inventory_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryOrderItems.def()
    }
}

impl Related<super::supplier_return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierReturnItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
