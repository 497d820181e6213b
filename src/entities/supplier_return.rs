use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::ReturnStatus;

/// The `supplier_returns` table: return-to-supplier headers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "supplier_returns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Sequential document number, `SR-{year}-{seq}`.
    pub return_number: String,

    pub supplier_id: Uuid,

    /// Originating purchase order, when the return stems from one.
    pub order_id: Option<Uuid>,

    pub status: ReturnStatus,

    /// Why the goods are going back.
    pub reason: String,

    /// Number of distinct lines.
    pub item_count: i32,

    /// Sum of line quantities.
    pub total_quantity: i32,

    /// Σ quantity × unit_cost over the lines.
    pub total_value: Decimal,

    /// Credit owed by the supplier, set when the return is closed.
    pub credit_amount: Option<Decimal>,

    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id"
    )]
    Supplier,
    #[sea_orm(
        belongs_to = "super::inventory_order::Entity",
        from = "Column::OrderId",
        to = "super::inventory_order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::supplier_return_item::Entity")]
    Items,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::inventory_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::supplier_return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
