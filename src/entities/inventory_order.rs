use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::OrderStatus;

/// The `inventory_orders` table: purchase order headers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_orders")]
pub struct Model {
    /// Primary key: unique identifier for the purchase order.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Sequential document number, `PO-{year}-{seq}`.
    pub order_number: String,

    /// Supplier the order was placed with.
    pub supplier_id: Uuid,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Date the order was placed.
    pub order_date: DateTime<Utc>,

    /// Expected delivery date, if the supplier gave one.
    pub expected_delivery_date: Option<DateTime<Utc>>,

    /// Sum of line totals before tax.
    pub subtotal: Decimal,

    /// Tax rate applied to the subtotal (e.g. 0.08).
    pub tax_rate: Decimal,

    /// Computed tax amount.
    pub tax_amount: Decimal,

    /// Grand total (subtotal + tax).
    pub total_amount: Decimal,

    /// Invoice number, assigned only once the order is fully received.
    pub invoice_number: Option<String>,

    /// Date the invoice number was assigned.
    pub invoice_date: Option<DateTime<Utc>>,

    /// Free-form notes.
    pub notes: Option<String>,

    /// User who created the order.
    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Bumped on every update.
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
    #[sea_orm(has_many = "super::inventory_order_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::supplier_return::Entity")]
    SupplierReturns,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::inventory_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::supplier_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierReturns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
