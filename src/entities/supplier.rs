use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Database entity for suppliers. Suppliers referenced by orders are never
/// hard-deleted; the `active` flag soft-deletes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "suppliers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_terms: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_order::Entity")]
    InventoryOrders,
    #[sea_orm(has_many = "super::supplier_return::Entity")]
    SupplierReturns,
}

impl Related<super::inventory_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryOrders.def()
    }
}

impl Related<super::supplier_return::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplierReturns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
