use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::config::CompanyConfig;
use crate::db::DbPool;
use crate::documents::{InvoiceData, InvoiceLine, InvoiceParty};
use crate::entities::inventory_order::Entity as InventoryOrderEntity;
use crate::entities::inventory_order_item::{self, Entity as InventoryOrderItemEntity};
use crate::entities::product::Entity as ProductEntity;
use crate::entities::supplier::{self, Entity as SupplierEntity};
use crate::errors::ServiceError;
use crate::models::OrderStatus;

/// Service assembling invoice documents for fully received purchase orders
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    company: CompanyConfig,
    currency: String,
}

impl InvoiceService {
    /// Creates a new invoice service instance
    pub fn new(db_pool: Arc<DbPool>, company: CompanyConfig, currency: String) -> Self {
        Self {
            db_pool,
            company,
            currency,
        }
    }

    /// Assembles the invoice data for an order. Only fully received orders
    /// carry an invoice.
    #[instrument(skip(self))]
    pub async fn invoice_data(&self, order_id: Uuid) -> Result<InvoiceData, ServiceError> {
        let db = &*self.db_pool;

        let (order, supplier) = InventoryOrderEntity::find_by_id(order_id)
            .find_also_related(SupplierEntity)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order for invoice");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        if order.status != OrderStatus::Received {
            return Err(ServiceError::InvalidOperation(format!(
                "Invoice is only available for fully received orders (order {} is '{}')",
                order.order_number, order.status
            )));
        }
        let invoice_number = order.invoice_number.clone().ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "Order {} has no invoice number assigned",
                order.order_number
            ))
        })?;
        let invoice_date = order.invoice_date.unwrap_or(order.updated_at);

        let items = InventoryOrderItemEntity::find()
            .filter(inventory_order_item::Column::OrderId.eq(order_id))
            .find_also_related(ProductEntity)
            .order_by_asc(inventory_order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order lines for invoice");
                ServiceError::DatabaseError(e)
            })?;

        let lines = items
            .into_iter()
            .map(|(item, product)| InvoiceLine {
                sku: product
                    .as_ref()
                    .map(|p| p.sku.clone())
                    .unwrap_or_else(|| "-".to_string()),
                description: product
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Unlisted product".to_string()),
                quantity: item.quantity,
                unit_cost: item.unit_cost,
                line_total: item.line_total,
            })
            .collect();

        let supplier = supplier.map(supplier_party).unwrap_or_else(|| InvoiceParty {
            name: "Unknown supplier".to_string(),
            ..Default::default()
        });

        Ok(InvoiceData {
            invoice_number,
            invoice_date,
            order_number: order.order_number,
            order_date: order.order_date,
            company: company_party(&self.company),
            supplier,
            currency: self.currency.clone(),
            lines,
            subtotal: order.subtotal,
            tax_rate: order.tax_rate,
            tax_amount: order.tax_amount,
            total_amount: order.total_amount,
            notes: order.notes,
        })
    }
}

fn company_party(config: &CompanyConfig) -> InvoiceParty {
    InvoiceParty {
        name: config.name.clone(),
        address: non_empty(&config.address),
        phone: non_empty(&config.phone),
        email: non_empty(&config.email),
    }
}

fn supplier_party(model: supplier::Model) -> InvoiceParty {
    InvoiceParty {
        name: model.name,
        address: model.address,
        phone: model.phone,
        email: model.email,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn company_party_skips_blank_contact_fields() {
        let config = CompanyConfig {
            name: "Stockroom".to_string(),
            address: "  ".to_string(),
            phone: "555-0100".to_string(),
            email: String::new(),
        };
        let party = company_party(&config);
        assert_eq!(party.name, "Stockroom");
        assert_eq!(party.address, None);
        assert_eq!(party.phone.as_deref(), Some("555-0100"));
        assert_eq!(party.email, None);
    }

    #[test]
    fn supplier_party_carries_contact_details() {
        let now = Utc::now();
        let model = supplier::Model {
            id: Uuid::new_v4(),
            name: "Acme Tools".to_string(),
            contact_name: Some("J. Smith".to_string()),
            email: Some("sales@acme.test".to_string()),
            phone: None,
            address: Some("9 Forge St".to_string()),
            payment_terms: Some("Net 30".to_string()),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let party = supplier_party(model);
        assert_eq!(party.name, "Acme Tools");
        assert_eq!(party.address.as_deref(), Some("9 Forge St"));
        assert_eq!(party.email.as_deref(), Some("sales@acme.test"));
    }

    #[test]
    fn line_totals_ride_on_stored_values() {
        let line = InvoiceLine {
            sku: "WID-1".to_string(),
            description: "Widget".to_string(),
            quantity: 3,
            unit_cost: dec!(4.99),
            line_total: dec!(14.97),
        };
        assert_eq!(line.line_total, dec!(4.99) * rust_decimal::Decimal::from(3));
    }
}
