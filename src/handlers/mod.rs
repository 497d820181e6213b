pub mod common;
pub mod invoices;
pub mod products;
pub mod purchase_orders;
pub mod returns;
pub mod suppliers;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::CompanyConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub purchase_orders: Arc<crate::services::purchase_orders::PurchaseOrderService>,
    pub returns: Arc<crate::services::returns::ReturnService>,
    pub suppliers: Arc<crate::services::suppliers::SupplierService>,
    pub products: Arc<crate::services::products::ProductService>,
    pub invoices: Arc<crate::services::invoices::InvoiceService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_tax_rate: Decimal,
        company: CompanyConfig,
        currency: String,
    ) -> Self {
        let purchase_orders = Arc::new(crate::services::purchase_orders::PurchaseOrderService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
            default_tax_rate,
        ));
        let returns = Arc::new(crate::services::returns::ReturnService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let suppliers = Arc::new(crate::services::suppliers::SupplierService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
        ));
        let products = Arc::new(crate::services::products::ProductService::new(
            db_pool.clone(),
            Some(event_sender),
        ));
        let invoices = Arc::new(crate::services::invoices::InvoiceService::new(
            db_pool,
            company,
            currency,
        ));

        Self {
            purchase_orders,
            returns,
            suppliers,
            products,
            invoices,
        }
    }
}
