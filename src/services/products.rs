use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::DbPool;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

fn validate_non_negative_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("negative_price");
        err.message = Some("Prices must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Request payload for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64, message = "SKU must not be empty"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Product name must not be empty"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative_price")]
    pub cost_price: Decimal,
    #[validate(custom = "validate_non_negative_price")]
    pub sale_price: Decimal,
    /// Opening stock level
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
}

/// Request payload for updating a product. The SKU is immutable; fields
/// left out stay unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative_price")]
    pub cost_price: Option<Decimal>,
    #[validate(custom = "validate_non_negative_price")]
    pub sale_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    pub active: Option<bool>,
}

/// Request payload for a manual stock adjustment
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed quantity change; positive adds stock, negative removes it
    pub delta: i32,
    #[validate(length(min = 1, max = 500, message = "Adjustment reason must not be empty"))]
    pub reason: String,
}

/// Filters accepted by the product list operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Substring match against SKU or name
    pub search: Option<String>,
    /// Restrict to active or deactivated products
    pub active: Option<bool>,
}

/// Product representation returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub stock_quantity: i32,
    pub min_stock_level: i32,
    /// True when stock is at or below the minimum level
    pub low_stock: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Service for managing the product catalog and stock levels
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    /// Creates a new product service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new product record
    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = ProductEntity::find()
            .filter(product::Column::Sku.eq(request.sku.as_str()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to check SKU uniqueness");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A product with SKU '{}' already exists",
                request.sku
            )));
        }

        let now = Utc::now();
        let new_product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku),
            name: Set(request.name),
            description: Set(request.description),
            cost_price: Set(request.cost_price),
            sale_price: Set(request.sale_price),
            stock_quantity: Set(request.stock_quantity),
            min_stock_level: Set(request.min_stock_level),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = new_product.insert(db).await.map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %created.id, sku = %created.sku, "Product created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ProductCreated(created.id)).await {
                warn!(error = %e, product_id = %created.id, "Failed to send product created event");
            }
        }

        Ok(model_to_response(created))
    }

    /// Gets a product by ID
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with ID {} not found", product_id))
            })?;

        Ok(model_to_response(found))
    }

    /// Lists products with pagination and optional filters
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
        filter: ProductFilter,
    ) -> Result<(Vec<ProductResponse>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = ProductEntity::find().order_by_asc(product::Column::Sku);
        if let Some(search) = filter.search.as_deref() {
            if !search.is_empty() {
                query = query.filter(
                    Condition::any()
                        .add(product::Column::Sku.contains(search))
                        .add(product::Column::Name.contains(search)),
                );
            }
        }
        if let Some(active) = filter.active {
            query = query.filter(product::Column::Active.eq(active));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((products.into_iter().map(model_to_response).collect(), total))
    }

    /// Lists active products whose stock is at or below their minimum level
    #[instrument(skip(self))]
    pub async fn list_low_stock(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ProductResponse>, u64), ServiceError> {
        let db = &*self.db_pool;

        let query = ProductEntity::find()
            .filter(product::Column::Active.eq(true))
            .filter(
                Expr::col(product::Column::StockQuantity)
                    .lte(Expr::col(product::Column::MinStockLevel)),
            )
            .order_by_asc(product::Column::Sku);

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((products.into_iter().map(model_to_response).collect(), total))
    }

    /// Updates an existing product
    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product for update");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with ID {} not found", product_id))
            })?;

        let mut active_model: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active_model.name = Set(name);
        }
        if let Some(description) = request.description {
            active_model.description = Set(Some(description));
        }
        if let Some(cost_price) = request.cost_price {
            active_model.cost_price = Set(cost_price);
        }
        if let Some(sale_price) = request.sale_price {
            active_model.sale_price = Set(sale_price);
        }
        if let Some(min_stock_level) = request.min_stock_level {
            active_model.min_stock_level = Set(min_stock_level);
        }
        if let Some(active) = request.active {
            active_model.active = Set(active);
        }
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to update product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %updated.id, sku = %updated.sku, "Product updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ProductUpdated(updated.id)).await {
                warn!(error = %e, product_id = %updated.id, "Failed to send product updated event");
            }
        }

        Ok(model_to_response(updated))
    }

    /// Applies a manual stock adjustment. Stock can never go below zero;
    /// an adjustment that would do so is rejected without touching the row.
    #[instrument(skip(self, request), fields(delta = request.delta))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        request: AdjustStockRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.delta == 0 {
            return Err(ServiceError::ValidationError(
                "Stock adjustment delta must not be zero".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = ProductEntity::find_by_id(product_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product for stock adjustment");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with ID {} not found", product_id))
            })?;

        let old_quantity = existing.stock_quantity;
        let new_quantity = old_quantity + request.delta;
        if new_quantity < 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Stock for product '{}' cannot go below zero (current {}, delta {})",
                existing.sku, old_quantity, request.delta
            )));
        }

        let sku = existing.sku.clone();
        let min_stock_level = existing.min_stock_level;
        let mut active_model: product::ActiveModel = existing.into();
        active_model.stock_quantity = Set(new_quantity);
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to apply stock adjustment");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock adjustment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            product_id = %product_id,
            sku = %sku,
            old_quantity,
            new_quantity,
            reason = %request.reason,
            "Stock adjusted"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::StockAdjusted {
                    product_id,
                    old_quantity,
                    new_quantity,
                    min_stock_level,
                    reason: request.reason,
                })
                .await
            {
                warn!(error = %e, product_id = %product_id, "Failed to send stock adjusted event");
            }
        }

        Ok(model_to_response(updated))
    }
}

/// Converts a product model to response format
fn model_to_response(model: product::Model) -> ProductResponse {
    let low_stock = model.stock_quantity <= model.min_stock_level;
    ProductResponse {
        id: model.id,
        sku: model.sku,
        name: model.name,
        description: model.description,
        cost_price: model.cost_price,
        sale_price: model.sale_price,
        stock_quantity: model.stock_quantity,
        min_stock_level: model.min_stock_level,
        low_stock,
        active: model.active,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_model(stock: i32, min_level: i32) -> product::Model {
        let now = Utc::now();
        product::Model {
            id: Uuid::new_v4(),
            sku: "WIDGET-01".to_string(),
            name: "Widget".to_string(),
            description: None,
            cost_price: dec!(4.50),
            sale_price: dec!(9.99),
            stock_quantity: stock,
            min_stock_level: min_level,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn low_stock_flag_is_set_at_or_below_minimum() {
        assert!(model_to_response(sample_model(5, 5)).low_stock);
        assert!(model_to_response(sample_model(0, 5)).low_stock);
        assert!(!model_to_response(sample_model(6, 5)).low_stock);
    }

    #[test]
    fn create_request_rejects_negative_prices() {
        let request = CreateProductRequest {
            sku: "WIDGET-01".to_string(),
            name: "Widget".to_string(),
            description: None,
            cost_price: dec!(-1),
            sale_price: dec!(9.99),
            stock_quantity: 0,
            min_stock_level: 0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_rejects_negative_opening_stock() {
        let request = CreateProductRequest {
            sku: "WIDGET-01".to_string(),
            name: "Widget".to_string(),
            description: None,
            cost_price: dec!(4.50),
            sale_price: dec!(9.99),
            stock_quantity: -3,
            min_stock_level: 0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn adjust_request_requires_a_reason() {
        let request = AdjustStockRequest {
            delta: 5,
            reason: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
