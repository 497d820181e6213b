use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::DbPool;
use crate::entities::inventory_order::{self, Entity as InventoryOrderEntity};
use crate::entities::inventory_order_item::{self, Entity as InventoryOrderItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::supplier::{self, Entity as SupplierEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::OrderStatus;
use crate::services::sequences::{
    next_document_number, DOC_TYPE_INVOICE, DOC_TYPE_PURCHASE_ORDER,
};

fn validate_non_negative_cost(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("negative_cost");
        err.message = Some("Unit cost must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// One requested order line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PurchaseOrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(custom = "validate_non_negative_cost")]
    pub unit_cost: Decimal,
}

/// Request payload for creating a purchase order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    pub items: Vec<PurchaseOrderItemRequest>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    /// Tax fraction, e.g. 0.08 for 8%. Falls back to the configured default.
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
}

/// Request payload for editing a pending purchase order. A provided `items`
/// list replaces every existing line and the totals are recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePurchaseOrderRequest {
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub items: Option<Vec<PurchaseOrderItemRequest>>,
}

/// Request payload for a status change
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Target status name, e.g. "sent" or "cancelled"
    #[validate(length(min = 1, message = "Status must not be empty"))]
    pub status: String,
}

/// One delivery line: how many units of an order line arrived just now
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveItemLine {
    /// Order line ID (not the product ID)
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Received quantity must be at least 1"))]
    pub quantity: i32,
}

/// Request payload for recording a delivery against an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveItemsRequest {
    pub items: Vec<ReceiveItemLine>,
}

/// Request payload for moving several orders to the same status at once
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BulkStatusUpdateRequest {
    pub order_ids: Vec<Uuid>,
    #[validate(length(min = 1, message = "Status must not be empty"))]
    pub status: String,
}

/// Outcome of a bulk status update
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkStatusUpdateResponse {
    /// Number of orders whose status actually changed
    pub updated: u64,
    pub status: String,
}

/// Filters accepted by the purchase order list operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    /// Substring match against the order number
    pub search: Option<String>,
}

/// Purchase order header returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub supplier_id: Uuid,
    pub status: String,
    pub order_date: DateTime<Utc>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// One order line returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub received_quantity: i32,
    pub outstanding_quantity: i32,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
}

/// Purchase order with supplier context and lines
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderDetailResponse {
    #[serde(flatten)]
    pub order: PurchaseOrderResponse,
    pub supplier_name: Option<String>,
    pub items: Vec<PurchaseOrderItemResponse>,
}

/// Service for managing purchase orders and receiving stock against them
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    default_tax_rate: Decimal,
}

impl PurchaseOrderService {
    /// Creates a new purchase order service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        default_tax_rate: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_tax_rate,
        }
    }

    /// Creates a new purchase order in `pending` status and allocates its
    /// order number.
    #[instrument(
        skip(self, request),
        fields(supplier_id = %request.supplier_id, item_count = request.items.len())
    )]
    pub async fn create_purchase_order(
        &self,
        request: CreatePurchaseOrderRequest,
        created_by: Uuid,
    ) -> Result<PurchaseOrderDetailResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_order_items(&request.items)?;
        let tax_rate = self.resolve_tax_rate(request.tax_rate)?;

        let db = &*self.db_pool;
        let supplier = load_active_supplier(db, request.supplier_id).await?;
        let products = load_products_for_items(db, &request.items).await?;

        let lines: Vec<(i32, Decimal)> = request
            .items
            .iter()
            .map(|item| (item.quantity, item.unit_cost))
            .collect();
        let (subtotal, tax_amount, total_amount) = compute_totals(&lines, tax_rate);

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order_number = next_document_number(&txn, DOC_TYPE_PURCHASE_ORDER).await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let header = inventory_order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            supplier_id: Set(supplier.id),
            status: Set(OrderStatus::Pending),
            order_date: Set(now),
            expected_delivery_date: Set(request.expected_delivery_date),
            subtotal: Set(subtotal),
            tax_rate: Set(tax_rate),
            tax_amount: Set(tax_amount),
            total_amount: Set(total_amount),
            invoice_number: Set(None),
            invoice_date: Set(None),
            notes: Set(request.notes),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let saved_header = header.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to insert purchase order header");
            ServiceError::DatabaseError(e)
        })?;

        let mut saved_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let line = inventory_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                received_quantity: Set(0),
                unit_cost: Set(item.unit_cost),
                line_total: Set(item.unit_cost * Decimal::from(item.quantity)),
                created_at: Set(now),
                updated_at: Set(now),
            };
            let saved = line.insert(&txn).await.map_err(|e| {
                error!(error = %e, product_id = %item.product_id, "Failed to insert order line");
                ServiceError::DatabaseError(e)
            })?;
            saved_items.push(saved);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit purchase order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            total = %total_amount,
            "Purchase order created"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::PurchaseOrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order created event");
            }
        }

        Ok(detail_response(
            saved_header,
            Some(supplier.name),
            saved_items
                .into_iter()
                .map(|line| {
                    let product = products.get(&line.product_id);
                    item_response(line, product)
                })
                .collect(),
        ))
    }

    /// Gets a purchase order with its supplier and lines
    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        order_id: Uuid,
    ) -> Result<PurchaseOrderDetailResponse, ServiceError> {
        let db = &*self.db_pool;

        let (order, supplier) = InventoryOrderEntity::find_by_id(order_id)
            .find_also_related(SupplierEntity)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch purchase order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        let items = InventoryOrderItemEntity::find()
            .filter(inventory_order_item::Column::OrderId.eq(order_id))
            .find_also_related(ProductEntity)
            .order_by_asc(inventory_order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order lines");
                ServiceError::DatabaseError(e)
            })?;

        Ok(detail_response(
            order,
            supplier.map(|s| s.name),
            items
                .into_iter()
                .map(|(line, product)| item_response(line, product.as_ref()))
                .collect(),
        ))
    }

    /// Lists purchase orders with pagination and optional filters
    #[instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        page: u64,
        limit: u64,
        filter: PurchaseOrderFilter,
    ) -> Result<(Vec<PurchaseOrderResponse>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query =
            InventoryOrderEntity::find().order_by_desc(inventory_order::Column::CreatedAt);
        if let Some(status) = filter.status.as_deref() {
            let status = parse_order_status(status)?;
            query = query.filter(inventory_order::Column::Status.eq(status));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(inventory_order::Column::SupplierId.eq(supplier_id));
        }
        if let Some(search) = filter.search.as_deref() {
            if !search.is_empty() {
                query = query.filter(inventory_order::Column::OrderNumber.contains(search));
            }
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((orders.into_iter().map(model_to_response).collect(), total))
    }

    /// Edits a pending purchase order. Passing `items` replaces all lines
    /// and recomputes the totals.
    #[instrument(skip(self, request))]
    pub async fn update_purchase_order(
        &self,
        order_id: Uuid,
        request: UpdatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetailResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if let Some(items) = &request.items {
            validate_order_items(items)?;
        }
        if let Some(rate) = request.tax_rate {
            check_tax_rate(rate)?;
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = InventoryOrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch purchase order for update");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Only pending orders can be edited (order {} is '{}')",
                existing.order_number, existing.status
            )));
        }

        let version = existing.version;
        let tax_rate = request.tax_rate.unwrap_or(existing.tax_rate);
        let now = Utc::now();

        let recomputed = if let Some(items) = &request.items {
            load_products_for_items(&txn, items).await?;

            InventoryOrderItemEntity::delete_many()
                .filter(inventory_order_item::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, order_id = %order_id, "Failed to clear order lines");
                    ServiceError::DatabaseError(e)
                })?;

            for item in items {
                inventory_order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    received_quantity: Set(0),
                    unit_cost: Set(item.unit_cost),
                    line_total: Set(item.unit_cost * Decimal::from(item.quantity)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, product_id = %item.product_id, "Failed to insert order line");
                    ServiceError::DatabaseError(e)
                })?;
            }

            let lines: Vec<(i32, Decimal)> = items
                .iter()
                .map(|item| (item.quantity, item.unit_cost))
                .collect();
            Some(compute_totals(&lines, tax_rate))
        } else if request.tax_rate.is_some() {
            let lines = InventoryOrderItemEntity::find()
                .filter(inventory_order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            let lines: Vec<(i32, Decimal)> = lines
                .iter()
                .map(|line| (line.quantity, line.unit_cost))
                .collect();
            Some(compute_totals(&lines, tax_rate))
        } else {
            None
        };

        let mut active_model: inventory_order::ActiveModel = existing.into();
        if let Some(expected) = request.expected_delivery_date {
            active_model.expected_delivery_date = Set(Some(expected));
        }
        if let Some(notes) = request.notes {
            active_model.notes = Set(Some(notes));
        }
        if let Some((subtotal, tax_amount, total_amount)) = recomputed {
            active_model.subtotal = Set(subtotal);
            active_model.tax_rate = Set(tax_rate);
            active_model.tax_amount = Set(tax_amount);
            active_model.total_amount = Set(total_amount);
        }
        active_model.updated_at = Set(now);
        active_model.version = Set(version + 1);

        active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update purchase order");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit purchase order update");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Purchase order updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::PurchaseOrderUpdated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order updated event");
            }
        }

        self.get_purchase_order(order_id).await
    }

    /// Moves an order to a new status. `received` is refused here; it is
    /// only reachable through [`Self::receive_items`].
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let next = parse_order_status(new_status)?;
        if next == OrderStatus::Received {
            return Err(ServiceError::InvalidOperation(
                "Orders are marked received by recording a delivery, not by a status update"
                    .to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = InventoryOrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch purchase order for status update");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        if existing.status == next {
            // No-op transition; nothing to write.
            return Ok(model_to_response(existing));
        }
        if !existing.status.can_transition_to(&next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move order {} from '{}' to '{}'",
                existing.order_number, existing.status, next
            )));
        }

        let old_status = existing.status;
        let version = existing.version;
        let mut active_model: inventory_order::ActiveModel = existing.into();
        active_model.status = Set(next);
        active_model.updated_at = Set(Utc::now());
        active_model.version = Set(version + 1);

        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order status update");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %next,
            "Purchase order status updated"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PurchaseOrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: next.to_string(),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send status changed event");
            }
        }

        Ok(model_to_response(updated))
    }

    /// Records a delivery against an order. Each line's received quantity
    /// accumulates and stock is incremented by the delivered amount. When
    /// every line is fully received the order moves to `received` and an
    /// invoice number is allocated; otherwise it goes to
    /// `waiting_for_delivery`.
    #[instrument(skip(self, request), fields(line_count = request.items.len()))]
    pub async fn receive_items(
        &self,
        order_id: Uuid,
        request: ReceiveItemsRequest,
    ) -> Result<PurchaseOrderDetailResponse, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A delivery must contain at least one line".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for (index, line) in request.items.iter().enumerate() {
            line.validate().map_err(|e| {
                ServiceError::ValidationError(format!("items[{}]: {}", index, e))
            })?;
            if !seen.insert(line.item_id) {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}] repeats order line {}",
                    index, line.item_id
                )));
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = InventoryOrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch purchase order for receiving");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        if !matches!(
            order.status,
            OrderStatus::Sent | OrderStatus::WaitingForDelivery
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} cannot take deliveries in status '{}'",
                order.order_number, order.status
            )));
        }

        let order_lines = InventoryOrderItemEntity::find()
            .filter(inventory_order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order lines for receiving");
                ServiceError::DatabaseError(e)
            })?;
        let mut lines_by_id: HashMap<Uuid, inventory_order_item::Model> = order_lines
            .into_iter()
            .map(|line| (line.id, line))
            .collect();

        // Validate every delivery line against the outstanding quantities
        // before writing anything.
        for (index, delivery) in request.items.iter().enumerate() {
            let line = lines_by_id.get(&delivery.item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "items[{}] references an unknown order line ({})",
                    index, delivery.item_id
                ))
            })?;
            let outstanding = line.quantity - line.received_quantity;
            if delivery.quantity > outstanding {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}]: received quantity {} exceeds the outstanding {} for product {}",
                    index, delivery.quantity, outstanding, line.product_id
                )));
            }
        }

        let now = Utc::now();
        for delivery in &request.items {
            let line = lines_by_id
                .remove(&delivery.item_id)
                .ok_or_else(|| ServiceError::InternalError("order line vanished".to_string()))?;
            let product_id = line.product_id;
            let new_received = line.received_quantity + delivery.quantity;

            let mut line_model: inventory_order_item::ActiveModel = line.into();
            line_model.received_quantity = Set(new_received);
            line_model.updated_at = Set(now);
            let updated_line = line_model.update(&txn).await.map_err(|e| {
                error!(error = %e, item_id = %delivery.item_id, "Failed to update received quantity");
                ServiceError::DatabaseError(e)
            })?;
            lines_by_id.insert(updated_line.id, updated_line);

            let product = ProductEntity::find_by_id(product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product with ID {} not found", product_id))
                })?;
            let new_stock = product.stock_quantity + delivery.quantity;
            let mut product_model: product::ActiveModel = product.into();
            product_model.stock_quantity = Set(new_stock);
            product_model.updated_at = Set(now);
            product_model.update(&txn).await.map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to increment stock");
                ServiceError::DatabaseError(e)
            })?;
        }

        let fully_received = lines_by_id
            .values()
            .all(|line| line.received_quantity >= line.quantity);

        let order_number = order.order_number.clone();
        let version = order.version;
        let mut invoice_number = None;
        let mut order_model: inventory_order::ActiveModel = order.into();
        if fully_received {
            let number = next_document_number(&txn, DOC_TYPE_INVOICE).await?;
            order_model.status = Set(OrderStatus::Received);
            order_model.invoice_number = Set(Some(number.clone()));
            order_model.invoice_date = Set(Some(now));
            invoice_number = Some(number);
        } else {
            order_model.status = Set(OrderStatus::WaitingForDelivery);
        }
        order_model.updated_at = Set(now);
        order_model.version = Set(version + 1);
        order_model.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order after delivery");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit delivery");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            fully_received,
            "Delivery recorded"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PurchaseOrderReceived {
                    order_id,
                    fully_received,
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order received event");
            }
            if let Some(invoice_number) = invoice_number {
                if let Err(e) = event_sender
                    .send(Event::InvoiceGenerated {
                        order_id,
                        invoice_number,
                    })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to send invoice generated event");
                }
            }
        }

        self.get_purchase_order(order_id).await
    }

    /// Moves a batch of orders to the same status inside one transaction.
    /// If any order is missing or its transition is illegal, nothing is
    /// changed.
    #[instrument(skip(self, request), fields(order_count = request.order_ids.len()))]
    pub async fn bulk_update_status(
        &self,
        request: BulkStatusUpdateRequest,
    ) -> Result<BulkStatusUpdateResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.order_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "order_ids must not be empty".to_string(),
            ));
        }
        let next = parse_order_status(&request.status)?;
        if next == OrderStatus::Received {
            return Err(ServiceError::InvalidOperation(
                "Orders are marked received by recording a delivery, not by a status update"
                    .to_string(),
            ));
        }

        let mut unique_ids = Vec::with_capacity(request.order_ids.len());
        let mut seen = HashSet::new();
        for id in &request.order_ids {
            if seen.insert(*id) {
                unique_ids.push(*id);
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let mut transitions = Vec::new();
        for id in &unique_ids {
            let order = InventoryOrderEntity::find_by_id(*id)
                .one(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, order_id = %id, "Failed to fetch purchase order in bulk update");
                    ServiceError::DatabaseError(e)
                })?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Purchase order with ID {} not found", id))
                })?;

            if order.status == next {
                continue;
            }
            if !order.status.can_transition_to(&next) {
                return Err(ServiceError::InvalidStatus(format!(
                    "Cannot move order {} ({}) from '{}' to '{}'",
                    order.order_number, order.id, order.status, next
                )));
            }

            let old_status = order.status;
            let version = order.version;
            let order_id = order.id;
            let mut active_model: inventory_order::ActiveModel = order.into();
            active_model.status = Set(next);
            active_model.updated_at = Set(Utc::now());
            active_model.version = Set(version + 1);
            active_model.update(&txn).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to update order in bulk update");
                ServiceError::DatabaseError(e)
            })?;

            transitions.push((order_id, old_status));
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit bulk status update");
            ServiceError::DatabaseError(e)
        })?;

        let updated = transitions.len() as u64;
        info!(
            requested = unique_ids.len(),
            updated,
            status = %next,
            "Bulk status update applied"
        );

        if let Some(event_sender) = &self.event_sender {
            for (order_id, old_status) in transitions {
                if let Err(e) = event_sender
                    .send(Event::PurchaseOrderStatusChanged {
                        order_id,
                        old_status: old_status.to_string(),
                        new_status: next.to_string(),
                    })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to send status changed event");
                }
            }
        }

        Ok(BulkStatusUpdateResponse {
            updated,
            status: next.to_string(),
        })
    }

    /// Deletes a pending purchase order and its lines
    #[instrument(skip(self))]
    pub async fn delete_purchase_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = InventoryOrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch purchase order for deletion");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
            })?;

        if existing.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Only pending orders can be deleted (order {} is '{}')",
                existing.order_number, existing.status
            )));
        }

        InventoryOrderItemEntity::delete_many()
            .filter(inventory_order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to delete order lines");
                ServiceError::DatabaseError(e)
            })?;
        InventoryOrderEntity::delete_by_id(order_id)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to delete purchase order");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit purchase order deletion");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %existing.order_number, "Purchase order deleted");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::PurchaseOrderDeleted(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order deleted event");
            }
        }

        Ok(())
    }

    fn resolve_tax_rate(&self, requested: Option<Decimal>) -> Result<Decimal, ServiceError> {
        let rate = requested.unwrap_or(self.default_tax_rate);
        check_tax_rate(rate)?;
        Ok(rate)
    }
}

fn check_tax_rate(rate: Decimal) -> Result<(), ServiceError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ServiceError::ValidationError(format!(
            "Tax rate must be a fraction between 0 and 1, got {}",
            rate
        )));
    }
    Ok(())
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {}", raw)))
}

/// Rejects empty item lists, invalid lines, and the same product appearing
/// on more than one line.
fn validate_order_items(items: &[PurchaseOrderItemRequest]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "A purchase order must contain at least one item".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        item.validate()
            .map_err(|e| ServiceError::ValidationError(format!("items[{}]: {}", index, e)))?;
        if !seen.insert(item.product_id) {
            return Err(ServiceError::ValidationError(format!(
                "items[{}] repeats product {}; merge duplicate lines first",
                index, item.product_id
            )));
        }
    }
    Ok(())
}

async fn load_active_supplier<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
) -> Result<supplier::Model, ServiceError> {
    let supplier = SupplierEntity::find_by_id(supplier_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Supplier with ID {} not found", supplier_id))
        })?;
    if !supplier.active {
        return Err(ServiceError::ValidationError(format!(
            "Supplier '{}' is deactivated",
            supplier.name
        )));
    }
    Ok(supplier)
}

async fn load_products_for_items<C: ConnectionTrait>(
    conn: &C,
    items: &[PurchaseOrderItemRequest],
) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
    let ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
    let products: HashMap<Uuid, product::Model> = ProductEntity::find()
        .filter(product::Column::Id.is_in(ids))
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    for (index, item) in items.iter().enumerate() {
        let product = products.get(&item.product_id).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "items[{}] references an unknown product ({})",
                index, item.product_id
            ))
        })?;
        if !product.active {
            return Err(ServiceError::ValidationError(format!(
                "items[{}] references a deactivated product ({})",
                index, product.sku
            )));
        }
    }
    Ok(products)
}

fn compute_totals(lines: &[(i32, Decimal)], tax_rate: Decimal) -> (Decimal, Decimal, Decimal) {
    let subtotal: Decimal = lines
        .iter()
        .map(|(quantity, unit_cost)| Decimal::from(*quantity) * *unit_cost)
        .sum();
    let tax_amount = (subtotal * tax_rate).round_dp(2);
    let total_amount = subtotal + tax_amount;
    (subtotal, tax_amount, total_amount)
}

/// Converts an order model to response format
fn model_to_response(model: inventory_order::Model) -> PurchaseOrderResponse {
    PurchaseOrderResponse {
        id: model.id,
        order_number: model.order_number,
        supplier_id: model.supplier_id,
        status: model.status.to_string(),
        order_date: model.order_date,
        expected_delivery_date: model.expected_delivery_date,
        subtotal: model.subtotal,
        tax_rate: model.tax_rate,
        tax_amount: model.tax_amount,
        total_amount: model.total_amount,
        invoice_number: model.invoice_number,
        invoice_date: model.invoice_date,
        notes: model.notes,
        created_by: model.created_by,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

fn item_response(
    line: inventory_order_item::Model,
    product: Option<&product::Model>,
) -> PurchaseOrderItemResponse {
    PurchaseOrderItemResponse {
        id: line.id,
        product_id: line.product_id,
        sku: product.map(|p| p.sku.clone()),
        product_name: product.map(|p| p.name.clone()),
        quantity: line.quantity,
        received_quantity: line.received_quantity,
        outstanding_quantity: line.quantity - line.received_quantity,
        unit_cost: line.unit_cost,
        line_total: line.line_total,
    }
}

fn detail_response(
    model: inventory_order::Model,
    supplier_name: Option<String>,
    items: Vec<PurchaseOrderItemResponse>,
) -> PurchaseOrderDetailResponse {
    PurchaseOrderDetailResponse {
        order: model_to_response(model),
        supplier_name,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn compute_totals_applies_tax_and_rounds_to_cents() {
        let lines = vec![(3, dec!(4.99)), (2, dec!(10.00))];
        let (subtotal, tax_amount, total) = compute_totals(&lines, dec!(0.08));

        assert_eq!(subtotal, dec!(34.97));
        assert_eq!(tax_amount, dec!(2.80)); // 2.7976 rounded
        assert_eq!(total, dec!(37.77));
    }

    #[test]
    fn compute_totals_with_zero_rate_has_no_tax() {
        let lines = vec![(1, dec!(12.50))];
        let (subtotal, tax_amount, total) = compute_totals(&lines, Decimal::ZERO);

        assert_eq!(subtotal, dec!(12.50));
        assert_eq!(tax_amount, Decimal::ZERO);
        assert_eq!(total, dec!(12.50));
    }

    #[test]
    fn order_status_strings_round_trip() {
        assert_eq!(
            parse_order_status("waiting_for_delivery").unwrap(),
            OrderStatus::WaitingForDelivery
        );
        assert!(parse_order_status("shipped").is_err());
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let product_id = Uuid::new_v4();
        let items = vec![
            PurchaseOrderItemRequest {
                product_id,
                quantity: 1,
                unit_cost: dec!(1.00),
            },
            PurchaseOrderItemRequest {
                product_id,
                quantity: 2,
                unit_cost: dec!(1.00),
            },
        ];
        let err = validate_order_items(&items).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn empty_item_lists_are_rejected() {
        assert!(matches!(
            validate_order_items(&[]),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_quantity_lines_are_rejected() {
        let items = vec![PurchaseOrderItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
            unit_cost: dec!(1.00),
        }];
        assert!(validate_order_items(&items).is_err());
    }

    #[test]
    fn tax_rates_outside_the_unit_interval_are_rejected() {
        assert!(check_tax_rate(dec!(0)).is_ok());
        assert!(check_tax_rate(dec!(0.08)).is_ok());
        assert!(check_tax_rate(dec!(1)).is_ok());
        assert!(check_tax_rate(dec!(1.01)).is_err());
        assert!(check_tax_rate(dec!(-0.01)).is_err());
    }

    #[test]
    fn item_response_reports_outstanding_quantity() {
        let now = Utc::now();
        let line = inventory_order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 10,
            received_quantity: 4,
            unit_cost: dec!(2.00),
            line_total: dec!(20.00),
            created_at: now,
            updated_at: now,
        };
        let response = item_response(line, None);
        assert_eq!(response.outstanding_quantity, 6);
        assert!(response.sku.is_none());
    }
}
