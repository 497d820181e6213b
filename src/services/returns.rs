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
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::supplier::{self, Entity as SupplierEntity};
use crate::entities::supplier_return::{self, Entity as SupplierReturnEntity};
use crate::entities::supplier_return_item::{self, Entity as SupplierReturnItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{ReturnItemStatus, ReturnStatus};
use crate::services::sequences::{next_document_number, DOC_TYPE_SUPPLIER_RETURN};

fn validate_non_negative_cost(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("negative_cost");
        err.message = Some("Unit cost must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// One requested return line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReturnItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Unit value of the returned goods; defaults to the product cost price
    #[validate(custom = "validate_non_negative_cost")]
    pub unit_cost: Option<Decimal>,
}

/// Request payload for creating a supplier return
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateReturnRequest {
    pub supplier_id: Uuid,
    /// Purchase order the goods came from, if known
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 500, message = "A return needs a reason"))]
    pub reason: String,
    pub items: Vec<ReturnItemRequest>,
    pub notes: Option<String>,
}

/// Request payload for rejecting a pending return
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RejectReturnRequest {
    #[validate(length(min = 1, max = 500, message = "A rejection needs a reason"))]
    pub reason: String,
}

/// Request payload for cancelling a return
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CancelReturnRequest {
    pub reason: Option<String>,
}

/// The supplier's decision for one return line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReturnItemDecision {
    /// Return line ID (not the product ID)
    pub item_id: Uuid,
    /// One of `accepted`, `partial_accept`, `rejected`, `exchange`
    #[validate(length(min = 1, message = "Decision status must not be empty"))]
    pub status: String,
    /// Required for `partial_accept`; implied for the other decisions
    pub accepted_quantity: Option<i32>,
    pub condition_notes: Option<String>,
}

/// Request payload for recording the supplier's response to a shipped return
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveReturnRequest {
    pub items: Vec<ReturnItemDecision>,
}

/// Filters accepted by the return list operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnFilter {
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

/// Supplier return header returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub return_number: String,
    pub supplier_id: Uuid,
    pub order_id: Option<Uuid>,
    pub status: String,
    pub reason: String,
    pub item_count: i32,
    pub total_quantity: i32,
    pub total_value: Decimal,
    pub credit_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// One return line returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub accepted_quantity: i32,
    pub unit_cost: Decimal,
    pub status: String,
    pub condition_notes: Option<String>,
}

/// Supplier return with supplier context and lines
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnDetailResponse {
    #[serde(flatten)]
    pub supplier_return: ReturnResponse,
    pub supplier_name: Option<String>,
    pub items: Vec<ReturnItemResponse>,
}

/// Service for managing returns of goods to suppliers
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReturnService {
    /// Creates a new return service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new supplier return in `draft` status and allocates its
    /// return number.
    #[instrument(
        skip(self, request),
        fields(supplier_id = %request.supplier_id, item_count = request.items.len())
    )]
    pub async fn create_return(
        &self,
        request: CreateReturnRequest,
        created_by: Uuid,
    ) -> Result<ReturnDetailResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_return_items(&request.items)?;

        let db = &*self.db_pool;

        let supplier = SupplierEntity::find_by_id(request.supplier_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Supplier with ID {} not found",
                    request.supplier_id
                ))
            })?;
        if !supplier.active {
            return Err(ServiceError::ValidationError(format!(
                "Supplier '{}' is deactivated",
                supplier.name
            )));
        }

        if let Some(order_id) = request.order_id {
            let order = InventoryOrderEntity::find_by_id(order_id)
                .one(db)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Purchase order with ID {} not found", order_id))
                })?;
            if order.supplier_id != request.supplier_id {
                return Err(ServiceError::ValidationError(format!(
                    "Order {} belongs to a different supplier",
                    order.order_number
                )));
            }
        }

        let products = load_products(db, &request.items).await?;

        let mut total_quantity = 0;
        let mut total_value = Decimal::ZERO;
        let mut resolved_lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            // Existence was checked in load_products.
            let product = &products[&item.product_id];
            let unit_cost = item.unit_cost.unwrap_or(product.cost_price);
            total_quantity += item.quantity;
            total_value += Decimal::from(item.quantity) * unit_cost;
            resolved_lines.push((item.product_id, item.quantity, unit_cost));
        }

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let return_number = next_document_number(&txn, DOC_TYPE_SUPPLIER_RETURN).await?;
        let return_id = Uuid::new_v4();
        let now = Utc::now();

        let header = supplier_return::ActiveModel {
            id: Set(return_id),
            return_number: Set(return_number.clone()),
            supplier_id: Set(request.supplier_id),
            order_id: Set(request.order_id),
            status: Set(ReturnStatus::Draft),
            reason: Set(request.reason),
            item_count: Set(request.items.len() as i32),
            total_quantity: Set(total_quantity),
            total_value: Set(total_value),
            credit_amount: Set(None),
            notes: Set(request.notes),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let saved_header = header.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to insert return header");
            ServiceError::DatabaseError(e)
        })?;

        let mut saved_items = Vec::with_capacity(resolved_lines.len());
        for (product_id, quantity, unit_cost) in resolved_lines {
            let line = supplier_return_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(return_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                accepted_quantity: Set(0),
                unit_cost: Set(unit_cost),
                status: Set(ReturnItemStatus::Pending),
                condition_notes: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            let saved = line.insert(&txn).await.map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to insert return line");
                ServiceError::DatabaseError(e)
            })?;
            saved_items.push(saved);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit return creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            return_id = %return_id,
            return_number = %return_number,
            total_value = %total_value,
            "Supplier return created"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ReturnCreated(return_id)).await {
                warn!(error = %e, return_id = %return_id, "Failed to send return created event");
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

    /// Gets a return with its supplier and lines
    #[instrument(skip(self))]
    pub async fn get_return(&self, return_id: Uuid) -> Result<ReturnDetailResponse, ServiceError> {
        let db = &*self.db_pool;

        let (ret, supplier) = SupplierReturnEntity::find_by_id(return_id)
            .find_also_related(SupplierEntity)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, return_id = %return_id, "Failed to fetch return");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Return with ID {} not found", return_id))
            })?;

        let items = SupplierReturnItemEntity::find()
            .filter(supplier_return_item::Column::ReturnId.eq(return_id))
            .find_also_related(ProductEntity)
            .order_by_asc(supplier_return_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, return_id = %return_id, "Failed to fetch return lines");
                ServiceError::DatabaseError(e)
            })?;

        Ok(detail_response(
            ret,
            supplier.map(|s| s.name),
            items
                .into_iter()
                .map(|(line, product)| item_response(line, product.as_ref()))
                .collect(),
        ))
    }

    /// Lists returns with pagination and optional filters
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        page: u64,
        limit: u64,
        filter: ReturnFilter,
    ) -> Result<(Vec<ReturnResponse>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query =
            SupplierReturnEntity::find().order_by_desc(supplier_return::Column::CreatedAt);
        if let Some(status) = filter.status.as_deref() {
            let status = parse_return_status(status)?;
            query = query.filter(supplier_return::Column::Status.eq(status));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(supplier_return::Column::SupplierId.eq(supplier_id));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(supplier_return::Column::OrderId.eq(order_id));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let returns = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((returns.into_iter().map(model_to_response).collect(), total))
    }

    /// Submits a draft return for approval (`draft` to `pending`)
    #[instrument(skip(self))]
    pub async fn submit_return(&self, return_id: Uuid) -> Result<ReturnResponse, ServiceError> {
        self.apply_transition(
            return_id,
            ReturnStatus::Pending,
            "submit",
            None,
            Event::ReturnSubmitted,
            |_| Ok(()),
        )
        .await
    }

    /// Approves a pending return (`pending` to `approved`)
    #[instrument(skip(self))]
    pub async fn approve_return(&self, return_id: Uuid) -> Result<ReturnResponse, ServiceError> {
        self.apply_transition(
            return_id,
            ReturnStatus::Approved,
            "approve",
            None,
            Event::ReturnApproved,
            |_| Ok(()),
        )
        .await
    }

    /// Rejects a pending return, which cancels it with the rejection reason
    /// appended to the notes
    #[instrument(skip(self, request))]
    pub async fn reject_return(
        &self,
        return_id: Uuid,
        request: RejectReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        self.apply_transition(
            return_id,
            ReturnStatus::Cancelled,
            "reject",
            Some(format!("Rejected: {}", request.reason)),
            Event::ReturnRejected,
            |ret| {
                if ret.status != ReturnStatus::Pending {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Only pending returns can be rejected (return {} is '{}')",
                        ret.return_number, ret.status
                    )));
                }
                Ok(())
            },
        )
        .await
    }

    /// Cancels a return before any goods have moved (`draft`, `pending`, or
    /// `approved` only)
    #[instrument(skip(self, request))]
    pub async fn cancel_return(
        &self,
        return_id: Uuid,
        request: CancelReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        let note = request.reason.map(|reason| format!("Cancelled: {}", reason));
        self.apply_transition(
            return_id,
            ReturnStatus::Cancelled,
            "cancel",
            note,
            Event::ReturnCancelled,
            |ret| {
                if !ret.status.is_cancellable() {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Return {} can no longer be cancelled (status '{}')",
                        ret.return_number, ret.status
                    )));
                }
                Ok(())
            },
        )
        .await
    }

    /// Ships an approved return to the supplier and decrements stock by
    /// every line quantity, all inside one transaction.
    #[instrument(skip(self))]
    pub async fn ship_return(&self, return_id: Uuid) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = fetch_return(&txn, return_id).await?;
        guard_transition(&existing, ReturnStatus::Shipped, "ship")?;

        let lines = SupplierReturnItemEntity::find()
            .filter(supplier_return_item::Column::ReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        for line in &lines {
            let product = ProductEntity::find_by_id(line.product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product with ID {} not found", line.product_id))
                })?;
            let new_stock = product.stock_quantity - line.quantity;
            if new_stock < 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Cannot ship return {}: product '{}' has {} on hand, the return needs {}",
                    existing.return_number, product.sku, product.stock_quantity, line.quantity
                )));
            }
            let mut product_model: product::ActiveModel = product.into();
            product_model.stock_quantity = Set(new_stock);
            product_model.updated_at = Set(now);
            product_model.update(&txn).await.map_err(|e| {
                error!(error = %e, product_id = %line.product_id, "Failed to decrement stock for shipment");
                ServiceError::DatabaseError(e)
            })?;
        }

        let version = existing.version;
        let mut active_model: supplier_return::ActiveModel = existing.into();
        active_model.status = Set(ReturnStatus::Shipped);
        active_model.updated_at = Set(now);
        active_model.version = Set(version + 1);
        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, return_id = %return_id, "Failed to mark return shipped");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit return shipment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            return_id = %return_id,
            return_number = %updated.return_number,
            lines = lines.len(),
            "Return shipped to supplier"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ReturnShipped(return_id)).await {
                warn!(error = %e, return_id = %return_id, "Failed to send return shipped event");
            }
        }

        Ok(model_to_response(updated))
    }

    /// Records the supplier's response to a shipped return. Every line must
    /// be decided exactly once; rejected quantities, partial remainders,
    /// and exchanged goods come back into stock.
    #[instrument(skip(self, request), fields(decision_count = request.items.len()))]
    pub async fn receive_return(
        &self,
        return_id: Uuid,
        request: ReceiveReturnRequest,
    ) -> Result<ReturnDetailResponse, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Receiving a return requires a decision for every line".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for (index, decision) in request.items.iter().enumerate() {
            decision
                .validate()
                .map_err(|e| ServiceError::ValidationError(format!("items[{}]: {}", index, e)))?;
            if !seen.insert(decision.item_id) {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}] repeats return line {}",
                    index, decision.item_id
                )));
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = fetch_return(&txn, return_id).await?;
        guard_transition(&existing, ReturnStatus::Received, "receive")?;

        let lines = SupplierReturnItemEntity::find()
            .filter(supplier_return_item::Column::ReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let lines_by_id: HashMap<Uuid, supplier_return_item::Model> =
            lines.into_iter().map(|line| (line.id, line)).collect();

        if request.items.len() != lines_by_id.len() {
            return Err(ServiceError::ValidationError(format!(
                "Every return line must be decided exactly once ({} decisions for {} lines)",
                request.items.len(),
                lines_by_id.len()
            )));
        }

        // Resolve every decision before writing anything.
        let mut resolved = Vec::with_capacity(request.items.len());
        for (index, decision) in request.items.iter().enumerate() {
            let line = lines_by_id.get(&decision.item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "items[{}] references an unknown return line ({})",
                    index, decision.item_id
                ))
            })?;
            let status = parse_item_decision(index, &decision.status)?;
            let (accepted, restock) =
                resolve_decision(index, line.quantity, status, decision.accepted_quantity)?;
            resolved.push((
                decision.item_id,
                status,
                accepted,
                restock,
                decision.condition_notes.clone(),
            ));
        }

        let now = Utc::now();
        for (item_id, status, accepted, restock, condition_notes) in resolved {
            // Validated against lines_by_id above.
            let line = lines_by_id[&item_id].clone();
            let product_id = line.product_id;

            let mut line_model: supplier_return_item::ActiveModel = line.into();
            line_model.status = Set(status);
            line_model.accepted_quantity = Set(accepted);
            if let Some(notes) = condition_notes {
                line_model.condition_notes = Set(Some(notes));
            }
            line_model.updated_at = Set(now);
            line_model.update(&txn).await.map_err(|e| {
                error!(error = %e, item_id = %item_id, "Failed to record line decision");
                ServiceError::DatabaseError(e)
            })?;

            if restock > 0 {
                let product = ProductEntity::find_by_id(product_id)
                    .one(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Product with ID {} not found",
                            product_id
                        ))
                    })?;
                let new_stock = product.stock_quantity + restock;
                let mut product_model: product::ActiveModel = product.into();
                product_model.stock_quantity = Set(new_stock);
                product_model.updated_at = Set(now);
                product_model.update(&txn).await.map_err(|e| {
                    error!(error = %e, product_id = %product_id, "Failed to restock returned goods");
                    ServiceError::DatabaseError(e)
                })?;
            }
        }

        let version = existing.version;
        let mut active_model: supplier_return::ActiveModel = existing.into();
        active_model.status = Set(ReturnStatus::Received);
        active_model.updated_at = Set(now);
        active_model.version = Set(version + 1);
        active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, return_id = %return_id, "Failed to mark return received");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit return receipt");
            ServiceError::DatabaseError(e)
        })?;

        info!(return_id = %return_id, "Supplier response recorded");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ReturnReceived(return_id)).await {
                warn!(error = %e, return_id = %return_id, "Failed to send return received event");
            }
        }

        self.get_return(return_id).await
    }

    /// Closes a received return. If any quantity was accepted the return
    /// completes with a supplier credit of accepted quantity times unit
    /// cost per line; otherwise it closes as cancelled.
    #[instrument(skip(self))]
    pub async fn close_return(&self, return_id: Uuid) -> Result<ReturnResponse, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = fetch_return(&txn, return_id).await?;
        if existing.status != ReturnStatus::Received {
            return Err(ServiceError::InvalidOperation(format!(
                "Only received returns can be closed (return {} is '{}')",
                existing.return_number, existing.status
            )));
        }

        let lines = SupplierReturnItemEntity::find()
            .filter(supplier_return_item::Column::ReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let credit_amount: Decimal = lines
            .iter()
            .map(|line| Decimal::from(line.accepted_quantity) * line.unit_cost)
            .sum();
        let any_accepted = lines.iter().any(|line| line.accepted_quantity > 0);
        let next = if any_accepted {
            ReturnStatus::Completed
        } else {
            ReturnStatus::Cancelled
        };

        let version = existing.version;
        let return_number = existing.return_number.clone();
        let mut active_model: supplier_return::ActiveModel = existing.into();
        active_model.status = Set(next);
        active_model.credit_amount = Set(Some(credit_amount));
        active_model.updated_at = Set(Utc::now());
        active_model.version = Set(version + 1);
        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, return_id = %return_id, "Failed to close return");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit return close");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            return_id = %return_id,
            return_number = %return_number,
            outcome = %next,
            credit = %credit_amount,
            "Return closed"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::ReturnClosed {
                    return_id,
                    credit_amount,
                })
                .await
            {
                warn!(error = %e, return_id = %return_id, "Failed to send return closed event");
            }
        }

        Ok(model_to_response(updated))
    }

    /// Shared plumbing for the transitions that only touch the header.
    async fn apply_transition<F>(
        &self,
        return_id: Uuid,
        next: ReturnStatus,
        action: &str,
        note: Option<String>,
        make_event: fn(Uuid) -> Event,
        extra_guard: F,
    ) -> Result<ReturnResponse, ServiceError>
    where
        F: FnOnce(&supplier_return::Model) -> Result<(), ServiceError>,
    {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = fetch_return(&txn, return_id).await?;
        extra_guard(&existing)?;
        guard_transition(&existing, next, action)?;

        let old_status = existing.status;
        let version = existing.version;
        let new_notes = match note {
            Some(line) => Some(append_note(existing.notes.clone(), line)),
            None => None,
        };

        let mut active_model: supplier_return::ActiveModel = existing.into();
        active_model.status = Set(next);
        if let Some(notes) = new_notes {
            active_model.notes = Set(Some(notes));
        }
        active_model.updated_at = Set(Utc::now());
        active_model.version = Set(version + 1);

        let updated = active_model.update(&txn).await.map_err(|e| {
            error!(error = %e, return_id = %return_id, "Failed to update return status");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit return status update");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            return_id = %return_id,
            return_number = %updated.return_number,
            old_status = %old_status,
            new_status = %next,
            "Return status updated"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(make_event(return_id)).await {
                warn!(error = %e, return_id = %return_id, "Failed to send return status event");
            }
        }

        Ok(model_to_response(updated))
    }
}

async fn fetch_return<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<supplier_return::Model, ServiceError> {
    SupplierReturnEntity::find_by_id(return_id)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, return_id = %return_id, "Failed to fetch return");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Return with ID {} not found", return_id)))
}

fn guard_transition(
    ret: &supplier_return::Model,
    next: ReturnStatus,
    action: &str,
) -> Result<(), ServiceError> {
    if ret.status == next || !ret.status.can_transition_to(&next) {
        return Err(ServiceError::InvalidOperation(format!(
            "Cannot {} return {} in status '{}'",
            action, ret.return_number, ret.status
        )));
    }
    Ok(())
}

fn parse_return_status(raw: &str) -> Result<ReturnStatus, ServiceError> {
    ReturnStatus::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("Unknown return status: {}", raw)))
}

fn parse_item_decision(index: usize, raw: &str) -> Result<ReturnItemStatus, ServiceError> {
    let status = ReturnItemStatus::from_str(raw).map_err(|_| {
        ServiceError::ValidationError(format!("items[{}]: unknown decision '{}'", index, raw))
    })?;
    if status == ReturnItemStatus::Pending {
        return Err(ServiceError::ValidationError(format!(
            "items[{}]: a received line must be decided; 'pending' is not a decision",
            index
        )));
    }
    Ok(status)
}

/// Works out the accepted and restocked quantities for one line decision.
///
/// Returns `(accepted_quantity, restock_quantity)`. Exchanged lines count
/// as fully accepted and also come back into stock, because replacement
/// goods arrive for them.
fn resolve_decision(
    index: usize,
    quantity: i32,
    status: ReturnItemStatus,
    accepted_quantity: Option<i32>,
) -> Result<(i32, i32), ServiceError> {
    match status {
        ReturnItemStatus::Pending => Err(ServiceError::ValidationError(format!(
            "items[{}]: a received line must be decided; 'pending' is not a decision",
            index
        ))),
        ReturnItemStatus::Accepted => match accepted_quantity {
            None => Ok((quantity, 0)),
            Some(q) if q == quantity => Ok((quantity, 0)),
            Some(q) => Err(ServiceError::ValidationError(format!(
                "items[{}]: an accepted line keeps its full quantity {} (got {})",
                index, quantity, q
            ))),
        },
        ReturnItemStatus::PartialAccept => match accepted_quantity {
            Some(q) if q > 0 && q < quantity => Ok((q, quantity - q)),
            _ => Err(ServiceError::ValidationError(format!(
                "items[{}]: partial acceptance requires 0 < accepted_quantity < {}",
                index, quantity
            ))),
        },
        ReturnItemStatus::Rejected => match accepted_quantity {
            None | Some(0) => Ok((0, quantity)),
            Some(q) => Err(ServiceError::ValidationError(format!(
                "items[{}]: a rejected line accepts nothing (got {})",
                index, q
            ))),
        },
        ReturnItemStatus::Exchange => match accepted_quantity {
            None => Ok((quantity, quantity)),
            Some(q) if q == quantity => Ok((quantity, quantity)),
            Some(q) => Err(ServiceError::ValidationError(format!(
                "items[{}]: an exchange covers the full quantity {} (got {})",
                index, quantity, q
            ))),
        },
    }
}

/// Rejects empty item lists, invalid lines, and duplicate products.
fn validate_return_items(items: &[ReturnItemRequest]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "A return must contain at least one item".to_string(),
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

async fn load_products<C: ConnectionTrait>(
    conn: &C,
    items: &[ReturnItemRequest],
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
        if !products.contains_key(&item.product_id) {
            return Err(ServiceError::ValidationError(format!(
                "items[{}] references an unknown product ({})",
                index, item.product_id
            )));
        }
    }
    Ok(products)
}

fn append_note(existing: Option<String>, line: String) -> String {
    match existing {
        Some(notes) if !notes.is_empty() => format!("{}\n{}", notes, line),
        _ => line,
    }
}

/// Converts a return model to response format
fn model_to_response(model: supplier_return::Model) -> ReturnResponse {
    ReturnResponse {
        id: model.id,
        return_number: model.return_number,
        supplier_id: model.supplier_id,
        order_id: model.order_id,
        status: model.status.to_string(),
        reason: model.reason,
        item_count: model.item_count,
        total_quantity: model.total_quantity,
        total_value: model.total_value,
        credit_amount: model.credit_amount,
        notes: model.notes,
        created_by: model.created_by,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

fn item_response(
    line: supplier_return_item::Model,
    product: Option<&product::Model>,
) -> ReturnItemResponse {
    ReturnItemResponse {
        id: line.id,
        product_id: line.product_id,
        sku: product.map(|p| p.sku.clone()),
        product_name: product.map(|p| p.name.clone()),
        quantity: line.quantity,
        accepted_quantity: line.accepted_quantity,
        unit_cost: line.unit_cost,
        status: line.status.to_string(),
        condition_notes: line.condition_notes,
    }
}

fn detail_response(
    model: supplier_return::Model,
    supplier_name: Option<String>,
    items: Vec<ReturnItemResponse>,
) -> ReturnDetailResponse {
    ReturnDetailResponse {
        supplier_return: model_to_response(model),
        supplier_name,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(ReturnItemStatus::Accepted, None, Ok((10, 0)))]
    #[case(ReturnItemStatus::Accepted, Some(10), Ok((10, 0)))]
    #[case(ReturnItemStatus::PartialAccept, Some(4), Ok((4, 6)))]
    #[case(ReturnItemStatus::Rejected, None, Ok((0, 10)))]
    #[case(ReturnItemStatus::Rejected, Some(0), Ok((0, 10)))]
    #[case(ReturnItemStatus::Exchange, None, Ok((10, 10)))]
    #[case(ReturnItemStatus::Exchange, Some(10), Ok((10, 10)))]
    fn decision_matrix_accepts_valid_combinations(
        #[case] status: ReturnItemStatus,
        #[case] accepted: Option<i32>,
        #[case] expected: Result<(i32, i32), ()>,
    ) {
        let result = resolve_decision(0, 10, status, accepted);
        assert_eq!(result.ok(), expected.ok());
    }

    #[rstest]
    #[case(ReturnItemStatus::Accepted, Some(7))]
    #[case(ReturnItemStatus::PartialAccept, None)]
    #[case(ReturnItemStatus::PartialAccept, Some(0))]
    #[case(ReturnItemStatus::PartialAccept, Some(10))]
    #[case(ReturnItemStatus::PartialAccept, Some(11))]
    #[case(ReturnItemStatus::Rejected, Some(3))]
    #[case(ReturnItemStatus::Exchange, Some(2))]
    #[case(ReturnItemStatus::Pending, None)]
    fn decision_matrix_rejects_invalid_combinations(
        #[case] status: ReturnItemStatus,
        #[case] accepted: Option<i32>,
    ) {
        assert!(resolve_decision(0, 10, status, accepted).is_err());
    }

    proptest! {
        #[test]
        fn partial_acceptance_always_splits_the_line(
            quantity in 2i32..10_000,
            accepted in 1i32..10_000,
        ) {
            prop_assume!(accepted < quantity);
            let (a, restock) = resolve_decision(
                0,
                quantity,
                ReturnItemStatus::PartialAccept,
                Some(accepted),
            )
            .unwrap();
            prop_assert_eq!(a, accepted);
            prop_assert_eq!(a + restock, quantity);
        }

        #[test]
        fn non_exchange_decisions_never_restock_more_than_shipped(
            quantity in 1i32..10_000,
        ) {
            let (_, rejected_restock) =
                resolve_decision(0, quantity, ReturnItemStatus::Rejected, None).unwrap();
            let (_, accepted_restock) =
                resolve_decision(0, quantity, ReturnItemStatus::Accepted, None).unwrap();
            prop_assert_eq!(rejected_restock, quantity);
            prop_assert_eq!(accepted_restock, 0);
        }
    }

    #[test]
    fn append_note_joins_with_newline() {
        assert_eq!(
            append_note(Some("first".to_string()), "Rejected: damaged".to_string()),
            "first\nRejected: damaged"
        );
        assert_eq!(
            append_note(None, "Cancelled: raised in error".to_string()),
            "Cancelled: raised in error"
        );
        assert_eq!(
            append_note(Some(String::new()), "note".to_string()),
            "note"
        );
    }

    #[test]
    fn guard_transition_refuses_same_status_and_illegal_moves() {
        let now = Utc::now();
        let mut ret = supplier_return::Model {
            id: Uuid::new_v4(),
            return_number: "SR-2026-000001".to_string(),
            supplier_id: Uuid::new_v4(),
            order_id: None,
            status: ReturnStatus::Draft,
            reason: "damaged".to_string(),
            item_count: 1,
            total_quantity: 2,
            total_value: dec!(10),
            credit_amount: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            version: 1,
        };

        assert!(guard_transition(&ret, ReturnStatus::Pending, "submit").is_ok());
        assert!(guard_transition(&ret, ReturnStatus::Draft, "submit").is_err());
        assert!(guard_transition(&ret, ReturnStatus::Shipped, "ship").is_err());

        ret.status = ReturnStatus::Shipped;
        assert!(guard_transition(&ret, ReturnStatus::Received, "receive").is_ok());
        assert!(guard_transition(&ret, ReturnStatus::Cancelled, "cancel").is_err());
    }

    #[test]
    fn duplicate_return_products_are_rejected() {
        let product_id = Uuid::new_v4();
        let items = vec![
            ReturnItemRequest {
                product_id,
                quantity: 1,
                unit_cost: Some(dec!(2.00)),
            },
            ReturnItemRequest {
                product_id,
                quantity: 3,
                unit_cost: None,
            },
        ];
        assert!(validate_return_items(&items).is_err());
    }

    #[test]
    fn credit_amount_sums_accepted_value() {
        let now = Utc::now();
        let line = |accepted: i32, cost: Decimal| supplier_return_item::Model {
            id: Uuid::new_v4(),
            return_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 5,
            accepted_quantity: accepted,
            unit_cost: cost,
            status: ReturnItemStatus::Accepted,
            condition_notes: None,
            created_at: now,
            updated_at: now,
        };
        let lines = [line(5, dec!(2.00)), line(0, dec!(99.00)), line(3, dec!(1.50))];
        let credit: Decimal = lines
            .iter()
            .map(|l| Decimal::from(l.accepted_quantity) * l.unit_cost)
            .sum();
        assert_eq!(credit, dec!(14.50));
    }
}
