use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::supplier::{self, Entity as SupplierEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Request payload for creating a supplier
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateSupplierRequest {
    #[validate(length(min = 1, max = 255, message = "Supplier name must not be empty"))]
    pub name: String,
    pub contact_name: Option<String>,
    #[validate(email(message = "Contact email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_terms: Option<String>,
}

/// Request payload for updating a supplier. Fields left out stay unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplierRequest {
    #[validate(length(min = 1, max = 255, message = "Supplier name must not be empty"))]
    pub name: Option<String>,
    pub contact_name: Option<String>,
    #[validate(email(message = "Contact email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_terms: Option<String>,
}

/// Filters accepted by the supplier list operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplierFilter {
    /// Substring match against the supplier name
    pub search: Option<String>,
    /// Restrict to active or deactivated suppliers
    pub active: Option<bool>,
}

/// Supplier representation returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupplierResponse {
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

/// Service for managing suppliers
#[derive(Clone)]
pub struct SupplierService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl SupplierService {
    /// Creates a new supplier service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a new supplier record
    #[instrument(skip(self, request), fields(supplier_name = %request.name))]
    pub async fn create_supplier(
        &self,
        request: CreateSupplierRequest,
    ) -> Result<SupplierResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = SupplierEntity::find()
            .filter(supplier::Column::Name.eq(request.name.as_str()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to check supplier name uniqueness");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A supplier named '{}' already exists",
                request.name
            )));
        }

        let now = Utc::now();
        let new_supplier = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            contact_name: Set(request.contact_name),
            email: Set(request.email),
            phone: Set(request.phone),
            address: Set(request.address),
            payment_terms: Set(request.payment_terms),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = new_supplier.insert(db).await.map_err(|e| {
            error!(error = %e, "Failed to create supplier");
            ServiceError::DatabaseError(e)
        })?;

        info!(supplier_id = %created.id, name = %created.name, "Supplier created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::SupplierCreated(created.id)).await {
                warn!(error = %e, supplier_id = %created.id, "Failed to send supplier created event");
            }
        }

        Ok(model_to_response(created))
    }

    /// Gets a supplier by ID
    #[instrument(skip(self))]
    pub async fn get_supplier(&self, supplier_id: Uuid) -> Result<SupplierResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = SupplierEntity::find_by_id(supplier_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, supplier_id = %supplier_id, "Failed to fetch supplier");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier with ID {} not found", supplier_id))
            })?;

        Ok(model_to_response(found))
    }

    /// Lists suppliers with pagination and optional filters
    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        page: u64,
        limit: u64,
        filter: SupplierFilter,
    ) -> Result<(Vec<SupplierResponse>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = SupplierEntity::find().order_by_asc(supplier::Column::Name);
        if let Some(search) = filter.search.as_deref() {
            if !search.is_empty() {
                query = query.filter(supplier::Column::Name.contains(search));
            }
        }
        if let Some(active) = filter.active {
            query = query.filter(supplier::Column::Active.eq(active));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let suppliers = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((
            suppliers.into_iter().map(model_to_response).collect(),
            total,
        ))
    }

    /// Updates an existing supplier
    #[instrument(skip(self, request))]
    pub async fn update_supplier(
        &self,
        supplier_id: Uuid,
        request: UpdateSupplierRequest,
    ) -> Result<SupplierResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = SupplierEntity::find_by_id(supplier_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, supplier_id = %supplier_id, "Failed to fetch supplier for update");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier with ID {} not found", supplier_id))
            })?;

        if let Some(name) = request.name.as_deref() {
            if name != existing.name {
                let clash = SupplierEntity::find()
                    .filter(supplier::Column::Name.eq(name))
                    .filter(supplier::Column::Id.ne(supplier_id))
                    .one(db)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
                if clash.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "A supplier named '{}' already exists",
                        name
                    )));
                }
            }
        }

        let mut active_model: supplier::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active_model.name = Set(name);
        }
        if let Some(contact_name) = request.contact_name {
            active_model.contact_name = Set(Some(contact_name));
        }
        if let Some(email) = request.email {
            active_model.email = Set(Some(email));
        }
        if let Some(phone) = request.phone {
            active_model.phone = Set(Some(phone));
        }
        if let Some(address) = request.address {
            active_model.address = Set(Some(address));
        }
        if let Some(payment_terms) = request.payment_terms {
            active_model.payment_terms = Set(Some(payment_terms));
        }
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(db).await.map_err(|e| {
            error!(error = %e, supplier_id = %supplier_id, "Failed to update supplier");
            ServiceError::DatabaseError(e)
        })?;

        info!(supplier_id = %updated.id, "Supplier updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::SupplierUpdated(updated.id)).await {
                warn!(error = %e, supplier_id = %updated.id, "Failed to send supplier updated event");
            }
        }

        Ok(model_to_response(updated))
    }

    /// Deactivates a supplier. Existing orders and returns keep referencing
    /// it, but new documents can no longer be raised against it.
    #[instrument(skip(self))]
    pub async fn deactivate_supplier(
        &self,
        supplier_id: Uuid,
    ) -> Result<SupplierResponse, ServiceError> {
        let db = &*self.db_pool;

        let existing = SupplierEntity::find_by_id(supplier_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, supplier_id = %supplier_id, "Failed to fetch supplier for deactivation");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier with ID {} not found", supplier_id))
            })?;

        if !existing.active {
            return Ok(model_to_response(existing));
        }

        let mut active_model: supplier::ActiveModel = existing.into();
        active_model.active = Set(false);
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(db).await.map_err(|e| {
            error!(error = %e, supplier_id = %supplier_id, "Failed to deactivate supplier");
            ServiceError::DatabaseError(e)
        })?;

        info!(supplier_id = %updated.id, "Supplier deactivated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::SupplierDeactivated(updated.id))
                .await
            {
                warn!(error = %e, supplier_id = %updated.id, "Failed to send supplier deactivated event");
            }
        }

        Ok(model_to_response(updated))
    }
}

/// Converts a supplier model to response format
fn model_to_response(model: supplier::Model) -> SupplierResponse {
    SupplierResponse {
        id: model.id,
        name: model.name,
        contact_name: model.contact_name,
        email: model.email,
        phone: model.phone,
        address: model.address,
        payment_terms: model.payment_terms,
        active: model.active,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> supplier::Model {
        let now = Utc::now();
        supplier::Model {
            id: Uuid::new_v4(),
            name: "Acme Wholesale".to_string(),
            contact_name: Some("Jo Vance".to_string()),
            email: Some("jo@acme.example".to_string()),
            phone: Some("+1-555-0100".to_string()),
            address: Some("14 Dock Rd".to_string()),
            payment_terms: Some("NET30".to_string()),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn model_to_response_carries_all_fields() {
        let model = sample_model();
        let id = model.id;
        let response = model_to_response(model);

        assert_eq!(response.id, id);
        assert_eq!(response.name, "Acme Wholesale");
        assert_eq!(response.payment_terms.as_deref(), Some("NET30"));
        assert!(response.active);
    }

    #[test]
    fn create_request_rejects_empty_name() {
        let request = CreateSupplierRequest {
            name: String::new(),
            contact_name: None,
            email: None,
            phone: None,
            address: None,
            payment_terms: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_rejects_malformed_email() {
        let request = CreateSupplierRequest {
            name: "Acme".to_string(),
            contact_name: None,
            email: Some("not-an-email".to_string()),
            phone: None,
            address: None,
            payment_terms: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn update_request_allows_sparse_payloads() {
        let request = UpdateSupplierRequest {
            name: None,
            contact_name: None,
            email: None,
            phone: None,
            address: None,
            payment_terms: Some("NET45".to_string()),
        };
        assert!(request.validate().is_ok());
    }
}
