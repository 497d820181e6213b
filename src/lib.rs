//! Stockroom API Library
//!
//! This crate provides the core functionality for the Stockroom purchasing
//! and inventory API: purchase orders, goods receiving, supplier returns,
//! master data, and invoice documents.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::permission as perm;
use crate::auth::AuthRouterExt;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// API routes with per-group permission gating. Everything except /status and
// /health requires a valid token plus the group's permission.
pub fn api_v1_routes() -> Router<AppState> {
    // Purchase order routes
    let purchase_orders_read = Router::new()
        .route(
            "/purchase-orders",
            get(handlers::purchase_orders::list_purchase_orders),
        )
        .route(
            "/purchase-orders/:id",
            get(handlers::purchase_orders::get_purchase_order),
        )
        .with_permission(perm::PURCHASEORDERS_READ);

    let purchase_orders_manage = Router::new()
        .route(
            "/purchase-orders",
            axum::routing::post(handlers::purchase_orders::create_purchase_order),
        )
        .route(
            "/purchase-orders/:id",
            axum::routing::put(handlers::purchase_orders::update_purchase_order),
        )
        .route(
            "/purchase-orders/:id",
            axum::routing::delete(handlers::purchase_orders::delete_purchase_order),
        )
        .route(
            "/purchase-orders/:id/status",
            axum::routing::post(handlers::purchase_orders::update_order_status),
        )
        .route(
            "/purchase-orders/:id/receive",
            axum::routing::post(handlers::purchase_orders::receive_items),
        )
        .route(
            "/purchase-orders/bulk-status",
            axum::routing::post(handlers::purchase_orders::bulk_update_status),
        )
        .with_permission(perm::PURCHASEORDERS_MANAGE);

    // Invoice documents for received orders
    let invoices_read = Router::new()
        .route(
            "/purchase-orders/:id/invoice",
            get(handlers::invoices::invoice_html),
        )
        .route(
            "/purchase-orders/:id/invoice/pdf",
            get(handlers::invoices::invoice_pdf),
        )
        .with_permission(perm::INVOICES_READ);

    // Supplier return routes
    let returns_read = Router::new()
        .route("/returns", get(handlers::returns::list_returns))
        .route("/returns/:id", get(handlers::returns::get_return))
        .with_permission(perm::RETURNS_READ);

    let returns_manage = Router::new()
        .route(
            "/returns",
            axum::routing::post(handlers::returns::create_return),
        )
        .route(
            "/returns/:id/submit",
            axum::routing::post(handlers::returns::submit_return),
        )
        .route(
            "/returns/:id/approve",
            axum::routing::post(handlers::returns::approve_return),
        )
        .route(
            "/returns/:id/reject",
            axum::routing::post(handlers::returns::reject_return),
        )
        .route(
            "/returns/:id/ship",
            axum::routing::post(handlers::returns::ship_return),
        )
        .route(
            "/returns/:id/receive",
            axum::routing::post(handlers::returns::receive_return),
        )
        .route(
            "/returns/:id/close",
            axum::routing::post(handlers::returns::close_return),
        )
        .route(
            "/returns/:id/cancel",
            axum::routing::post(handlers::returns::cancel_return),
        )
        .with_permission(perm::RETURNS_MANAGE);

    // Supplier master data routes
    let suppliers_read = Router::new()
        .route("/suppliers", get(handlers::suppliers::list_suppliers))
        .route("/suppliers/:id", get(handlers::suppliers::get_supplier))
        .with_permission(perm::SUPPLIERS_READ);

    let suppliers_manage = Router::new()
        .route(
            "/suppliers",
            axum::routing::post(handlers::suppliers::create_supplier),
        )
        .route(
            "/suppliers/:id",
            axum::routing::put(handlers::suppliers::update_supplier),
        )
        .route(
            "/suppliers/:id",
            axum::routing::delete(handlers::suppliers::deactivate_supplier),
        )
        .with_permission(perm::SUPPLIERS_MANAGE);

    // Product master data routes
    let products_read = Router::new()
        .route("/products", get(handlers::products::list_products))
        .route(
            "/products/low-stock",
            get(handlers::products::list_low_stock),
        )
        .route("/products/:id", get(handlers::products::get_product))
        .with_permission(perm::PRODUCTS_READ);

    let products_manage = Router::new()
        .route(
            "/products",
            axum::routing::post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            axum::routing::put(handlers::products::update_product),
        )
        .with_permission(perm::PRODUCTS_MANAGE);

    let stock_adjust = Router::new()
        .route(
            "/products/:id/adjust-stock",
            axum::routing::post(handlers::products::adjust_stock),
        )
        .with_permission(perm::STOCK_ADJUST);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Purchase orders API (auth + permissions)
        .merge(purchase_orders_read)
        .merge(purchase_orders_manage)
        .merge(invoices_read)
        // Returns API (auth + permissions)
        .merge(returns_read)
        .merge(returns_manage)
        // Suppliers API (auth + permissions)
        .merge(suppliers_read)
        .merge(suppliers_manage)
        // Products API (auth + permissions)
        .merge(products_read)
        .merge(products_manage)
        .merge(stock_adjust)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "stockroom-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_response_includes_metadata() {
        let response = crate::tracing::scope_request_id(
            crate::tracing::RequestId::new("meta-validation"),
            async { ApiResponse::<()>::validation_errors(vec!["missing".into()]) },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn list_query_defaults_apply() {
        let query: ListQuery = serde_json::from_str("{}").expect("empty query should parse");
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
    }
}
