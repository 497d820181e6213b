use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permission as perm;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{clamp_pagination, total_pages, validation_messages};
use crate::services::purchase_orders::{
    BulkStatusUpdateRequest, BulkStatusUpdateResponse, CreatePurchaseOrderRequest,
    PurchaseOrderDetailResponse, PurchaseOrderFilter, PurchaseOrderResponse, ReceiveItemsRequest,
    UpdateOrderStatusRequest, UpdatePurchaseOrderRequest,
};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct PurchaseOrderListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub search: Option<String>,
}

/// List purchase orders with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    summary = "List purchase orders",
    description = "Get a paginated list of purchase orders, newest first",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("supplier_id" = Option<Uuid>, Query, description = "Filter by supplier"),
        ("search" = Option<String>, Query, description = "Match against order numbers"),
    ),
    responses(
        (status = 200, description = "Purchase orders retrieved successfully", body = ApiResponse<PaginatedResponse<PurchaseOrderResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(params): Query<PurchaseOrderListParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<PurchaseOrderResponse>>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read purchase orders".to_string(),
        ));
    }

    let (page, limit) = clamp_pagination(
        params.page.unwrap_or(1),
        params
            .limit
            .unwrap_or(state.config.api_default_page_size as u64),
        state.config.api_max_page_size as u64,
    );
    let filter = PurchaseOrderFilter {
        status: params.status,
        supplier_id: params.supplier_id,
        search: params.search,
    };

    let (items, total) = state
        .services
        .purchase_orders
        .list_purchase_orders(page, limit, filter)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// Create a new purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    summary = "Create purchase order",
    description = "Create a purchase order in pending status and allocate its order number",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Purchase order created successfully", body = ApiResponse<PurchaseOrderDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseOrderDetailResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    if let Err(validation_errors) = request.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(validation_messages(
                &validation_errors,
            ))),
        ));
    }

    let order = state
        .services
        .purchase_orders
        .create_purchase_order(request, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Get a purchase order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    summary = "Get purchase order",
    description = "Get a purchase order header with its lines and supplier context",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order retrieved successfully", body = ApiResponse<PurchaseOrderDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PurchaseOrderDetailResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read purchase orders".to_string(),
        ));
    }

    let order = state.services.purchase_orders.get_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Update a pending purchase order
#[utoipa::path(
    put,
    path = "/api/v1/purchase-orders/{id}",
    summary = "Update purchase order",
    description = "Edit a pending purchase order; replacing the items recomputes the totals",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = UpdatePurchaseOrderRequest,
    responses(
        (status = 200, description = "Purchase order updated successfully", body = ApiResponse<PurchaseOrderDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data or order is not pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn update_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseOrderDetailResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    if let Err(validation_errors) = request.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::validation_errors(validation_messages(
                &validation_errors,
            ))),
        ));
    }

    let order = state
        .services
        .purchase_orders
        .update_purchase_order(id, request)
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(order))))
}

/// Delete a pending purchase order
#[utoipa::path(
    delete,
    path = "/api/v1/purchase-orders/{id}",
    summary = "Delete purchase order",
    description = "Delete a purchase order that is still pending, together with its lines",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order deleted", body = ApiResponse<Value>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Order is no longer pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn delete_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    state
        .services
        .purchase_orders
        .delete_purchase_order(id)
        .await?;
    Ok(Json(ApiResponse::success(json!({
        "id": id,
        "deleted": true,
    }))))
}

/// Move a purchase order to a new status
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/status",
    summary = "Update order status",
    description = "Move a purchase order through its lifecycle; received is reached only by recording a delivery",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated successfully", body = ApiResponse<PurchaseOrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Unknown status or transition not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<PurchaseOrderResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    let order = state
        .services
        .purchase_orders
        .update_status(id, &request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Record a delivery against a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    summary = "Receive items",
    description = "Record delivered quantities per order line; a complete delivery marks the order received and assigns its invoice number",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = ReceiveItemsRequest,
    responses(
        (status = 200, description = "Delivery recorded successfully", body = ApiResponse<PurchaseOrderDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid delivery lines or order cannot take deliveries", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn receive_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ReceiveItemsRequest>,
) -> Result<Json<ApiResponse<PurchaseOrderDetailResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    let order = state
        .services
        .purchase_orders
        .receive_items(id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Update the status of several purchase orders at once
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/bulk-status",
    summary = "Bulk status update",
    description = "Apply one status change to several orders in a single transaction; any invalid order aborts the whole batch",
    request_body = BulkStatusUpdateRequest,
    responses(
        (status = 200, description = "Statuses updated successfully", body = ApiResponse<BulkStatusUpdateResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Unknown status or a transition was not allowed", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "An order in the batch was not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "purchase-orders"
)]
pub async fn bulk_update_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<BulkStatusUpdateRequest>,
) -> Result<Json<ApiResponse<BulkStatusUpdateResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::PURCHASEORDERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage purchase orders".to_string(),
        ));
    }

    let result = state
        .services
        .purchase_orders
        .bulk_update_status(request)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
