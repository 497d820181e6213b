use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::permission as perm;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::{clamp_pagination, total_pages, validation_messages};
use crate::services::products::{
    AdjustStockRequest, CreateProductRequest, ProductFilter, ProductResponse,
    UpdateProductRequest,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// List products with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Get a paginated list of products with optional filtering",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("search" = Option<String>, Query, description = "Match against SKU or product name"),
        ("active" = Option<bool>, Query, description = "Filter by active flag"),
    ),
    responses(
        (status = 200, description = "Products retrieved successfully", body = ApiResponse<PaginatedResponse<ProductResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    if !auth_user.has_permission(perm::PRODUCTS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read products".to_string(),
        ));
    }

    let (page, limit) = clamp_pagination(
        params.page.unwrap_or(1),
        params
            .limit
            .unwrap_or(state.config.api_default_page_size as u64),
        state.config.api_max_page_size as u64,
    );
    let filter = ProductFilter {
        search: params.search,
        active: params.active,
    };

    let (items, total) = state
        .services
        .products
        .list_products(page, limit, filter)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// List products at or below their minimum stock level
#[utoipa::path(
    get,
    path = "/api/v1/products/low-stock",
    summary = "List low-stock products",
    description = "Get active products whose stock is at or below the minimum stock level",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Low-stock products retrieved successfully", body = ApiResponse<PaginatedResponse<ProductResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    if !auth_user.has_permission(perm::PRODUCTS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read products".to_string(),
        ));
    }

    let (page, limit) = clamp_pagination(
        query.page,
        query.limit,
        state.config.api_max_page_size as u64,
    );
    let (items, total) = state.services.products.list_low_stock(page, limit).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    description = "Register a new product with its opening stock",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created successfully", body = ApiResponse<ProductResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::PRODUCTS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage products".to_string(),
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

    let product = state.services.products.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    description = "Get a single product by its ID",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved successfully", body = ApiResponse<ProductResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::PRODUCTS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read products".to_string(),
        ));
    }

    let product = state.services.products.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    summary = "Update product",
    description = "Update product details; the SKU is immutable and stock moves only through deliveries, returns, and adjustments",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated successfully", body = ApiResponse<ProductResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::PRODUCTS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage products".to_string(),
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

    let product = state.services.products.update_product(id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(product))))
}

/// Adjust product stock by a signed delta
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/adjust-stock",
    summary = "Adjust stock",
    description = "Apply a signed stock correction with an audit reason; stock cannot go below zero",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted successfully", body = ApiResponse<ProductResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Adjustment would make stock negative", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<AdjustStockRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::STOCK_ADJUST) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to adjust stock".to_string(),
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

    let product = state.services.products.adjust_stock(id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(product))))
}
