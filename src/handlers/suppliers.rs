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
use crate::services::suppliers::{
    CreateSupplierRequest, SupplierFilter, SupplierResponse, UpdateSupplierRequest,
};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct SupplierListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// List suppliers with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/suppliers",
    summary = "List suppliers",
    description = "Get a paginated list of suppliers, ordered by name",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("search" = Option<String>, Query, description = "Match against supplier names"),
        ("active" = Option<bool>, Query, description = "Filter by active flag"),
    ),
    responses(
        (status = 200, description = "Suppliers retrieved successfully", body = ApiResponse<PaginatedResponse<SupplierResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(params): Query<SupplierListParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<SupplierResponse>>>, ServiceError> {
    if !auth_user.has_permission(perm::SUPPLIERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read suppliers".to_string(),
        ));
    }

    let (page, limit) = clamp_pagination(
        params.page.unwrap_or(1),
        params
            .limit
            .unwrap_or(state.config.api_default_page_size as u64),
        state.config.api_max_page_size as u64,
    );
    let filter = SupplierFilter {
        search: params.search,
        active: params.active,
    };

    let (items, total) = state
        .services
        .suppliers
        .list_suppliers(page, limit, filter)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// Create a new supplier
#[utoipa::path(
    post,
    path = "/api/v1/suppliers",
    summary = "Create supplier",
    description = "Register a new supplier",
    request_body = CreateSupplierRequest,
    responses(
        (status = 201, description = "Supplier created successfully", body = ApiResponse<SupplierResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Supplier name already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateSupplierRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SupplierResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::SUPPLIERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage suppliers".to_string(),
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

    let supplier = state.services.suppliers.create_supplier(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(supplier))))
}

/// Get a supplier by ID
#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}",
    summary = "Get supplier",
    description = "Get a single supplier by its ID",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier retrieved successfully", body = ApiResponse<SupplierResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<SupplierResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::SUPPLIERS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read suppliers".to_string(),
        ));
    }

    let supplier = state.services.suppliers.get_supplier(id).await?;
    Ok(Json(ApiResponse::success(supplier)))
}

/// Update a supplier
#[utoipa::path(
    put,
    path = "/api/v1/suppliers/{id}",
    summary = "Update supplier",
    description = "Update supplier contact details; omitted fields are left unchanged",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    request_body = UpdateSupplierRequest,
    responses(
        (status = 200, description = "Supplier updated successfully", body = ApiResponse<SupplierResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Supplier name already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateSupplierRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SupplierResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::SUPPLIERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage suppliers".to_string(),
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

    let supplier = state
        .services
        .suppliers
        .update_supplier(id, request)
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(supplier))))
}

/// Deactivate a supplier
#[utoipa::path(
    delete,
    path = "/api/v1/suppliers/{id}",
    summary = "Deactivate supplier",
    description = "Deactivate a supplier so it can no longer take orders; history is preserved",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier deactivated", body = ApiResponse<SupplierResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn deactivate_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<SupplierResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::SUPPLIERS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage suppliers".to_string(),
        ));
    }

    let supplier = state.services.suppliers.deactivate_supplier(id).await?;
    Ok(Json(ApiResponse::success(supplier)))
}
