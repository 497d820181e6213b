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
use crate::services::returns::{
    CancelReturnRequest, CreateReturnRequest, ReceiveReturnRequest, RejectReturnRequest,
    ReturnDetailResponse, ReturnFilter, ReturnResponse,
};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize)]
pub struct ReturnListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

/// List supplier returns with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/returns",
    summary = "List returns",
    description = "Get a paginated list of supplier returns, newest first",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by return status"),
        ("supplier_id" = Option<Uuid>, Query, description = "Filter by supplier"),
        ("order_id" = Option<Uuid>, Query, description = "Filter by originating purchase order"),
    ),
    responses(
        (status = 200, description = "Returns retrieved successfully", body = ApiResponse<PaginatedResponse<ReturnResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    Query(params): Query<ReturnListParams>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<ReturnResponse>>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read returns".to_string(),
        ));
    }

    let (page, limit) = clamp_pagination(
        params.page.unwrap_or(1),
        params
            .limit
            .unwrap_or(state.config.api_default_page_size as u64),
        state.config.api_max_page_size as u64,
    );
    let filter = ReturnFilter {
        status: params.status,
        supplier_id: params.supplier_id,
        order_id: params.order_id,
    };

    let (items, total) = state
        .services
        .returns
        .list_returns(page, limit, filter)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// Create a new supplier return
#[utoipa::path(
    post,
    path = "/api/v1/returns",
    summary = "Create return",
    description = "Create a supplier return in draft status and allocate its return number",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return created successfully", body = ApiResponse<ReturnDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier or order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnDetailResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
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

    let ret = state
        .services
        .returns
        .create_return(request, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(ret))))
}

/// Get a supplier return with its lines
#[utoipa::path(
    get,
    path = "/api/v1/returns/{id}",
    summary = "Get return",
    description = "Get a supplier return header with its lines and supplier context",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return retrieved successfully", body = ApiResponse<ReturnDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReturnDetailResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read returns".to_string(),
        ));
    }

    let ret = state.services.returns.get_return(id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Submit a draft return for approval
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/submit",
    summary = "Submit return",
    description = "Move a draft return to pending so it can be approved",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return submitted", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Return is not in draft status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn submit_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let ret = state.services.returns.submit_return(id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Approve a pending return
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/approve",
    summary = "Approve return",
    description = "Approve a pending return so the goods can be shipped back",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return approved", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Return is not in pending status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn approve_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let ret = state.services.returns.approve_return(id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Reject a pending return
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/reject",
    summary = "Reject return",
    description = "Reject a pending return, which cancels it and records the rejection reason",
    params(("id" = Uuid, Path, description = "Return ID")),
    request_body = RejectReturnRequest,
    responses(
        (status = 200, description = "Return rejected", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Missing reason or return is not pending", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn reject_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<RejectReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnResponse>>), ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
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

    let ret = state.services.returns.reject_return(id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(ret))))
}

/// Ship an approved return to the supplier
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/ship",
    summary = "Ship return",
    description = "Mark an approved return as shipped and remove the returned quantities from stock",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return shipped", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Return is not approved", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock on hand to ship", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn ship_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let ret = state.services.returns.ship_return(id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Record the supplier's response to a shipped return
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/receive",
    summary = "Receive return response",
    description = "Record the supplier's decision for every line; rejected and exchanged quantities come back into stock",
    params(("id" = Uuid, Path, description = "Return ID")),
    request_body = ReceiveReturnRequest,
    responses(
        (status = 200, description = "Supplier response recorded", body = ApiResponse<ReturnDetailResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Invalid decisions or return is not shipped", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn receive_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ReceiveReturnRequest>,
) -> Result<Json<ApiResponse<ReturnDetailResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let ret = state.services.returns.receive_return(id, request).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Close a received return
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/close",
    summary = "Close return",
    description = "Close a received return; it completes with a supplier credit when any quantity was accepted, otherwise it closes as cancelled",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return closed", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Return is not received", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn close_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let ret = state.services.returns.close_return(id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

/// Cancel a return before goods have moved
#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/cancel",
    summary = "Cancel return",
    description = "Cancel a return that is still in draft, pending, or approved status",
    params(("id" = Uuid, Path, description = "Return ID")),
    request_body = CancelReturnRequest,
    responses(
        (status = 200, description = "Return cancelled", body = ApiResponse<ReturnResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))),
        (status = 400, description = "Return can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "returns"
)]
pub async fn cancel_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    request: Option<Json<CancelReturnRequest>>,
) -> Result<Json<ApiResponse<ReturnResponse>>, ServiceError> {
    if !auth_user.has_permission(perm::RETURNS_MANAGE) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to manage returns".to_string(),
        ));
    }

    let request = request.map(|Json(r)| r).unwrap_or_default();
    let ret = state.services.returns.cancel_return(id, request).await?;
    Ok(Json(ApiResponse::success(ret)))
}
