use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::permission as perm;
use crate::auth::AuthUser;
use crate::documents::{invoice_filename, render_invoice_html, render_invoice_pdf};
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct InvoiceDownloadParams {
    /// Serve the PDF as a download instead of inline
    pub download: Option<bool>,
}

/// Render the invoice for a received purchase order as printable HTML
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/invoice",
    summary = "Invoice (HTML)",
    description = "Render the invoice of a fully received purchase order as a printable HTML page",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Invoice rendered", content_type = "text/html"),
        (status = 400, description = "Order is not fully received", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn invoice_html(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    if !auth_user.has_permission(perm::INVOICES_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read invoices".to_string(),
        ));
    }

    let invoice = state.services.invoices.invoice_data(id).await?;
    let html = render_invoice_html(&invoice);

    let mut response = Response::new(html.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Ok(response)
}

/// Render the invoice for a received purchase order as a PDF document
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/invoice/pdf",
    summary = "Invoice (PDF)",
    description = "Render the invoice of a fully received purchase order as a PDF, inline by default or as a download with ?download=true",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID"),
        ("download" = Option<bool>, Query, description = "Serve as attachment instead of inline"),
    ),
    responses(
        (status = 200, description = "Invoice rendered", content_type = "application/pdf"),
        (status = 400, description = "Order is not fully received", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "invoices"
)]
pub async fn invoice_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<InvoiceDownloadParams>,
    auth_user: AuthUser,
) -> Result<Response, ServiceError> {
    if !auth_user.has_permission(perm::INVOICES_READ) {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions to read invoices".to_string(),
        ));
    }

    let invoice = state.services.invoices.invoice_data(id).await?;
    let pdf = render_invoice_pdf(&invoice)?;

    let disposition = if params.download.unwrap_or(false) {
        format!(
            "attachment; filename=\"{}\"",
            invoice_filename(&invoice.invoice_number)
        )
    } else {
        "inline".to_string()
    };
    let disposition = HeaderValue::from_str(&disposition).map_err(|e| {
        ServiceError::InternalError(format!("Invalid content disposition header: {}", e))
    })?;

    let mut response = Response::new(pdf.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
