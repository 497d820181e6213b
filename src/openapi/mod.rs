use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockroom API",
        version = "0.3.0",
        description = r#"
# Stockroom Purchasing & Inventory API

An API for running the purchasing side of a point-of-sale back office: purchase orders
against suppliers, goods receiving into stock, supplier returns with per-line dispositions,
and printable invoices for received orders.

## Features

- **Purchase Orders**: Draft, send, receive, and bulk-update orders against suppliers
- **Goods Receiving**: Record received quantities per line and update stock on hand
- **Supplier Returns**: Full return lifecycle with accept / partial / reject / exchange decisions
- **Suppliers & Products**: Master data with activation flags and manual stock adjustments
- **Invoices**: HTML and PDF invoice documents for fully received orders

## Authentication

All `/api/v1` endpoints except `status` and `health` require a JWT issued by `/auth/login`:

```
Authorization: Bearer <access-token>
```

Access tokens are short-lived; exchange the refresh token at `/auth/refresh` for a new pair.

## Error Handling

Errors use a consistent shape with appropriate HTTP status codes:

```json
{
  "error": "Not Found",
  "message": "Purchase order with ID 550e8400-e29b-41d4-a716-446655440000 not found",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-12-09T10:30:00.000Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, capped by the server)
and respond with `items`, `total`, `page`, `limit`, and `total_pages`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Login, token refresh, and caller identity"),
        (name = "purchase-orders", description = "Purchase order lifecycle and receiving"),
        (name = "returns", description = "Supplier return lifecycle"),
        (name = "suppliers", description = "Supplier master data"),
        (name = "products", description = "Product master data and stock"),
        (name = "invoices", description = "Invoice documents for received orders")
    ),
    paths(
        // Auth
        crate::auth::login_handler,
        crate::auth::refresh_token_handler,
        crate::auth::me_handler,

        // Purchase orders
        crate::handlers::purchase_orders::list_purchase_orders,
        crate::handlers::purchase_orders::create_purchase_order,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::update_purchase_order,
        crate::handlers::purchase_orders::delete_purchase_order,
        crate::handlers::purchase_orders::update_order_status,
        crate::handlers::purchase_orders::receive_items,
        crate::handlers::purchase_orders::bulk_update_status,

        // Returns
        crate::handlers::returns::list_returns,
        crate::handlers::returns::create_return,
        crate::handlers::returns::get_return,
        crate::handlers::returns::submit_return,
        crate::handlers::returns::approve_return,
        crate::handlers::returns::reject_return,
        crate::handlers::returns::ship_return,
        crate::handlers::returns::receive_return,
        crate::handlers::returns::close_return,
        crate::handlers::returns::cancel_return,

        // Suppliers
        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::create_supplier,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::update_supplier,
        crate::handlers::suppliers::deactivate_supplier,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::list_low_stock,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::adjust_stock,

        // Invoices
        crate::handlers::invoices::invoice_html,
        crate::handlers::invoices::invoice_pdf,

        // Status and health endpoints are intentionally left out of the schema
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Auth types
            crate::auth::LoginRequest,
            crate::auth::RefreshTokenRequest,
            crate::auth::TokenPair,
            crate::auth::MeResponse,

            // Purchase order types
            crate::services::purchase_orders::CreatePurchaseOrderRequest,
            crate::services::purchase_orders::UpdatePurchaseOrderRequest,
            crate::services::purchase_orders::PurchaseOrderItemRequest,
            crate::services::purchase_orders::UpdateOrderStatusRequest,
            crate::services::purchase_orders::ReceiveItemLine,
            crate::services::purchase_orders::ReceiveItemsRequest,
            crate::services::purchase_orders::BulkStatusUpdateRequest,
            crate::services::purchase_orders::BulkStatusUpdateResponse,
            crate::services::purchase_orders::PurchaseOrderResponse,
            crate::services::purchase_orders::PurchaseOrderItemResponse,
            crate::services::purchase_orders::PurchaseOrderDetailResponse,

            // Return types
            crate::services::returns::CreateReturnRequest,
            crate::services::returns::ReturnItemRequest,
            crate::services::returns::RejectReturnRequest,
            crate::services::returns::CancelReturnRequest,
            crate::services::returns::ReturnItemDecision,
            crate::services::returns::ReceiveReturnRequest,
            crate::services::returns::ReturnResponse,
            crate::services::returns::ReturnItemResponse,
            crate::services::returns::ReturnDetailResponse,

            // Supplier types
            crate::services::suppliers::CreateSupplierRequest,
            crate::services::suppliers::UpdateSupplierRequest,
            crate::services::suppliers::SupplierResponse,

            // Product types
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,
            crate::services::products::AdjustStockRequest,
            crate::services::products::ProductResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        // components is always Some here because schemas are registered above
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Stockroom API"));
        assert!(json.contains("/api/v1/purchase-orders"));
        assert!(json.contains("/api/v1/returns/{id}/receive"));
        assert!(json.contains("bearer_auth"));
    }

    #[test]
    fn test_all_tags_are_used() {
        let openapi = ApiDocV1::openapi();
        let declared: Vec<String> = openapi
            .tags
            .iter()
            .flatten()
            .map(|t| t.name.clone())
            .collect();
        let json = serde_json::to_string(&openapi).unwrap();
        for tag in declared {
            assert!(
                json.contains(&format!("\"{}\"", tag)),
                "tag {} is declared but unused",
                tag
            );
        }
    }
}
