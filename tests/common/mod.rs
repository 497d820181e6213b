//! Shared harness for integration tests.
//!
//! Boots the full application router against a throwaway SQLite database
//! with migrations applied, a running event loop, and seeded user accounts
//! for each role. Requests are driven through `tower::ServiceExt::oneshot`
//! so no TCP listener is needed.

// Each test binary uses its own slice of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

use stockroom_api::auth::{AuthConfig, AuthService};
use stockroom_api::config::AppConfig;
use stockroom_api::db::{establish_connection_from_app_config, run_migrations};
use stockroom_api::entities::user;
use stockroom_api::events::{process_events, EventSender};
use stockroom_api::handlers::AppServices;
use stockroom_api::services::products::{CreateProductRequest, ProductResponse};
use stockroom_api::services::suppliers::{CreateSupplierRequest, SupplierResponse};
use stockroom_api::AppState;

/// Signing secret for test tokens. Long and varied on purpose so the same
/// value would also satisfy production configuration validation.
const TEST_JWT_SECRET: &str =
    "integration-harness-hmac-secret-0x7f3a9c41e8b2d605-keep-out-of-prod-builds";

/// Fully wired application under test.
///
/// Dropping the harness aborts the background event loop; the SQLite file
/// lives in a temp directory that is removed along with it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub auth_service: Arc<AuthService>,
    /// Bearer token for the seeded `admin` account.
    pub admin_token: String,
    pub admin_id: Uuid,
    event_task: JoinHandle<()>,
    _db_dir: TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

impl TestApp {
    /// Builds the application against a fresh SQLite database and seeds an
    /// `admin` user whose token is ready to use.
    pub async fn spawn() -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for sqlite database");
        let db_path = db_dir.path().join("stockroom-test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut config = AppConfig::new(
            database_url,
            TEST_JWT_SECRET.to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // A single connection keeps SQLite happy under concurrent handlers.
        config.db_max_connections = 1;
        config.db_min_connections = 1;

        let db = establish_connection_from_app_config(&config)
            .await
            .expect("connect to test database");
        run_migrations(&db).await.expect("apply migrations");
        let db = Arc::new(db);

        let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&config),
            db.clone(),
            Some(Arc::new(event_sender.clone())),
        ));

        let default_tax_rate =
            Decimal::try_from(config.default_tax_rate).expect("representable tax rate");
        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            default_tax_rate,
            config.company.clone(),
            config.default_currency.clone(),
        );

        let state = AppState {
            db: db.clone(),
            config,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", stockroom_api::api_v1_routes())
            .nest(
                "/auth",
                stockroom_api::auth::auth_routes().with_state(auth_service.clone()),
            )
            .layer(axum::middleware::from_fn_with_state(
                auth_service.clone(),
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: axum::extract::Request,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .layer(axum::middleware::from_fn(
                stockroom_api::middleware_helpers::request_id::request_id_middleware,
            ))
            .with_state(state.clone());

        let admin = seed_user(&db, "admin", "admin@stockroom.test", "admin", true).await;
        let admin_token = mint_token(&auth_service, &admin);

        Self {
            router,
            state,
            auth_service,
            admin_token,
            admin_id: admin.id,
            event_task,
            _db_dir: db_dir,
        }
    }

    /// Issues a request against the in-process router.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&value).expect("serializable request body"),
                ))
                .expect("valid request"),
            None => builder.body(Body::empty()).expect("valid request"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router handled request")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        self.request(Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.request(Method::POST, path, token, Some(body)).await
    }

    /// POST without a body, used by the workflow action endpoints.
    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Response {
        self.request(Method::POST, path, token, None).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        self.request(Method::PUT, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Response {
        self.request(Method::DELETE, path, token, None).await
    }

    /// Seeds a user with the given role and returns a bearer token for it.
    pub async fn token_for_role(&self, username: &str, role: &str) -> String {
        let account = seed_user(
            &self.state.db,
            username,
            &format!("{}@stockroom.test", username),
            role,
            true,
        )
        .await;
        mint_token(&self.auth_service, &account)
    }

    /// Seeds a supplier directly through the service layer.
    pub async fn seed_supplier(&self, name: &str) -> SupplierResponse {
        self.state
            .services
            .suppliers
            .create_supplier(CreateSupplierRequest {
                name: name.to_string(),
                contact_name: Some("Dispatch Desk".to_string()),
                email: Some(format!(
                    "orders@{}.example.com",
                    name.to_lowercase().replace(' ', "-")
                )),
                phone: None,
                address: Some("4 Depot Road".to_string()),
                payment_terms: Some("net 30".to_string()),
            })
            .await
            .expect("seed supplier")
    }

    /// Seeds a product with the given opening stock.
    pub async fn seed_product(&self, sku: &str, name: &str, stock: i32) -> ProductResponse {
        self.state
            .services
            .products
            .create_product(CreateProductRequest {
                sku: sku.to_string(),
                name: name.to_string(),
                description: None,
                cost_price: dec!(4.50),
                sale_price: dec!(9.99),
                stock_quantity: stock,
                min_stock_level: 5,
            })
            .await
            .expect("seed product")
    }
}

/// Inserts a user row with a real Argon2 hash of [`test_password`].
pub async fn seed_user(
    db: &sea_orm::DatabaseConnection,
    username: &str,
    email: &str,
    role: &str,
    active: bool,
) -> user::Model {
    let now = Utc::now();
    let account = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(AuthService::hash_password(test_password()).expect("hash password")),
        role: Set(role.to_string()),
        active: Set(active),
        created_at: Set(now),
        updated_at: Set(now),
    };
    account.insert(db).await.expect("insert user")
}

/// Password shared by every seeded account.
pub fn test_password() -> &'static str {
    "correct-horse-battery-staple-41"
}

pub fn mint_token(auth_service: &AuthService, account: &user::Model) -> String {
    auth_service
        .generate_token(account)
        .expect("mint token")
        .access_token
}

/// Reads the response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Reads the response body as raw bytes, for the document endpoints.
pub async fn response_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

/// Asserts the standard envelope and returns its `data` field.
pub async fn expect_success_data(response: Response, expected_status: StatusCode) -> Value {
    assert_eq!(response.status(), expected_status);
    let payload = response_json(response).await;
    assert_eq!(
        payload["success"], true,
        "expected success envelope, got {}",
        payload
    );
    payload["data"].clone()
}

/// Convenience body for a one-line purchase order.
pub fn purchase_order_body(supplier_id: Uuid, product_id: Uuid, quantity: i32) -> Value {
    json!({
        "supplier_id": supplier_id,
        "items": [
            { "product_id": product_id, "quantity": quantity, "unit_cost": "4.50" }
        ]
    })
}
