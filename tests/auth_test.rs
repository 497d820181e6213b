//! End-to-end tests for authentication and authorization: the login and
//! refresh flows, token validation failures, role-based permission gates,
//! and the invoice endpoints that sit behind them.

mod common;

use axum::http::{header, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::json;
use uuid::Uuid;

use stockroom_api::auth::Claims;
use stockroom_api::entities::user;

use common::{
    expect_success_data, purchase_order_body, response_bytes, response_json, seed_user,
    test_password, TestApp,
};

/// Signs a token with the same claim layout the service issues, so a test
/// can vary exactly one property (key, expiry) and keep the rest valid.
fn craft_token(app: &TestApp, secret: &str, issued_at: i64, expires_at: i64) -> String {
    let claims = Claims {
        sub: app.admin_id.to_string(),
        username: Some("admin".to_string()),
        email: None,
        roles: vec!["admin".to_string()],
        permissions: vec!["*".to_string()],
        jti: Uuid::new_v4().to_string(),
        iat: issued_at,
        exp: expires_at,
        nbf: issued_at,
        iss: app.auth_service.config.jwt_issuer.clone(),
        aud: app.auth_service.config.jwt_audience.clone(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign crafted token")
}

// ==================== Login Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn login_returns_a_usable_bearer_pair() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": test_password() }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The token pair is returned directly, without the list/detail envelope.
    let pair = response_json(response).await;
    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["expires_in"], 3600);
    assert_eq!(pair["refresh_expires_in"], 86_400);
    let access = pair["access_token"]
        .as_str()
        .expect("access token")
        .to_string();

    let me = app.get("/auth/me", Some(&access)).await;
    assert_eq!(me.status(), StatusCode::OK);
    let principal = response_json(me).await;
    assert_eq!(principal["id"], app.admin_id.to_string());
    assert_eq!(principal["username"], "admin");
    assert_eq!(principal["roles"], json!(["admin"]));
    assert_eq!(principal["permissions"], json!(["*"]));
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn login_rejects_bad_and_inactive_credentials_alike() {
    let app = TestApp::spawn().await;
    seed_user(
        &app.state.db,
        "gate_left",
        "gate.left@example.com",
        "clerk",
        false,
    )
    .await;

    // Wrong password, unknown username, and a deactivated account all
    // produce the same answer, so none of them can be probed apart.
    for body in [
        json!({ "username": "admin", "password": "not-the-password" }),
        json!({ "username": "nobody", "password": test_password() }),
        json!({ "username": "gate_left", "password": test_password() }),
    ] {
        let response = app.post("/auth/login", None, body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let payload = response_json(response).await;
        assert_eq!(payload["error"]["code"], "AUTH_INVALID_CREDENTIALS");
    }

    // A blank username is a validation problem, not an auth one.
    let response = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "   ", "password": test_password() }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_VALIDATION");
}

// ==================== Refresh Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn refresh_rotates_the_pair() {
    let app = TestApp::spawn().await;

    let login = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": test_password() }),
        )
        .await;
    let pair = response_json(login).await;
    let refresh_token = pair["refresh_token"]
        .as_str()
        .expect("refresh token")
        .to_string();

    let response = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = response_json(response).await;
    assert_eq!(rotated["token_type"], "Bearer");
    let access = rotated["access_token"]
        .as_str()
        .expect("rotated access token")
        .to_string();

    let me = app.get("/auth/me", Some(&access)).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(response_json(me).await["username"], "admin");

    let response = app
        .post("/auth/refresh", None, json!({ "refresh_token": "not-a-jwt" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn refresh_stops_once_the_account_is_deactivated() {
    let app = TestApp::spawn().await;
    let account = seed_user(
        &app.state.db,
        "seasonal_temp",
        "seasonal.temp@example.com",
        "clerk",
        true,
    )
    .await;

    let login = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "seasonal_temp", "password": test_password() }),
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let refresh_token = response_json(login).await["refresh_token"]
        .as_str()
        .expect("refresh token")
        .to_string();

    let mut record: user::ActiveModel = account.into();
    record.active = Set(false);
    record
        .update(&*app.state.db)
        .await
        .expect("deactivate account");

    // The refresh token is still validly signed but the account check fails.
    let response = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_USER_INACTIVE");
}

// ==================== Token Validation Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn protected_routes_reject_missing_and_forged_tokens() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/v1/purchase-orders", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_MISSING");

    let response = app
        .get("/api/v1/purchase-orders", Some("this-is-not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_INVALID_TOKEN");

    let now = Utc::now().timestamp();
    let forged = craft_token(&app, "some-other-signing-secret", now, now + 3600);
    let response = app.get("/api/v1/purchase-orders", Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn expired_tokens_are_reported_as_expired() {
    let app = TestApp::spawn().await;
    let now = Utc::now().timestamp();
    let signing_secret = app.auth_service.config.jwt_secret.clone();

    // Same key and claims with a future expiry pass, so the rejection
    // below can only come from the expiry check.
    let valid = craft_token(&app, &signing_secret, now, now + 3600);
    let response = app.get("/api/v1/purchase-orders", Some(&valid)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let expired = craft_token(&app, &signing_secret, now - 7200, now - 3600);
    let response = app.get("/api/v1/purchase-orders", Some(&expired)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_TOKEN_EXPIRED");
}

// ==================== Permission Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn write_access_follows_role_permissions() {
    let app = TestApp::spawn().await;
    let viewer = app.token_for_role("perm_viewer", "viewer").await;
    let clerk = app.token_for_role("perm_clerk", "clerk").await;
    let manager = app.token_for_role("perm_manager", "manager").await;

    // Viewers read suppliers but cannot create them.
    let response = app.get("/api/v1/suppliers", Some(&viewer)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .post(
            "/api/v1/suppliers",
            Some(&viewer),
            json!({ "name": "Harborside Supply" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = response_json(response).await;
    assert_eq!(payload["error"]["code"], "AUTH_INSUFFICIENT_PERMISSIONS");

    // Clerks cannot manage suppliers either, but they do hold stock:adjust.
    let response = app
        .post(
            "/api/v1/suppliers",
            Some(&clerk),
            json!({ "name": "Harborside Supply" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let product = app.seed_product("CBL-0091", "Drum cable 25m", 10).await;
    let response = app
        .post(
            &format!("/api/v1/products/{}/adjust-stock", product.id),
            Some(&clerk),
            json!({ "delta": -2, "reason": "cycle count correction" }),
        )
        .await;
    let adjusted = expect_success_data(response, StatusCode::OK).await;
    assert_eq!(adjusted["stock_quantity"], 8);

    // Managers carry the supplier wildcard.
    let response = app
        .post(
            "/api/v1/suppliers",
            Some(&manager),
            json!({ "name": "Harborside Supply" }),
        )
        .await;
    let created = expect_success_data(response, StatusCode::CREATED).await;
    assert_eq!(created["name"], "Harborside Supply");
    assert_eq!(created["active"], true);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn status_and_health_probes_need_no_token() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/v1/status", None).await;
    let status = expect_success_data(response, StatusCode::OK).await;
    assert_eq!(status["status"], "ok");
    assert_eq!(status["service"], "stockroom-api");

    let response = app.get("/api/v1/health", None).await;
    let health = expect_success_data(response, StatusCode::OK).await;
    assert_eq!(health["checks"]["database"], "healthy");
}

// ==================== Invoice Endpoint Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn invoices_require_a_fully_received_order() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Gateway Fasteners").await;
    let product = app.seed_product("BLT-0440", "M8 bolt, box of 100", 50).await;

    let order = expect_success_data(
        app.post(
            "/api/v1/purchase-orders",
            Some(&app.admin_token),
            purchase_order_body(supplier.id, product.id, 4),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let order_id = order["id"].as_str().expect("order id").to_string();

    // Still pending, so there is nothing to invoice yet.
    let response = app
        .get(
            &format!("/api/v1/purchase-orders/{}/invoice", order_id),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(
            &format!("/api/v1/purchase-orders/{}/invoice", Uuid::new_v4()),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn received_orders_serve_html_and_pdf_invoices() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Meridian Packaging").await;
    let product = app.seed_product("TAP-2210", "Packing tape 48mm", 0).await;

    let order = expect_success_data(
        app.post(
            "/api/v1/purchase-orders",
            Some(&app.admin_token),
            purchase_order_body(supplier.id, product.id, 6),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let order_id = order["id"].as_str().expect("order id").to_string();
    let item_id = order["items"][0]["id"].as_str().expect("item id").to_string();

    expect_success_data(
        app.post(
            &format!("/api/v1/purchase-orders/{}/status", order_id),
            Some(&app.admin_token),
            json!({ "status": "sent" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let received = expect_success_data(
        app.post(
            &format!("/api/v1/purchase-orders/{}/receive", order_id),
            Some(&app.admin_token),
            json!({ "items": [ { "item_id": item_id, "quantity": 6 } ] }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let invoice_number = received["invoice_number"]
        .as_str()
        .expect("invoice number")
        .to_string();

    let response = app
        .get(
            &format!("/api/v1/purchase-orders/{}/invoice", order_id),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/html; charset=utf-8")
    );
    let html = String::from_utf8(response_bytes(response).await).expect("utf-8 html");
    assert!(html.contains(&invoice_number));
    assert!(html.contains("Meridian Packaging"));
    assert!(html.contains("Stockroom"));
    assert!(html.contains("Tax (8%)"));

    // The PDF is served inline by default.
    let response = app
        .get(
            &format!("/api/v1/purchase-orders/{}/invoice/pdf", order_id),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("application/pdf")
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok()),
        Some("inline")
    );
    let pdf = response_bytes(response).await;
    assert!(pdf.starts_with(b"%PDF"));

    // and as a named attachment on request.
    let response = app
        .get(
            &format!(
                "/api/v1/purchase-orders/{}/invoice/pdf?download=true",
                order_id
            ),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let expected_disposition = format!("attachment; filename=\"{}.pdf\"", invoice_number);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok()),
        Some(expected_disposition.as_str())
    );

    // invoices:read alone is enough to view the rendered invoice.
    let viewer = app.token_for_role("invoice_viewer", "viewer").await;
    let response = app
        .get(
            &format!("/api/v1/purchase-orders/{}/invoice", order_id),
            Some(&viewer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
