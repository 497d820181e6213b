//! End-to-end tests for the supplier return lifecycle: draft, submission,
//! approval, shipping, the per-line supplier response, and closing with a
//! credit.

mod common;

use axum::http::StatusCode;
use chrono::{Datelike, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{expect_success_data, purchase_order_body, response_json, TestApp};

fn return_body(supplier_id: Uuid, product_id: Uuid, quantity: i32) -> serde_json::Value {
    json!({
        "supplier_id": supplier_id,
        "reason": "damaged in transit",
        "items": [ { "product_id": product_id, "quantity": quantity } ]
    })
}

// ==================== Creation Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn create_allocates_return_number_and_defaults_unit_cost() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-100", "Softwood Plank", 10).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 4),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let expected_number = format!("SR-{}-000001", Utc::now().year());
    assert_eq!(created["return_number"], expected_number.as_str());
    assert_eq!(created["status"], "draft");
    assert_eq!(created["item_count"], 1);
    assert_eq!(created["total_quantity"], 4);
    // Unit cost falls back to the product cost price (4.50).
    assert_eq!(created["total_value"], "18.00");
    assert!(created["credit_amount"].is_null());
    assert_eq!(created["items"][0]["status"], "pending");
    assert_eq!(created["items"][0]["accepted_quantity"], 0);

    // Creating a draft moves no stock.
    let stocked = expect_success_data(
        app.get(
            &format!("/api/v1/products/{}", product.id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(stocked["stock_quantity"], 10);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn create_validates_supplier_order_and_items() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let other_supplier = app.seed_supplier("Acme Packaging").await;
    let product = app.seed_product("PLK-101", "Plank", 10).await;

    let response = app
        .post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(Uuid::new_v4(), product.id, 1),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The referenced order must belong to the same supplier.
    let order = expect_success_data(
        app.post(
            "/api/v1/purchase-orders",
            Some(&app.admin_token),
            purchase_order_body(other_supplier.id, product.id, 5),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let response = app
        .post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({
                "supplier_id": supplier.id,
                "order_id": order["id"],
                "reason": "wrong batch",
                "items": [ { "product_id": product.id, "quantity": 1 } ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({ "supplier_id": supplier.id, "reason": "bad batch", "items": [] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({
                "supplier_id": supplier.id,
                "reason": "",
                "items": [ { "product_id": product.id, "quantity": 1 } ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Workflow Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn full_return_cycle_restocks_and_credits_per_line_decisions() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let accepted_product = app.seed_product("PLK-110", "Plank A", 10).await;
    let partial_product = app.seed_product("PLK-111", "Plank B", 8).await;
    let rejected_product = app.seed_product("PLK-112", "Plank C", 6).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({
                "supplier_id": supplier.id,
                "reason": "damaged in transit",
                "items": [
                    { "product_id": accepted_product.id, "quantity": 4 },
                    { "product_id": partial_product.id, "quantity": 3 },
                    { "product_id": rejected_product.id, "quantity": 2 }
                ]
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let return_id = created["id"].as_str().expect("return id").to_string();
    assert_eq!(created["total_quantity"], 9);

    let submitted = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/submit", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(submitted["status"], "pending");

    let approved = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/approve", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(approved["status"], "approved");

    // Shipping takes every line quantity out of stock.
    let shipped = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/ship", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(shipped["status"], "shipped");
    for (product_id, expected) in [
        (accepted_product.id, 6),
        (partial_product.id, 5),
        (rejected_product.id, 4),
    ] {
        let stocked = expect_success_data(
            app.get(
                &format!("/api/v1/products/{}", product_id),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
        assert_eq!(stocked["stock_quantity"], expected);
    }

    // The supplier accepts line one, takes 1 of 3 on line two, and turns
    // down line three. Whatever was not accepted comes back into stock.
    let detail = expect_success_data(
        app.get(
            &format!("/api/v1/returns/{}", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let line_id = |value: &serde_json::Value, product: Uuid| -> String {
        value["items"]
            .as_array()
            .expect("items")
            .iter()
            .find(|item| item["product_id"] == json!(product))
            .expect("line for product")["id"]
            .as_str()
            .expect("line id")
            .to_string()
    };
    let accepted_line = line_id(&detail, accepted_product.id);
    let partial_line = line_id(&detail, partial_product.id);
    let rejected_line = line_id(&detail, rejected_product.id);

    let received = expect_success_data(
        app.post(
            &format!("/api/v1/returns/{}/receive", return_id),
            Some(&app.admin_token),
            json!({
                "items": [
                    { "item_id": accepted_line, "status": "accepted" },
                    { "item_id": partial_line, "status": "partial_accept", "accepted_quantity": 1 },
                    { "item_id": rejected_line, "status": "rejected",
                      "condition_notes": "supplier disputes the damage" }
                ]
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(received["status"], "received");
    for item in received["items"].as_array().expect("items") {
        if item["id"] == json!(accepted_line.as_str()) {
            assert_eq!(item["status"], "accepted");
            assert_eq!(item["accepted_quantity"], 4);
        } else if item["id"] == json!(partial_line.as_str()) {
            assert_eq!(item["status"], "partial_accept");
            assert_eq!(item["accepted_quantity"], 1);
        } else {
            assert_eq!(item["status"], "rejected");
            assert_eq!(item["accepted_quantity"], 0);
            assert_eq!(item["condition_notes"], "supplier disputes the damage");
        }
    }
    for (product_id, expected) in [
        (accepted_product.id, 6),
        (partial_product.id, 7),
        (rejected_product.id, 6),
    ] {
        let stocked = expect_success_data(
            app.get(
                &format!("/api/v1/products/{}", product_id),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
        assert_eq!(stocked["stock_quantity"], expected);
    }

    // Closing grants a credit for the accepted quantities: (4 + 1) * 4.50.
    let closed = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/close", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["credit_amount"], "22.50");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn exchange_lines_restock_and_still_earn_credit() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-120", "Plank", 10).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 2),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let return_id = created["id"].as_str().expect("return id").to_string();
    let item_id = created["items"][0]["id"].as_str().expect("line id").to_string();

    for action in ["submit", "approve", "ship"] {
        expect_success_data(
            app.post_empty(
                &format!("/api/v1/returns/{}/{}", return_id, action),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }

    let received = expect_success_data(
        app.post(
            &format!("/api/v1/returns/{}/receive", return_id),
            Some(&app.admin_token),
            json!({ "items": [ { "item_id": item_id, "status": "exchange" } ] }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(received["items"][0]["accepted_quantity"], 2);

    // Replacement goods land back in stock.
    let stocked = expect_success_data(
        app.get(
            &format!("/api/v1/products/{}", product.id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(stocked["stock_quantity"], 10);

    let closed = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/close", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["credit_amount"], "9.00");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn fully_rejected_returns_close_as_cancelled() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-130", "Plank", 5).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 1),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let return_id = created["id"].as_str().expect("return id").to_string();
    let item_id = created["items"][0]["id"].as_str().expect("line id").to_string();

    for action in ["submit", "approve", "ship"] {
        expect_success_data(
            app.post_empty(
                &format!("/api/v1/returns/{}/{}", return_id, action),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }
    expect_success_data(
        app.post(
            &format!("/api/v1/returns/{}/receive", return_id),
            Some(&app.admin_token),
            json!({ "items": [ { "item_id": item_id, "status": "rejected" } ] }),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    let closed = expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/close", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(closed["status"], "cancelled");
    assert_eq!(closed["credit_amount"], "0.00");
}

// ==================== Guard Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn shipping_fails_when_stock_is_insufficient() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-140", "Plank", 3).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 5),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let return_id = created["id"].as_str().expect("return id").to_string();

    for action in ["submit", "approve"] {
        expect_success_data(
            app.post_empty(
                &format!("/api/v1/returns/{}/{}", return_id, action),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }

    let response = app
        .post_empty(
            &format!("/api/v1/returns/{}/ship", return_id),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(
        body["message"].as_str().expect("message").contains("on hand"),
        "unexpected message: {}",
        body
    );

    // The failed shipment must not have touched stock or the status.
    let stocked = expect_success_data(
        app.get(
            &format!("/api/v1/products/{}", product.id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(stocked["stock_quantity"], 3);
    let detail = expect_success_data(
        app.get(
            &format!("/api/v1/returns/{}", return_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(detail["status"], "approved");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn receive_requires_exactly_one_decision_per_line() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let first = app.seed_product("PLK-150", "Plank A", 10).await;
    let second = app.seed_product("PLK-151", "Plank B", 10).await;

    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({
                "supplier_id": supplier.id,
                "reason": "damaged in transit",
                "items": [
                    { "product_id": first.id, "quantity": 2 },
                    { "product_id": second.id, "quantity": 2 }
                ]
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let return_id = created["id"].as_str().expect("return id").to_string();
    let first_line = created["items"][0]["id"].as_str().expect("line id").to_string();
    let receive_path = format!("/api/v1/returns/{}/receive", return_id);

    for action in ["submit", "approve", "ship"] {
        expect_success_data(
            app.post_empty(
                &format!("/api/v1/returns/{}/{}", return_id, action),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }

    // One of two lines decided.
    let response = app
        .post(
            &receive_path,
            Some(&app.admin_token),
            json!({ "items": [ { "item_id": first_line, "status": "accepted" } ] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The same line decided twice.
    let response = app
        .post(
            &receive_path,
            Some(&app.admin_token),
            json!({
                "items": [
                    { "item_id": first_line, "status": "accepted" },
                    { "item_id": first_line, "status": "rejected" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // partial_accept needs a quantity strictly between zero and the line's.
    let second_line = created["items"][1]["id"].as_str().expect("line id").to_string();
    for bad_quantity in [json!(null), json!(0), json!(2), json!(5)] {
        let response = app
            .post(
                &receive_path,
                Some(&app.admin_token),
                json!({
                    "items": [
                        { "item_id": first_line, "status": "accepted" },
                        { "item_id": second_line, "status": "partial_accept",
                          "accepted_quantity": bad_quantity }
                    ]
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // An unknown decision status is refused.
    let response = app
        .post(
            &receive_path,
            Some(&app.admin_token),
            json!({
                "items": [
                    { "item_id": first_line, "status": "maybe" },
                    { "item_id": second_line, "status": "accepted" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn reject_and_cancel_windows_are_enforced() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-160", "Plank", 10).await;

    // Rejection only applies to pending returns.
    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 1),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let draft_id = created["id"].as_str().expect("return id").to_string();
    let response = app
        .post(
            &format!("/api/v1/returns/{}/reject", draft_id),
            Some(&app.admin_token),
            json!({ "reason": "not pending yet" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/submit", draft_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let rejected = expect_success_data(
        app.post(
            &format!("/api/v1/returns/{}/reject", draft_id),
            Some(&app.admin_token),
            json!({ "reason": "claim denied by supplier" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(rejected["status"], "cancelled");
    assert!(
        rejected["notes"]
            .as_str()
            .expect("notes")
            .contains("Rejected: claim denied by supplier"),
        "unexpected notes: {}",
        rejected["notes"]
    );

    // Cancellation closes once the goods have shipped.
    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 1),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let shipped_id = created["id"].as_str().expect("return id").to_string();
    for action in ["submit", "approve", "ship"] {
        expect_success_data(
            app.post_empty(
                &format!("/api/v1/returns/{}/{}", shipped_id, action),
                Some(&app.admin_token),
            )
            .await,
            StatusCode::OK,
        )
        .await;
    }
    let response = app
        .post_empty(
            &format!("/api/v1/returns/{}/cancel", shipped_id),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A draft can be cancelled directly, with the reason kept in the notes.
    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 1),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let cancel_id = created["id"].as_str().expect("return id").to_string();
    let cancelled = expect_success_data(
        app.post(
            &format!("/api/v1/returns/{}/cancel", cancel_id),
            Some(&app.admin_token),
            json!({ "reason": "entered by mistake" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(cancelled["status"], "cancelled");
    assert!(
        cancelled["notes"]
            .as_str()
            .expect("notes")
            .contains("Cancelled: entered by mistake"),
        "unexpected notes: {}",
        cancelled["notes"]
    );

    // Workflow steps cannot be skipped.
    let created = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(supplier.id, product.id, 1),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let skip_id = created["id"].as_str().expect("return id").to_string();
    for action in ["approve", "ship", "close"] {
        let response = app
            .post_empty(
                &format!("/api/v1/returns/{}/{}", skip_id, action),
                Some(&app.admin_token),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "draft return must not allow {}",
            action
        );
    }
}

// ==================== Listing and Access Tests ====================

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn list_filters_by_status_supplier_and_order() {
    let app = TestApp::spawn().await;
    let nordic = app.seed_supplier("Nordic Timber").await;
    let acme = app.seed_supplier("Acme Packaging").await;
    let product = app.seed_product("PLK-170", "Plank", 20).await;

    let order = expect_success_data(
        app.post(
            "/api/v1/purchase-orders",
            Some(&app.admin_token),
            purchase_order_body(nordic.id, product.id, 5),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let order_id = order["id"].as_str().expect("order id").to_string();

    expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            json!({
                "supplier_id": nordic.id,
                "order_id": order_id,
                "reason": "damaged in transit",
                "items": [ { "product_id": product.id, "quantity": 1 } ]
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let second = expect_success_data(
        app.post(
            "/api/v1/returns",
            Some(&app.admin_token),
            return_body(acme.id, product.id, 2),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let second_id = second["id"].as_str().expect("return id").to_string();
    expect_success_data(
        app.post_empty(
            &format!("/api/v1/returns/{}/submit", second_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;

    let all = expect_success_data(
        app.get("/api/v1/returns", Some(&app.admin_token)).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(all["total"], 2);

    let drafts = expect_success_data(
        app.get("/api/v1/returns?status=draft", Some(&app.admin_token))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(drafts["total"], 1);

    let by_supplier = expect_success_data(
        app.get(
            &format!("/api/v1/returns?supplier_id={}", acme.id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(by_supplier["total"], 1);
    assert_eq!(by_supplier["items"][0]["id"], json!(second_id.as_str()));

    let by_order = expect_success_data(
        app.get(
            &format!("/api/v1/returns?order_id={}", order_id),
            Some(&app.admin_token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(by_order["total"], 1);

    let response = app
        .get(
            &format!("/api/v1/returns/{}", Uuid::new_v4()),
            Some(&app.admin_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn clerks_can_read_returns_but_not_manage_them() {
    let app = TestApp::spawn().await;
    let supplier = app.seed_supplier("Nordic Timber").await;
    let product = app.seed_product("PLK-180", "Plank", 10).await;

    let clerk_token = app.token_for_role("casey", "clerk").await;
    let listing = expect_success_data(
        app.get("/api/v1/returns", Some(&clerk_token)).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(listing["total"], 0);

    let response = app
        .post(
            "/api/v1/returns",
            Some(&clerk_token),
            return_body(supplier.id, product.id, 1),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let manager_token = app.token_for_role("morgan", "manager").await;
    let response = app
        .post(
            "/api/v1/returns",
            Some(&manager_token),
            return_body(supplier.id, product.id, 1),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}
