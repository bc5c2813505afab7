mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn ledger_routes_require_a_bearer_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/add",
            Some(json!({"product_id": Uuid::new_v4(), "location_id": Uuid::new_v4(), "amount": 1})),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (status, _) = app
        .request(Method::GET, "/api/v1/products", None, Some("not-a-jwt"), &[])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");

    let (status, body) = app
        .request(Method::GET, "/api/v1/status", None, None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());

    let (status, body) = app
        .request(Method::GET, "/api-docs/openapi.json", None, None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/inventory/transfer"].is_object());
}

#[tokio::test]
async fn add_over_http_returns_envelope_with_message() {
    let app = TestApp::new().await;
    let l1 = app.location("Main Warehouse").await;
    let p = app.product("Widget", l1.id, dec!(10.00)).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/add",
            Some(json!({"productId": p.id, "locationId": l1.id, "quantity": "5"})),
            Some(app.token()),
            &[("x-request-id", "req-add-1")],
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Successfully added 5 units to Main Warehouse");
    assert_eq!(body["meta"]["request_id"], "req-add-1");
    assert_eq!(dec_field(&body["data"]["new_location_quantity"]), dec!(15.00));
    assert_eq!(dec_field(&body["data"]["new_total_quantity"]), dec!(15.00));
}

#[tokio::test]
async fn bad_amounts_are_rejected_with_400() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;
    let p = app.product("Widget", l1.id, dec!(10.00)).await;

    for amount in [json!(1.005), json!(0), json!(-2), json!("abc"), json!(null)] {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/inventory/add",
                Some(json!({"product_id": p.id, "location_id": l1.id, "amount": amount})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount}: {body}");
    }

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/inventory/subtract",
            Some(json!({"product_id": p.id, "location_id": l1.id})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.total(p.id).await, dec!(10.00));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!("not an object")),
            Some(app.token()),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn subtract_beyond_available_is_a_bad_request() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;
    let p = app.product("Widget", l1.id, dec!(10.00)).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory/subtract",
            Some(json!({"product_id": p.id, "location_id": l1.id, "amount": 12})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("Available: 10, Requested: 12")));
}

#[tokio::test]
async fn transfer_over_http_and_balances() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;
    let l2 = app.location("L2").await;
    let p = app.product("Widget", l1.id, dec!(10.00)).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": p.id,
                "from_location_id": l1.id,
                "to_location_id": l2.id,
                "amount": "4.00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Transfer completed successfully");
    assert_eq!(dec_field(&body["data"]["transfer"]["new_from_quantity"]), dec!(6.00));
    assert_eq!(dec_field(&body["data"]["transfer"]["new_to_quantity"]), dec!(4.00));

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/products/{}/balances", p.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_field(&body["data"]["total_quantity"]), dec!(10.00));
    assert_eq!(body["data"]["locations"].as_array().map(Vec::len), Some(2));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": p.id,
                "from_location_id": l1.id,
                "to_location_id": l1.id,
                "amount": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_targets_are_not_found() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory/add",
            Some(json!({"product_id": Uuid::new_v4(), "location_id": l1.id, "amount": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product not found");

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/products/{}/balances", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idempotency_key_header_replays_over_http() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;
    let p = app.product("Widget", l1.id, dec!(1.00)).await;
    let body = json!({"product_id": p.id, "location_id": l1.id, "amount": 2});

    let mut responses = Vec::new();
    for _ in 0..2 {
        let (status, response) = app
            .request(
                Method::POST,
                "/api/v1/inventory/add",
                Some(body.clone()),
                Some(app.token()),
                &[("idempotency-key", "order-42")],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        responses.push(response["data"].clone());
    }

    assert_eq!(responses[0], responses[1]);
    assert_eq!(app.total(p.id).await, dec!(3.00));
}

#[tokio::test]
async fn product_and_location_lifecycle_over_http() {
    let app = TestApp::new().await;

    let (status, location) = app
        .call(
            Method::POST,
            "/api/v1/locations",
            Some(json!({"name": "Dock", "address": "1 Harbour Rd"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{location}");
    let location_id = location["data"]["id"].as_str().unwrap().to_string();

    let (status, duplicate) = app
        .call(Method::POST, "/api/v1/locations", Some(json!({"name": "dock"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{duplicate}");

    let product_body = json!({
        "name": "Crate",
        "image_url": "https://cdn.example.com/crate.png",
        "price": "12.345",
        "quantity": "3",
        "location_id": location_id
    });
    let (status, product) = app
        .call(Method::POST, "/api/v1/products", Some(product_body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    assert_eq!(dec_field(&product["data"]["price"]), dec!(12.35));
    assert_eq!(dec_field(&product["data"]["quantity"]), dec!(3.00));
    let product_id = product["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(Method::POST, "/api/v1/products", Some(product_body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, list) = app.call(Method::GET, "/api/v1/locations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"][0]["products"][0], "Crate");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/v1/locations/{location_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, product) = app
        .call(Method::GET, &format!("/api/v1/products/{product_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_field(&product["data"]["quantity"]), dec!(0.00));

    let (status, deleted) = app
        .call(Method::DELETE, &format!("/api/v1/products/{product_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["message"], "Product deleted");

    let (status, _) = app
        .call(Method::GET, &format!("/api/v1/products/{product_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_endpoints_respond() {
    let app = TestApp::new().await;
    let l1 = app.location("L1").await;
    app.product("Widget", l1.id, dec!(2.00)).await;

    let (status, body) = app.call(Method::GET, "/api/v1/statistics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active_inventories"], 1);
    assert_eq!(body["data"]["location_count"], 1);

    let (status, body) = app
        .call(Method::GET, "/api/v1/statistics/top-products", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_field(&body["data"][0]["total_value"]), dec!(39.98));
}
