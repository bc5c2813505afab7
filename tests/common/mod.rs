#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use stocktopus_api::{
    auth::{AuthConfig, AuthService, CallerId},
    config::AppConfig,
    db,
    services::{
        ledger::{AddStock, ProductDetail},
        locations::{LocationForm, LocationView},
        products::ProductInput,
        quantity::Quantity,
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "kP9#vQ2$wL7!nR4@tY6^mZ1&xC8*bF3(hJ5)gD0-sA_eW+uI=oK~jN`lM;qE:rT<";

/// Application state and router backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub caller: CallerId,
    token: String,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("stocktopus_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        // Ask for a real pool; the SQLite cap must make writers queue anyway.
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let auth = AuthService::new(AuthConfig::from(&cfg));
        let caller = CallerId(Uuid::new_v4());
        let token = auth
            .issue_token(caller, Some("clerk@example.com".into()))
            .expect("issue test token");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = stocktopus_api::build_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            caller,
            token,
            _dir: dir,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Authenticated request with the harness caller's token
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, Some(&self.token), &[]).await
    }

    pub async fn location(&self, name: &str) -> LocationView {
        self.state
            .services
            .locations
            .create(LocationForm {
                name: name.to_string(),
                address: None,
            })
            .await
            .expect("create location")
    }

    /// A product whose first entry holds `quantity` at `location`
    pub async fn product(&self, name: &str, location: Uuid, quantity: Decimal) -> ProductDetail {
        self.state
            .services
            .products
            .create(
                self.caller,
                ProductInput {
                    name: name.to_string(),
                    image_url: "https://cdn.example.com/item.png".to_string(),
                    price: Decimal::new(1999, 2),
                    quantity: Quantity::new(quantity).expect("valid quantity"),
                    location_id: location,
                },
            )
            .await
            .expect("create product")
    }

    pub async fn add(&self, product: Uuid, location: Uuid, amount: Decimal) {
        self.state
            .services
            .ledger
            .add(
                self.caller,
                AddStock {
                    product_id: product,
                    location_id: location,
                    amount: Quantity::new(amount).expect("valid amount"),
                },
                None,
            )
            .await
            .expect("add stock");
    }

    pub async fn location_quantity(&self, product: Uuid, location: Uuid) -> Option<Decimal> {
        self.state
            .services
            .ledger
            .current_balances(product)
            .await
            .expect("balances")
            .locations
            .into_iter()
            .find(|b| b.location_id == location)
            .map(|b| b.quantity)
    }

    pub async fn total(&self, product: Uuid) -> Decimal {
        self.state
            .services
            .ledger
            .current_balances(product)
            .await
            .expect("balances")
            .total_quantity
    }
}

/// Parse a decimal rendered as a JSON string
pub fn dec_field(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
}
