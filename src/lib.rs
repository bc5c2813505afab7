//! Stocktopus inventory ledger
//!
//! Tracks product quantities across storage locations behind an authenticated
//! JSON API: add, subtract and transfer stock, plus the product catalog,
//! locations and dashboard statistics built on top of the ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::config::{AppConfig, AppConfigError};
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: AppConfig) -> Self {
        let services = handlers::AppServices::new(db.clone());
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn message_is_omitted_unless_set() {
        let plain = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert!(plain.get("message").is_none());
        assert_eq!(plain["success"], true);

        let with = serde_json::to_value(ApiResponse::success(1).with_message("done")).unwrap();
        assert_eq!(with["message"], "done");
    }
}

/// Authenticated `/api/v1` routes plus the public status and health probes
pub fn api_v1_routes() -> Router<AppState> {
    let inventory = Router::new()
        .route("/inventory/add", post(handlers::inventory::add_stock))
        .route(
            "/inventory/subtract",
            post(handlers::inventory::subtract_stock),
        )
        .route(
            "/inventory/transfer",
            post(handlers::inventory::transfer_stock),
        )
        .route(
            "/products/:id/balances",
            get(handlers::inventory::current_balances),
        )
        .with_auth();

    let products = Router::new()
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .with_auth();

    let locations = Router::new()
        .route(
            "/locations",
            get(handlers::locations::list_locations).post(handlers::locations::create_location),
        )
        .route(
            "/locations/:id",
            axum::routing::put(handlers::locations::update_location)
                .delete(handlers::locations::delete_location),
        )
        .with_auth();

    let statistics = Router::new()
        .route("/statistics", get(handlers::statistics::dashboard))
        .route(
            "/statistics/top-products",
            get(handlers::statistics::top_products),
        )
        .with_auth();

    Router::new()
        // Status and health endpoints
        .route("/status", get(health::status))
        .route("/health", get(health::health_check))
        .merge(inventory)
        .merge(products)
        .merge(locations)
        .merge(statistics)
}

/// CORS policy from config: explicit origins win, otherwise permissive only
/// where the config allows it.
pub fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, AppConfigError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        // Wildcards are not allowed together with credentials, so list them.
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(services::idempotency::IDEMPOTENCY_HEADER),
                HeaderName::from_static(middleware_helpers::REQUEST_ID_HEADER),
            ])
            .allow_credentials(cfg.cors_allow_credentials))
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        Err(AppConfigError::Invalid(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                .into(),
        ))
    }
}

/// The complete application: routes, docs and the middleware stack.
pub fn build_router(state: AppState) -> Result<Router, AppConfigError> {
    let cfg = state.config.clone();
    let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
    let cors = cors_layer(&cfg)?;

    Ok(Router::<AppState>::new()
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(DefaultBodyLimit::max(cfg.max_body_size))
        .layer(TimeoutLayer::new(cfg.request_timeout()))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>, mut req: Request, next: Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state))
}
