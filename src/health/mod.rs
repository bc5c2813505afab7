/*!
 * # Health checks
 *
 * - `/health` and `/api/v1/health` ping the database and report 503 when it is unreachable
 * - `/api/v1/status` answers without touching the database
 */

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub database: HealthStatus,
    pub database_latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Up => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Ping the database and build a report
pub async fn probe(db: &DatabaseConnection) -> HealthReport {
    let started = Instant::now();
    let database = match db.ping().await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            error!(error = %e, "database health check failed");
            HealthStatus::Down
        }
    };

    HealthReport {
        status: database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        database_latency_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthReport),
        (status = 503, description = "Database unreachable", body = HealthReport),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = probe(&state.db).await;
    debug!(status = ?report.status, "health check");
    (report.status_code(), Json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Service is running")),
    tag = "health"
)]
pub async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
