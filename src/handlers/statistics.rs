use axum::{extract::State, response::IntoResponse};

use super::common::success_response;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::statistics::{DashboardStatistics, ProductValue};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/statistics",
    responses(
        (status = 200, description = "Dashboard counters and the 14-day creation histogram", body = DashboardStatistics),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "statistics"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.statistics.dashboard().await?;
    Ok(success_response(stats))
}

#[utoipa::path(
    get,
    path = "/api/v1/statistics/top-products",
    responses(
        (status = 200, description = "Up to ten products ranked by stock value", body = Vec<ProductValue>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "statistics"
)]
pub async fn top_products(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let ranked = state.services.statistics.top_products_by_value().await?;
    Ok(success_response(ranked))
}
