use axum::{response::IntoResponse, Json};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stocktopus API",
        version = "1.0.0",
        description = r#"
# Stocktopus Inventory API

Tracks how many units of each product sit at each storage location.

- **Ledger**: add, subtract and transfer stock; read per-location balances
- **Catalog**: products and locations, soft-deleted rather than removed
- **Dashboard**: stock counters and value rankings

## Authentication

Every `/api/v1` route except `/status` and `/health` needs a JWT:

```
Authorization: Bearer <your-jwt-token>
```

## Amounts

Amounts are positive decimals with at most two fractional digits, sent as a JSON number or a
numeric string. Responses render them as strings with two decimals.

## Idempotency

Ledger mutations accept an `Idempotency-Key` header. Repeating a committed request with the same
key returns the original result without moving stock again.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "inventory", description = "Stock ledger"),
        (name = "products", description = "Product catalog"),
        (name = "locations", description = "Storage locations"),
        (name = "statistics", description = "Dashboard statistics"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::inventory::add_stock,
        crate::handlers::inventory::subtract_stock,
        crate::handlers::inventory::transfer_stock,
        crate::handlers::inventory::current_balances,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::locations::list_locations,
        crate::handlers::locations::create_location,
        crate::handlers::locations::update_location,
        crate::handlers::locations::delete_location,
        crate::handlers::statistics::dashboard,
        crate::handlers::statistics::top_products,
        crate::health::health_check,
        crate::health::status,
    ),
    components(
        schemas(
            crate::handlers::inventory::StockMovementRequest,
            crate::handlers::inventory::TransferRequest,
            crate::services::ledger::AddOutcome,
            crate::services::ledger::SubtractOutcome,
            crate::services::ledger::TransferOutcome,
            crate::services::ledger::TransferSummary,
            crate::services::ledger::ProductBalances,
            crate::services::ledger::LocationBalance,
            crate::services::ledger::ProductDetail,
            crate::services::products::ProductForm,
            crate::services::locations::LocationForm,
            crate::services::locations::LocationView,
            crate::services::locations::LocationSummary,
            crate::services::statistics::DashboardStatistics,
            crate::services::statistics::DailyCount,
            crate::services::statistics::ProductValue,
            crate::health::HealthReport,
            crate::health::HealthStatus,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
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

/// Serves the generated document at `/api-docs/openapi.json`
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_ledger_routes_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Stocktopus API"));
        assert!(json.contains("/api/v1/inventory/add"));
        assert!(json.contains("/api/v1/inventory/transfer"));
        assert!(json.contains("/api/v1/products/{id}/balances"));
        assert!(json.contains("\"Bearer\""));
    }
}
