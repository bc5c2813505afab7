use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{idempotency_key, json_body, message_response, success_response};
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::ledger::{
    AddOutcome, AddStock, ProductBalances, SubtractOutcome, SubtractStock, TransferOutcome,
    TransferStock,
};
use crate::services::quantity::Quantity;
use crate::AppState;

/// Add or subtract request. `amount` may also be sent as `quantity`, and either
/// as a JSON number or a numeric string.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StockMovementRequest {
    #[serde(default, alias = "productId")]
    pub product_id: Option<Uuid>,
    #[serde(default, alias = "locationId")]
    pub location_id: Option<Uuid>,
    #[serde(default, alias = "quantity")]
    #[schema(value_type = String, example = "5")]
    pub amount: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    #[serde(default, alias = "productId")]
    pub product_id: Option<Uuid>,
    #[serde(default, alias = "fromLocationId")]
    pub from_location_id: Option<Uuid>,
    #[serde(default, alias = "toLocationId")]
    pub to_location_id: Option<Uuid>,
    #[serde(default, alias = "quantity")]
    #[schema(value_type = String, example = "4")]
    pub amount: Option<Value>,
}

fn required(id: Option<Uuid>, field: &str) -> Result<Uuid, ServiceError> {
    id.ok_or_else(|| ServiceError::ValidationError(format!("{field} is required")))
}

impl StockMovementRequest {
    fn into_parts(self) -> Result<(Uuid, Uuid, Quantity), ServiceError> {
        Ok((
            required(self.product_id, "product_id")?,
            required(self.location_id, "location_id")?,
            Quantity::from_json(self.amount.as_ref())?,
        ))
    }
}

impl TryFrom<TransferRequest> for TransferStock {
    type Error = ServiceError;

    fn try_from(req: TransferRequest) -> Result<Self, Self::Error> {
        Ok(TransferStock {
            product_id: required(req.product_id, "product_id")?,
            from_location_id: required(req.from_location_id, "from_location_id")?,
            to_location_id: required(req.to_location_id, "to_location_id")?,
            amount: Quantity::from_json(req.amount.as_ref())?,
        })
    }
}

/// Add stock of a product at a location
#[utoipa::path(
    post,
    path = "/api/v1/inventory/add",
    request_body = StockMovementRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the first committed result for this key")),
    responses(
        (status = 200, description = "Stock added", body = AddOutcome,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid amount or payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate idempotency key in flight", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn add_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<StockMovementRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let (product_id, location_id, amount) = json_body(payload)?.into_parts()?;
    let outcome = state
        .services
        .ledger
        .add(
            auth_user.caller_id,
            AddStock {
                product_id,
                location_id,
                amount,
            },
            idempotency_key(&headers),
        )
        .await?;

    let message = outcome.message.clone();
    Ok(message_response(outcome, message))
}

/// Subtract stock of a product at a location
#[utoipa::path(
    post,
    path = "/api/v1/inventory/subtract",
    request_body = StockMovementRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the first committed result for this key")),
    responses(
        (status = 200, description = "Stock subtracted", body = SubtractOutcome),
        (status = 400, description = "Invalid amount or insufficient quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found at this location", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate idempotency key in flight", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn subtract_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<StockMovementRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let (product_id, location_id, amount) = json_body(payload)?.into_parts()?;
    let outcome = state
        .services
        .ledger
        .subtract(
            auth_user.caller_id,
            SubtractStock {
                product_id,
                location_id,
                amount,
            },
            idempotency_key(&headers),
        )
        .await?;

    Ok(success_response(outcome))
}

/// Move stock of a product between two locations
#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfer",
    request_body = TransferRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the first committed result for this key")),
    responses(
        (status = 200, description = "Stock transferred", body = TransferOutcome),
        (status = 400, description = "Invalid amount, same location, or insufficient quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate idempotency key in flight", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn transfer_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let cmd = TransferStock::try_from(json_body(payload)?)?;
    let outcome = state
        .services
        .ledger
        .transfer(auth_user.caller_id, cmd, idempotency_key(&headers))
        .await?;

    Ok(message_response(outcome, "Transfer completed successfully"))
}

/// Aggregate and per-location balances of a product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/balances",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Current balances", body = ProductBalances),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn current_balances(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let balances = state.services.ledger.current_balances(id).await?;
    Ok(success_response(balances))
}
