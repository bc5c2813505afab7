use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, json_body, message_response, success_response};
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::ledger::ProductDetail;
use crate::services::products::ProductForm;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "Live products, newest first", body = Vec<ProductDetail>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.products.list().await?;
    Ok(success_response(products))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = ProductForm,
    responses(
        (status = 201, description = "Product created with its first stock entry", body = ProductDetail),
        (status = 400, description = "Invalid product data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<ProductForm>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = json_body(payload)?.parse()?;
    let product = state
        .services
        .products
        .create(auth_user.caller_id, input)
        .await?;
    Ok(created_response(product))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product with its stock entries", body = ProductDetail),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get(id).await?;
    Ok(success_response(product))
}

#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ProductForm,
    responses(
        (status = 200, description = "Product updated", body = ProductDetail),
        (status = 400, description = "Invalid product data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<ProductForm>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = json_body(payload)?.parse()?;
    let product = state.services.products.update(id, input).await?;
    Ok(success_response(product))
}

#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product and its stock entries deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.products.delete(id).await?;
    Ok(message_response(
        serde_json::json!({ "id": id }),
        "Product deleted",
    ))
}
