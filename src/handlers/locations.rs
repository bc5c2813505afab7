use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, json_body, message_response, success_response};
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::locations::{LocationForm, LocationSummary, LocationView};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/locations",
    responses(
        (status = 200, description = "Live locations with the products stocked there", body = Vec<LocationSummary>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "locations"
)]
pub async fn list_locations(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let locations = state.services.locations.list().await?;
    Ok(success_response(locations))
}

#[utoipa::path(
    post,
    path = "/api/v1/locations",
    request_body = LocationForm,
    responses(
        (status = 201, description = "Location created", body = LocationView),
        (status = 400, description = "Invalid location data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "locations"
)]
pub async fn create_location(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    payload: Result<Json<LocationForm>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let location = state.services.locations.create(json_body(payload)?).await?;
    Ok(created_response(location))
}

#[utoipa::path(
    put,
    path = "/api/v1/locations/{id}",
    params(("id" = Uuid, Path, description = "Location id")),
    request_body = LocationForm,
    responses(
        (status = 200, description = "Location updated", body = LocationView),
        (status = 400, description = "Invalid location data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "locations"
)]
pub async fn update_location(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<LocationForm>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let location = state
        .services
        .locations
        .update(id, json_body(payload)?)
        .await?;
    Ok(success_response(location))
}

/// Deleting a location also retires the stock held there.
#[utoipa::path(
    delete,
    path = "/api/v1/locations/{id}",
    params(("id" = Uuid, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location and its stock entries deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Location not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "locations"
)]
pub async fn delete_location(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.locations.delete(id).await?;
    Ok(message_response(
        serde_json::json!({ "id": id }),
        "Location deleted",
    ))
}
