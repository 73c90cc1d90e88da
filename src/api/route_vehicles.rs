use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::api::error::{service_error, ErrorResponse};
use crate::models::RouteVehicle;
use crate::services::VehicleService;

#[derive(Clone)]
pub struct RouteVehiclesState {
    pub service: Arc<VehicleService>,
}

/// Live vehicles on a route with their recent trails
///
/// `route_id` may be a route code or a human short name; a short name is
/// resolved to its route codes when the primary key holds no vehicles. An
/// empty list means no vehicles are currently reporting, not an error.
#[utoipa::path(
    get,
    path = "/api/route-vehicles/{route_id}",
    params(
        ("route_id" = String, Path, description = "Route code or short name")
    ),
    responses(
        (status = 200, description = "Live vehicles on the route", body = [RouteVehicle]),
        (status = 500, description = "Upstream store failure", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_route_vehicles(
    State(state): State<RouteVehiclesState>,
    Path(route_id): Path<String>,
) -> Result<Json<Vec<RouteVehicle>>, (StatusCode, Json<ErrorResponse>)> {
    let vehicles = state
        .service
        .vehicles_on_route(&route_id)
        .await
        .map_err(|e| service_error("Failed to fetch route vehicle data", e))?;

    Ok(Json(vehicles))
}

pub fn router(service: Arc<VehicleService>) -> Router {
    Router::new()
        .route("/{route_id}", get(get_route_vehicles))
        .with_state(RouteVehiclesState { service })
}
