use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{service_error, ErrorResponse};
use crate::models::VehicleView;
use crate::services::{VehicleService, WindowQuery};

#[derive(Clone)]
pub struct VehiclesState {
    pub service: Arc<VehicleService>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleQuery {
    /// Window start, wire format `YYYY-MM-DD HH:MM:SS` (local civil time)
    pub start_time: Option<String>,
    /// Window end, wire format; omit for a live request
    pub end_time: Option<String>,
    /// Restrict to one device
    pub device_id: Option<String>,
    /// Skip the result cache for this request
    #[serde(default)]
    pub bypass_cache: bool,
}

/// Vehicles with their trails over a time window
#[utoipa::path(
    get,
    path = "/api/vehicles",
    params(VehicleQuery),
    responses(
        (status = 200, description = "Vehicles active in the window", body = [VehicleView]),
        (status = 400, description = "Malformed window bounds", body = ErrorResponse),
        (status = 500, description = "Upstream store failure", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_vehicles(
    State(state): State<VehiclesState>,
    Query(query): Query<VehicleQuery>,
) -> Result<Json<Vec<VehicleView>>, (StatusCode, Json<ErrorResponse>)> {
    let vehicles = state
        .service
        .vehicles_in_window(&WindowQuery {
            start: query.start_time,
            end: query.end_time,
            device_id: query.device_id,
            bypass_cache: query.bypass_cache,
        })
        .await
        .map_err(|e| service_error("Failed to fetch vehicle data", e))?;

    Ok(Json(vehicles))
}

pub fn router(service: Arc<VehicleService>) -> Router {
    Router::new()
        .route("/", get(get_vehicles))
        .with_state(VehiclesState { service })
}
