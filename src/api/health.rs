use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::mappings::MappingSync;
use crate::services::VehicleService;

#[derive(Clone)]
pub struct HealthState {
    pub mapping_sync: Arc<MappingSync>,
    pub service: Arc<VehicleService>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of device-to-vehicle mappings in the current snapshot
    pub device_vehicle_mappings: usize,
    /// Number of vehicle-to-route mappings in the current snapshot
    pub vehicle_route_mappings: usize,
    /// Number of route short names with resolved codes
    pub route_code_mappings: usize,
    /// Number of live result-cache entries
    pub cached_results: usize,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let snapshot = state.mapping_sync.snapshot().await;

    Json(HealthResponse {
        healthy: true,
        device_vehicle_mappings: snapshot.device_vehicle_count(),
        vehicle_route_mappings: snapshot.vehicle_route_count(),
        route_code_mappings: snapshot.route_code_count(),
        cached_results: state.service.cached_results().await,
    })
}

pub fn router(mapping_sync: Arc<MappingSync>, service: Arc<VehicleService>) -> Router {
    let state = HealthState {
        mapping_sync,
        service,
    };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}
