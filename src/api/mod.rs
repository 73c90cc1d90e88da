pub mod admin;
pub mod coverage;
pub mod directions;
pub mod error;
pub mod health;
pub mod route_vehicles;
pub mod vehicles;

pub use error::{internal_error, ErrorResponse};

use axum::Router;
use std::sync::Arc;

use crate::mappings::MappingSync;
use crate::services::VehicleService;

pub fn router(
    service: Arc<VehicleService>,
    mapping_sync: Arc<MappingSync>,
    directions_state: directions::DirectionsState,
) -> Router {
    Router::new()
        .nest("/vehicles", vehicles::router(service.clone()))
        .nest("/route-vehicles", route_vehicles::router(service.clone()))
        .nest("/coverage", coverage::router(service.clone()))
        .nest("/directions", directions::router(directions_state))
        .nest("/health", health::router(mapping_sync.clone(), service.clone()))
        .merge(admin::router(mapping_sync, service))
}
