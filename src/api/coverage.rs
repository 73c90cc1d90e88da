use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;

use crate::api::error::{service_error, ErrorResponse};
use crate::services::aggregate::CoverageReport;
use crate::services::VehicleService;

#[derive(Clone)]
pub struct CoverageState {
    pub service: Arc<VehicleService>,
}

/// Per-provider device coverage over the trailing 24 hours
#[utoipa::path(
    get,
    path = "/api/coverage/daily",
    responses(
        (status = 200, description = "Daily coverage statistics by provider", body = CoverageReport),
        (status = 500, description = "Upstream store failure", body = ErrorResponse)
    ),
    tag = "coverage"
)]
pub async fn get_daily_coverage(
    State(state): State<CoverageState>,
) -> Result<Json<CoverageReport>, (StatusCode, Json<ErrorResponse>)> {
    let report = state
        .service
        .daily_coverage()
        .await
        .map_err(|e| service_error("Failed to fetch coverage data", e))?;

    Ok(Json(report))
}

pub fn router(service: Arc<VehicleService>) -> Router {
    Router::new()
        .route("/daily", get(get_daily_coverage))
        .with_state(CoverageState { service })
}
