//! Operator-facing endpoints: forced mapping refresh and cache eviction.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::error::{internal_error, ErrorResponse};
use crate::mappings::{MappingSync, RefreshStats};
use crate::services::VehicleService;

#[derive(Clone)]
pub struct AdminState {
    pub mapping_sync: Arc<MappingSync>,
    pub service: Arc<VehicleService>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub stats: RefreshStats,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InvalidateRequest {
    /// Specific cache key; omit to clear everything
    pub key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvalidateResponse {
    pub success: bool,
    pub message: String,
}

/// Force a refresh of the identity-mapping tables
#[utoipa::path(
    post,
    path = "/api/mappings/refresh",
    responses(
        (status = 200, description = "Mappings refreshed", body = RefreshResponse),
        (status = 500, description = "Relational store unreachable", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn refresh_mappings(
    State(state): State<AdminState>,
) -> Result<Json<RefreshResponse>, (StatusCode, Json<ErrorResponse>)> {
    let stats = state
        .mapping_sync
        .refresh(true)
        .await
        .map_err(|e| internal_error("Failed to refresh mapping tables", e))?;

    Ok(Json(RefreshResponse {
        success: true,
        message: "Mapping tables refreshed successfully".to_string(),
        stats,
    }))
}

/// Evict one result-cache entry, or all of them
#[utoipa::path(
    post,
    path = "/api/cache/invalidate",
    request_body = InvalidateRequest,
    responses(
        (status = 200, description = "Cache invalidated", body = InvalidateResponse)
    ),
    tag = "admin"
)]
pub async fn invalidate_cache(
    State(state): State<AdminState>,
    body: Option<Json<InvalidateRequest>>,
) -> Json<InvalidateResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    state.service.invalidate_cache(request.key.as_deref()).await;

    let message = match request.key {
        Some(key) => format!("Cache for {} invalidated", key),
        None => "All cache invalidated".to_string(),
    };
    Json(InvalidateResponse {
        success: true,
        message,
    })
}

pub fn router(mapping_sync: Arc<MappingSync>, service: Arc<VehicleService>) -> Router {
    let state = AdminState {
        mapping_sync,
        service,
    };
    Router::new()
        .route("/mappings/refresh", post(refresh_mappings))
        .route("/cache/invalidate", post(invalidate_cache))
        .with_state(state)
}
