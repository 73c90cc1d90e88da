//! Stateless proxy to an OSRM routing server, cached by coordinate pair.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::api::error::{internal_error, ErrorResponse};
use crate::cache::TtlCache;

#[derive(Clone)]
pub struct DirectionsState {
    pub client: reqwest::Client,
    pub osrm_server: Arc<str>,
    pub cache: Arc<TtlCache<serde_json::Value>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DirectionsQuery {
    pub from_lat: f64,
    pub from_lng: f64,
    pub to_lat: f64,
    pub to_lng: f64,
}

/// Driving route between two points, proxied from OSRM
#[utoipa::path(
    get,
    path = "/api/directions",
    params(DirectionsQuery),
    responses(
        (status = 200, description = "OSRM route response, passed through verbatim"),
        (status = 500, description = "OSRM request failed", body = ErrorResponse)
    ),
    tag = "directions"
)]
pub async fn get_directions(
    State(state): State<DirectionsState>,
    Query(query): Query<DirectionsQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let cache_key = format!(
        "route_{}_{}_{}_{}",
        query.from_lat, query.from_lng, query.to_lat, query.to_lng
    );

    if let Some(cached) = state.cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    // OSRM takes lng,lat order
    let url = format!(
        "{}/route/v1/driving/{},{};{},{}",
        state.osrm_server, query.from_lng, query.from_lat, query.to_lng, query.to_lat
    );

    let response = state
        .client
        .get(&url)
        .query(&[
            ("overview", "full"),
            ("geometries", "geojson"),
            ("steps", "true"),
        ])
        .send()
        .await
        .map_err(|e| internal_error("Failed to fetch route", e))?;

    if !response.status().is_success() {
        return Err(internal_error(
            "Failed to fetch route",
            format!("OSRM returned HTTP {}", response.status()),
        ));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| internal_error("Failed to fetch route", e))?;

    state
        .cache
        .set(&cache_key, body.clone(), chrono::Duration::minutes(5))
        .await;

    Ok(Json(body))
}

pub fn router(state: DirectionsState) -> Router {
    Router::new()
        .route("/", get(get_directions))
        .with_state(state)
}
