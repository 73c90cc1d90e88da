//! Request-scoped response projections.
//!
//! These own no long-lived state; they are assembled per request from the
//! historical and live stores, with identifiers resolved through the
//! identity-mapping snapshot.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One geographic fix for a device. Invariant: `lat != 0 && lng != 0` (the
/// upstream sentinel for "no fix" never reaches a response), and trails are
/// sorted ascending by timestamp before being exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrailPoint {
    pub lat: f64,
    pub lng: f64,
    /// Wire civil-time format, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

/// A vehicle with its trail over a requested time window
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleView {
    pub device_id: String,
    /// Mapped vehicle number; falls back to the historical store's own value
    pub vehicle_number: Option<String>,
    pub route_number: Option<String>,
    pub provider: Option<String>,
    /// Resolved via the vehicle→route mapping, when known
    pub route_id: Option<String>,
    pub trail: Vec<TrailPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// One ETA row attached to a live vehicle record. Field names stay snake_case
/// to match the live store's payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EtaEntry {
    pub stop_name: String,
    /// Seconds since epoch
    pub arrival_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_lon: Option<f64>,
}

/// A live vehicle on a route, with its recent trail attached
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteVehicle {
    pub device_id: String,
    pub vehicle_number: String,
    pub route_id: String,
    pub route_name: String,
    pub provider: Option<String>,
    /// Wire civil-time format, converted from the live store's epoch seconds
    pub last_seen: Option<String>,
    pub eta_data: Vec<EtaEntry>,
    pub location: Location,
    pub trail: Vec<TrailPoint>,
}
