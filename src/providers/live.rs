//! Redis live-state store.
//!
//! The latest known state for vehicles on a route lives in the hash
//! `route:<routeId>`: each field is a vehicle number, each value a JSON
//! document with the vehicle's current position and ETA list. A record that
//! fails to parse is skipped with a warning; it never fails the whole read.

use async_trait::async_trait;
use bb8_redis::{bb8, redis::AsyncCommands, RedisConnectionManager};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::models::EtaEntry;

#[derive(Debug, Error)]
pub enum LiveStoreError {
    #[error("Live store connection failed: {0}")]
    Connection(String),
    #[error("Live store query failed: {0}")]
    Query(String),
}

/// JSON payload stored per vehicle in a route hash. Parsed fail-closed: a
/// malformed document drops that one vehicle, not the request.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveVehicleRecord {
    pub device_id: String,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub route_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    /// Seconds since epoch
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub eta_data: Vec<EtaEntry>,
    pub latitude: f64,
    pub longitude: f64,
}

/// A parsed hash field: the vehicle number and its live record
#[derive(Debug, Clone)]
pub struct LiveRouteVehicle {
    pub vehicle_number: String,
    pub record: LiveVehicleRecord,
}

/// Read access to the live store, behind a seam for engine tests.
#[async_trait]
pub trait LiveSource: Send + Sync {
    /// All parseable vehicles in the hash for `route_key` (e.g. `route:R1`).
    /// A missing key reads as an empty hash.
    async fn route_vehicles(&self, route_key: &str)
        -> Result<Vec<LiveRouteVehicle>, LiveStoreError>;
}

pub struct RedisLiveStore {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl RedisLiveStore {
    pub async fn connect(redis_url: &str) -> Result<Self, LiveStoreError> {
        let manager = RedisConnectionManager::new(redis_url)
            .map_err(|e| LiveStoreError::Connection(e.to_string()))?;
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(|e| LiveStoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LiveSource for RedisLiveStore {
    async fn route_vehicles(
        &self,
        route_key: &str,
    ) -> Result<Vec<LiveRouteVehicle>, LiveStoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LiveStoreError::Connection(e.to_string()))?;

        let fields: std::collections::HashMap<String, String> = conn
            .hgetall(route_key)
            .await
            .map_err(|e| LiveStoreError::Query(e.to_string()))?;

        Ok(parse_route_hash(route_key, fields.into_iter().collect()))
    }
}

/// Turn raw hash fields into parsed records, skipping malformed values.
pub fn parse_route_hash(
    route_key: &str,
    fields: Vec<(String, String)>,
) -> Vec<LiveRouteVehicle> {
    fields
        .into_iter()
        .filter_map(|(vehicle_number, raw)| {
            match serde_json::from_str::<LiveVehicleRecord>(&raw) {
                Ok(record) => Some(LiveRouteVehicle {
                    vehicle_number,
                    record,
                }),
                Err(e) => {
                    warn!(
                        route_key,
                        vehicle_number,
                        error = %e,
                        "Skipping malformed live vehicle record"
                    );
                    None
                }
            }
        })
        .collect()
}
