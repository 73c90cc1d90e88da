//! Identity-mapping cache.
//!
//! Translates low-level device identifiers into business identifiers
//! (device→vehicle, vehicle→route) and resolves human-facing route short
//! names into the route codes used as live-store keys.
//!
//! The three maps load together from the relational store and are swapped in
//! as one snapshot: a refresh either replaces all three atomically or changes
//! none (fail-soft). Lookups always answer off the last-good snapshot and
//! never trigger a refresh themselves.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::providers::mappings::MappingStoreError;

/// Immutable snapshot of the three lookup tables. Replaced wholesale on a
/// successful refresh; readers clone the `Arc` and keep a consistent view.
#[derive(Debug, Default)]
pub struct IdentityMappings {
    device_to_vehicle: HashMap<String, String>,
    vehicle_to_route: HashMap<String, String>,
    short_name_to_codes: HashMap<String, Vec<String>>,
}

impl IdentityMappings {
    pub fn new(
        device_to_vehicle: HashMap<String, String>,
        vehicle_to_route: HashMap<String, String>,
        short_name_to_codes: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            device_to_vehicle,
            vehicle_to_route,
            short_name_to_codes,
        }
    }

    pub fn vehicle_for(&self, device_id: &str) -> Option<&str> {
        self.device_to_vehicle.get(device_id).map(String::as_str)
    }

    pub fn route_for(&self, vehicle_no: &str) -> Option<&str> {
        self.vehicle_to_route.get(vehicle_no).map(String::as_str)
    }

    /// Route codes for a short name, in load order. Empty if unknown.
    pub fn codes_for(&self, short_name: &str) -> &[String] {
        self.short_name_to_codes
            .get(short_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn device_vehicle_count(&self) -> usize {
        self.device_to_vehicle.len()
    }

    pub fn vehicle_route_count(&self) -> usize {
        self.vehicle_to_route.len()
    }

    pub fn route_code_count(&self) -> usize {
        self.short_name_to_codes.len()
    }
}

/// Read access to the relational mapping tables. The seam exists so the
/// refresh logic is testable without a database.
#[async_trait]
pub trait MappingSource: Send + Sync {
    /// `(device_id, vehicle_no)` pairs
    async fn device_vehicle_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError>;
    /// `(vehicle_no, route_id)` pairs
    async fn vehicle_route_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError>;
    /// `(short_name, code)` pairs, ordered by short name then code
    async fn route_code_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError>;
}

/// Stats returned by a refresh, also served by the operator endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshStats {
    /// Whether this call actually fetched; false when throttled
    pub refreshed: bool,
    pub device_vehicle_mappings: usize,
    pub vehicle_route_mappings: usize,
    pub route_code_mappings: usize,
    /// RFC 3339 instant of the last successful refresh, if any
    pub last_refreshed: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MappingRefreshError {
    #[error("Mapping refresh failed: {0}")]
    Store(#[from] MappingStoreError),
}

/// Owns the mapping snapshot and its refresh lifecycle.
pub struct MappingSync {
    source: Arc<dyn MappingSource>,
    mappings: RwLock<Arc<IdentityMappings>>,
    last_refreshed: RwLock<Option<DateTime<Utc>>>,
    refresh_interval: Duration,
}

impl MappingSync {
    pub fn new(source: Arc<dyn MappingSource>, refresh_interval: std::time::Duration) -> Self {
        Self {
            source,
            mappings: RwLock::new(Arc::new(IdentityMappings::default())),
            last_refreshed: RwLock::new(None),
            refresh_interval: Duration::from_std(refresh_interval)
                .unwrap_or_else(|_| Duration::minutes(15)),
        }
    }

    /// Current snapshot. Cheap; callers hold a consistent view of all three
    /// maps for as long as they keep the `Arc`.
    pub async fn snapshot(&self) -> Arc<IdentityMappings> {
        self.mappings.read().await.clone()
    }

    pub async fn vehicle_for(&self, device_id: &str) -> Option<String> {
        self.snapshot().await.vehicle_for(device_id).map(str::to_string)
    }

    pub async fn route_for(&self, vehicle_no: &str) -> Option<String> {
        self.snapshot().await.route_for(vehicle_no).map(str::to_string)
    }

    pub async fn codes_for(&self, short_name: &str) -> Vec<String> {
        self.snapshot().await.codes_for(short_name).to_vec()
    }

    /// Refresh the snapshot from the relational store.
    ///
    /// When not forced and the last successful refresh is younger than the
    /// refresh interval, this is a no-op returning current stats. All three
    /// table reads must succeed before anything is swapped in; any failure
    /// leaves the previous snapshot untouched.
    pub async fn refresh(&self, force: bool) -> Result<RefreshStats, MappingRefreshError> {
        let now = Utc::now();

        if !force {
            let last = *self.last_refreshed.read().await;
            if let Some(last) = last {
                if now - last < self.refresh_interval {
                    tracing::debug!("Mapping tables recently refreshed, skipping update");
                    return Ok(self.stats(false).await);
                }
            }
        }

        info!("Refreshing mapping tables from relational store");

        let device_vehicle = self.source.device_vehicle_pairs().await?;
        let vehicle_route = self.source.vehicle_route_pairs().await?;
        let route_codes = self.source.route_code_pairs().await?;

        let device_to_vehicle: HashMap<String, String> = device_vehicle.into_iter().collect();
        let vehicle_to_route: HashMap<String, String> = vehicle_route.into_iter().collect();
        let mut short_name_to_codes: HashMap<String, Vec<String>> = HashMap::new();
        for (short_name, code) in route_codes {
            short_name_to_codes.entry(short_name).or_default().push(code);
        }

        let snapshot = Arc::new(IdentityMappings::new(
            device_to_vehicle,
            vehicle_to_route,
            short_name_to_codes,
        ));

        info!(
            device_vehicle = snapshot.device_vehicle_count(),
            vehicle_route = snapshot.vehicle_route_count(),
            route_codes = snapshot.route_code_count(),
            "Loaded identity mappings"
        );

        // Single swap point: readers see either the old or the new snapshot
        *self.mappings.write().await = snapshot;
        *self.last_refreshed.write().await = Some(now);

        Ok(self.stats(true).await)
    }

    async fn stats(&self, refreshed: bool) -> RefreshStats {
        let snapshot = self.snapshot().await;
        RefreshStats {
            refreshed,
            device_vehicle_mappings: snapshot.device_vehicle_count(),
            vehicle_route_mappings: snapshot.vehicle_route_count(),
            route_code_mappings: snapshot.route_code_count(),
            last_refreshed: self.last_refreshed.read().await.map(|t| t.to_rfc3339()),
        }
    }

    /// Run the periodic refresh loop. The timer enforces cadence, so each
    /// tick forces a fetch; failures keep the previous snapshot and the loop
    /// keeps running.
    pub async fn start(self: Arc<Self>) {
        let period = self
            .refresh_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(15 * 60));
        info!(interval_secs = period.as_secs(), "Starting mapping refresh loop");

        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = self.refresh(true).await {
                // Fail-soft: previous snapshot retained, lookups unaffected
                error!(error = %e, "Mapping refresh failed, keeping previous snapshot");
            }
        }
    }
}
