//! Aggregation engine.
//!
//! Merges the live-state store and the historical trail store, resolving
//! identifiers through the mapping snapshot, behind the tiered result cache.
//! Two request shapes: a time-windowed multi-vehicle view and a route-scoped
//! live+trail view.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::cache::{self, Tier, TtlCache};
use crate::config::TrailConfig;
use crate::mappings::{IdentityMappings, MappingSync};
use crate::models::{Location, RouteVehicle, TrailPoint, VehicleView};
use crate::providers::history::{HistoryError, HistoryRow, HistorySource};
use crate::providers::live::{LiveRouteVehicle, LiveSource, LiveStoreError};
use crate::timefmt;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Upstream query failed: {0}")]
    Upstream(String),
}

impl From<LiveStoreError> for ServiceError {
    fn from(e: LiveStoreError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<HistoryError> for ServiceError {
    fn from(e: HistoryError) -> Self {
        Self::Upstream(e.to_string())
    }
}

/// A time-windowed multi-vehicle request
#[derive(Debug, Clone, Default)]
pub struct WindowQuery {
    /// Wire-format window start; defaults to five minutes before now
    pub start: Option<String>,
    /// Wire-format window end; absent means an implicit live request
    pub end: Option<String>,
    pub device_id: Option<String>,
    pub bypass_cache: bool,
}

/// Per-provider share of the tracked fleet reporting positions
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCoverage {
    pub provider: String,
    pub device_count: u64,
    /// Percentage of the configured fleet size
    pub coverage: f64,
}

/// Daily coverage statistics over the trailing 24 hours
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub total_devices: u64,
    pub provider_coverage: Vec<ProviderCoverage>,
    /// RFC 3339 instant this report was generated
    pub timestamp: String,
}

/// The aggregation engine. Owns the tiered result cache; constructed once at
/// startup and handed to request handlers by reference.
pub struct VehicleService {
    mappings: Arc<MappingSync>,
    live: Arc<dyn LiveSource>,
    history: Arc<dyn HistorySource>,
    window_cache: TtlCache<Vec<VehicleView>>,
    coverage_cache: TtlCache<CoverageReport>,
    /// Per-key in-flight locks so concurrent identical cache misses share one
    /// upstream query instead of issuing N
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timezone: Tz,
    trail: TrailConfig,
    fleet_size: u64,
}

impl VehicleService {
    pub fn new(
        mappings: Arc<MappingSync>,
        live: Arc<dyn LiveSource>,
        history: Arc<dyn HistorySource>,
        timezone: Tz,
        trail: TrailConfig,
        fleet_size: u64,
    ) -> Self {
        Self {
            mappings,
            live,
            history,
            window_cache: TtlCache::new(),
            coverage_cache: TtlCache::new(),
            inflight: Mutex::new(HashMap::new()),
            timezone,
            trail,
            fleet_size,
        }
    }

    /// Time-windowed multi-vehicle query.
    pub async fn vehicles_in_window(
        &self,
        query: &WindowQuery,
    ) -> Result<Vec<VehicleView>, ServiceError> {
        let now = Utc::now();
        let end_utc = self.parse_bound(query.end.as_deref())?;
        // Start is validated up front so a malformed bound becomes a 400, not
        // a garbled range query
        self.parse_bound(query.start.as_deref())?;

        let tier = Tier::classify(end_utc, now);
        let start_raw = query.start.as_deref();
        let end_raw = query.end.as_deref();
        let key = match &query.device_id {
            Some(device_id) => cache::device_key(device_id, start_raw, end_raw),
            None => cache::aggregate_key(tier, start_raw, end_raw),
        };

        if !query.bypass_cache {
            if let Some(hit) = self.window_cache.get(&key).await {
                return Ok(hit);
            }
            // A device-filtered request can serve from the aggregate entry
            // for the same window classification when no fresher per-device
            // entry exists
            if let Some(device_id) = &query.device_id {
                let aggregate_key = cache::aggregate_key(tier, start_raw, end_raw);
                if let Some(aggregate) = self.window_cache.get(&aggregate_key).await {
                    let filtered: Vec<VehicleView> = aggregate
                        .into_iter()
                        .filter(|v| v.device_id == *device_id)
                        .collect();
                    if !filtered.is_empty() {
                        return Ok(filtered);
                    }
                }
            }
        } else {
            tracing::debug!(key, "Cache bypass requested");
        }

        self.spawn_opportunistic_refresh();

        let lock = self.inflight_lock(&key).await;
        let _guard = lock.lock().await;
        // Another caller may have filled the entry while we waited
        if !query.bypass_cache {
            if let Some(hit) = self.window_cache.get(&key).await {
                self.release_inflight(&key).await;
                return Ok(hit);
            }
        }

        let result = self.fetch_window(query, now, tier, &key).await;
        self.release_inflight(&key).await;
        result
    }

    async fn fetch_window(
        &self,
        query: &WindowQuery,
        now: DateTime<Utc>,
        tier: Tier,
        key: &str,
    ) -> Result<Vec<VehicleView>, ServiceError> {
        let end_wire = query
            .end
            .clone()
            .unwrap_or_else(|| timefmt::format_wire(now, self.timezone));
        let start_wire = query
            .start
            .clone()
            .unwrap_or_else(|| timefmt::wire_minutes_ago(now, 5, self.timezone));

        info!(start = %start_wire, end = %end_wire, device_id = ?query.device_id, "Querying historical store");

        let rows = self
            .history
            .points_in_window(&start_wire, &end_wire, query.device_id.as_deref())
            .await?;

        let snapshot = self.mappings.snapshot().await;
        let vehicles = group_window_rows(rows, &snapshot);

        if !query.bypass_cache {
            let ttl = if query.device_id.is_some() {
                cache::device_ttl()
            } else {
                tier.ttl()
            };
            self.window_cache.set(key, vehicles.clone(), ttl).await;
        }

        Ok(vehicles)
    }

    /// Route-scoped live+trail query. `route_id` may be a route code or a
    /// human short name; the short-name→codes table is consulted only when
    /// the primary key yields nothing.
    pub async fn vehicles_on_route(
        &self,
        route_id: &str,
    ) -> Result<Vec<RouteVehicle>, ServiceError> {
        self.spawn_opportunistic_refresh();

        let mut matched: Vec<(String, LiveRouteVehicle)> = self
            .live
            .route_vehicles(&format!("route:{}", route_id))
            .await?
            .into_iter()
            .map(|v| (route_id.to_string(), v))
            .collect();

        if matched.is_empty() {
            let codes = self.mappings.codes_for(route_id).await;
            if !codes.is_empty() {
                info!(route_id, codes = ?codes, "No live vehicles under primary key, probing route codes");
                let keys: Vec<String> = codes.iter().map(|c| format!("route:{}", c)).collect();
                let results =
                    try_join_all(keys.iter().map(|key| self.live.route_vehicles(key))).await?;
                for (code, alternates) in codes.into_iter().zip(results) {
                    matched.extend(alternates.into_iter().map(|v| (code.clone(), v)));
                }
            }
        }

        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let mut vehicles = build_route_vehicles(matched, self.timezone);

        let device_ids: Vec<String> = vehicles.iter().map(|v| v.device_id.clone()).collect();
        let start = timefmt::wire_minutes_ago(Utc::now(), self.trail.window_minutes, self.timezone);
        match self
            .history
            .recent_points(&device_ids, &start, self.trail.max_rows)
            .await
        {
            Ok(rows) => attach_trails(&mut vehicles, rows),
            // Partial result: live positions without trails beat failing the
            // whole request
            Err(e) => {
                warn!(route_id, error = %e, "Trail lookup failed, returning vehicles without trails");
            }
        }

        Ok(vehicles)
    }

    /// Per-provider distinct-device counts over the trailing 24 hours.
    pub async fn daily_coverage(&self) -> Result<CoverageReport, ServiceError> {
        const COVERAGE_KEY: &str = "coverage_daily";

        if let Some(hit) = self.coverage_cache.get(COVERAGE_KEY).await {
            return Ok(hit);
        }

        let now = Utc::now();
        let start = timefmt::wire_minutes_ago(now, 24 * 60, self.timezone);
        let end = timefmt::format_wire(now, self.timezone);

        let counts = self.history.provider_counts(&start, &end).await?;
        let report = CoverageReport {
            total_devices: self.fleet_size,
            provider_coverage: counts
                .into_iter()
                .map(|c| ProviderCoverage {
                    provider: c.provider.unwrap_or_else(|| "unknown".to_string()),
                    device_count: c.device_count,
                    coverage: (c.device_count as f64 / self.fleet_size as f64 * 10000.0).round()
                        / 100.0,
                })
                .collect(),
            timestamp: now.to_rfc3339(),
        };

        self.coverage_cache
            .set(COVERAGE_KEY, report.clone(), chrono::Duration::minutes(5))
            .await;

        Ok(report)
    }

    /// Explicit eviction for the operator endpoint. `None` clears everything.
    pub async fn invalidate_cache(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => {
                let removed = self.window_cache.invalidate(key).await;
                self.coverage_cache.invalidate(key).await || removed
            }
            None => {
                self.window_cache.invalidate_all().await;
                self.coverage_cache.invalidate_all().await;
                true
            }
        }
    }

    /// Number of live result-cache entries, for the health endpoint.
    pub async fn cached_results(&self) -> usize {
        self.window_cache.len().await + self.coverage_cache.len().await
    }

    fn parse_bound(&self, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ServiceError> {
        match raw {
            None => Ok(None),
            Some(s) => timefmt::parse_wire(s, self.timezone)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .ok_or_else(|| {
                    ServiceError::InvalidQuery(format!(
                        "Timestamp '{}' is not in YYYY-MM-DD HH:MM:SS format",
                        s
                    ))
                }),
        }
    }

    /// Best-effort mapping refresh; throttled internally, never awaited in
    /// the request path.
    fn spawn_opportunistic_refresh(&self) {
        let mappings = Arc::clone(&self.mappings);
        tokio::spawn(async move {
            if let Err(e) = mappings.refresh(false).await {
                warn!(error = %e, "Opportunistic mapping refresh failed");
            }
        });
    }

    async fn inflight_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_inflight(&self, key: &str) {
        let mut inflight = self.inflight.lock().await;
        // Only the map and this caller hold the lock: safe to drop the entry
        if let Some(lock) = inflight.get(key) {
            if Arc::strong_count(lock) <= 2 {
                inflight.remove(key);
            }
        }
    }
}

/// Group historical rows by device into `VehicleView`s.
///
/// Points with null or zero coordinates are dropped; a device left with no
/// valid points produces no entry. The mapping snapshot's vehicle number
/// overrides the row's own value when present, and the route id resolves
/// transitively through it. Trails come out sorted ascending by timestamp.
fn group_window_rows(rows: Vec<HistoryRow>, mappings: &IdentityMappings) -> Vec<VehicleView> {
    let mut by_device: HashMap<String, VehicleView> = HashMap::new();

    for row in rows {
        let (lat, lng) = match (row.lat, row.lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => (lat, lng),
            _ => continue,
        };

        let view = by_device.entry(row.device_id.clone()).or_insert_with(|| {
            let vehicle_number = mappings
                .vehicle_for(&row.device_id)
                .map(str::to_string)
                .or_else(|| row.vehicle_number.clone());
            let route_id = vehicle_number
                .as_deref()
                .and_then(|v| mappings.route_for(v))
                .map(str::to_string);
            VehicleView {
                device_id: row.device_id.clone(),
                vehicle_number,
                route_number: row.route_number.clone(),
                provider: row.provider.clone(),
                route_id,
                trail: Vec::new(),
            }
        });

        view.trail.push(TrailPoint {
            lat,
            lng,
            timestamp: row.timestamp,
        });
    }

    let mut vehicles: Vec<VehicleView> = by_device.into_values().collect();
    for vehicle in &mut vehicles {
        // Wire-format strings sort lexicographically in time order
        vehicle.trail.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
    vehicles.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    vehicles
}

/// Build `RouteVehicle`s from live records, deduplicated by device id. The
/// probed route key stands in when a record lacks its own route id.
fn build_route_vehicles(matched: Vec<(String, LiveRouteVehicle)>, tz: Tz) -> Vec<RouteVehicle> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut vehicles = Vec::new();

    for (probed_route, live) in matched {
        if !seen.insert(live.record.device_id.clone()) {
            continue;
        }
        vehicles.push(RouteVehicle {
            device_id: live.record.device_id.clone(),
            vehicle_number: live.vehicle_number,
            route_id: live.record.route_id.clone().unwrap_or(probed_route),
            route_name: live.record.route_name.clone().unwrap_or_default(),
            provider: live.record.provider.clone(),
            last_seen: live
                .record
                .last_seen
                .and_then(|secs| timefmt::epoch_to_wire(secs, tz)),
            eta_data: live.record.eta_data.clone(),
            location: Location {
                lat: live.record.latitude,
                lng: live.record.longitude,
            },
            trail: Vec::new(),
        });
    }

    vehicles
}

/// Attach per-device trails from rows that arrived timestamp-descending.
fn attach_trails(vehicles: &mut [RouteVehicle], rows: Vec<HistoryRow>) {
    let mut by_device: HashMap<String, Vec<TrailPoint>> = HashMap::new();
    for row in rows {
        let (lat, lng) = match (row.lat, row.lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => (lat, lng),
            _ => continue,
        };
        by_device.entry(row.device_id).or_default().push(TrailPoint {
            lat,
            lng,
            timestamp: row.timestamp,
        });
    }

    for vehicle in vehicles {
        if let Some(mut trail) = by_device.remove(&vehicle.device_id) {
            trail.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            vehicle.trail = trail;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::MappingSource;
    use crate::providers::history::ProviderCount;
    use crate::providers::live::LiveVehicleRecord;
    use crate::providers::mappings::MappingStoreError;
    use async_trait::async_trait;
    use chrono_tz::Asia::Kolkata;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeMappingSource;

    #[async_trait]
    impl MappingSource for FakeMappingSource {
        async fn device_vehicle_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
            Ok(vec![("d1".into(), "KA01".into())])
        }
        async fn vehicle_route_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
            Ok(vec![("KA01".into(), "route9".into())])
        }
        async fn route_code_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
            Ok(vec![
                ("500A".into(), "R1".into()),
                ("500A".into(), "R2".into()),
            ])
        }
    }

    #[derive(Default)]
    struct FakeLive {
        routes: HashMap<String, Vec<LiveRouteVehicle>>,
    }

    #[async_trait]
    impl LiveSource for FakeLive {
        async fn route_vehicles(
            &self,
            route_key: &str,
        ) -> Result<Vec<LiveRouteVehicle>, LiveStoreError> {
            Ok(self.routes.get(route_key).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeHistory {
        window_rows: Vec<HistoryRow>,
        recent_rows: Vec<HistoryRow>,
        window_calls: AtomicUsize,
        fail_recent: AtomicBool,
    }

    #[async_trait]
    impl HistorySource for FakeHistory {
        async fn points_in_window(
            &self,
            _start: &str,
            _end: &str,
            device_id: Option<&str>,
        ) -> Result<Vec<HistoryRow>, HistoryError> {
            self.window_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .window_rows
                .iter()
                .filter(|r| device_id.map_or(true, |d| r.device_id == d))
                .cloned()
                .collect())
        }

        async fn recent_points(
            &self,
            device_ids: &[String],
            _start: &str,
            _max_rows: u32,
        ) -> Result<Vec<HistoryRow>, HistoryError> {
            if self.fail_recent.load(Ordering::SeqCst) {
                return Err(HistoryError::Network("connection refused".into()));
            }
            Ok(self
                .recent_rows
                .iter()
                .filter(|r| device_ids.contains(&r.device_id))
                .cloned()
                .collect())
        }

        async fn provider_counts(
            &self,
            _start: &str,
            _end: &str,
        ) -> Result<Vec<ProviderCount>, HistoryError> {
            Ok(vec![ProviderCount {
                provider: Some("amnex".into()),
                device_count: 1850,
            }])
        }
    }

    fn row(device_id: &str, lat: Option<f64>, lng: Option<f64>, timestamp: &str) -> HistoryRow {
        HistoryRow {
            device_id: device_id.to_string(),
            vehicle_number: None,
            route_number: Some("335E".to_string()),
            provider: Some("amnex".to_string()),
            lat,
            lng,
            timestamp: timestamp.to_string(),
        }
    }

    fn live_vehicle(vehicle_number: &str, device_id: &str) -> LiveRouteVehicle {
        LiveRouteVehicle {
            vehicle_number: vehicle_number.to_string(),
            record: LiveVehicleRecord {
                device_id: device_id.to_string(),
                route_id: Some("R1".to_string()),
                route_name: Some("500A".to_string()),
                provider: Some("amnex".to_string()),
                last_seen: Some(1756370000),
                eta_data: vec![],
                latitude: 12.97,
                longitude: 77.59,
            },
        }
    }

    async fn service_with(
        live: FakeLive,
        history: FakeHistory,
    ) -> (VehicleService, Arc<FakeHistory>) {
        let mappings = Arc::new(MappingSync::new(
            Arc::new(FakeMappingSource),
            std::time::Duration::from_secs(900),
        ));
        mappings.refresh(true).await.unwrap();
        let history = Arc::new(history);
        let service = VehicleService::new(
            mappings,
            Arc::new(live),
            history.clone(),
            Kolkata,
            TrailConfig::default(),
            3700,
        );
        (service, history)
    }

    #[tokio::test]
    async fn window_query_resolves_mappings_and_builds_trail() {
        let history = FakeHistory {
            window_rows: vec![row("d1", Some(12.9), Some(77.6), "2026-08-28 10:00:00")],
            ..Default::default()
        };
        let (service, _) = service_with(FakeLive::default(), history).await;

        let result = service
            .vehicles_in_window(&WindowQuery {
                start: Some("2026-08-28 09:00:00".into()),
                end: Some("2026-08-28 10:00:00".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        let v = &result[0];
        assert_eq!(v.device_id, "d1");
        assert_eq!(v.vehicle_number.as_deref(), Some("KA01"));
        assert_eq!(v.route_id.as_deref(), Some("route9"));
        assert_eq!(
            v.trail,
            vec![TrailPoint {
                lat: 12.9,
                lng: 77.6,
                timestamp: "2026-08-28 10:00:00".into()
            }]
        );
    }

    #[tokio::test]
    async fn second_identical_query_is_served_from_cache() {
        let history = FakeHistory {
            window_rows: vec![row("d1", Some(12.9), Some(77.6), "2026-08-28 10:00:00")],
            ..Default::default()
        };
        let (service, history) = service_with(FakeLive::default(), history).await;

        let query = WindowQuery::default(); // implicit live request
        service.vehicles_in_window(&query).await.unwrap();
        service.vehicles_in_window(&query).await.unwrap();
        assert_eq!(history.window_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bypass_cache_always_queries_and_skips_fill() {
        let history = FakeHistory {
            window_rows: vec![row("d1", Some(12.9), Some(77.6), "2026-08-28 10:00:00")],
            ..Default::default()
        };
        let (service, history) = service_with(FakeLive::default(), history).await;

        let query = WindowQuery {
            bypass_cache: true,
            ..Default::default()
        };
        service.vehicles_in_window(&query).await.unwrap();
        service.vehicles_in_window(&query).await.unwrap();
        assert_eq!(history.window_calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.cached_results().await, 0);
    }

    #[tokio::test]
    async fn device_request_can_filter_the_aggregate_entry() {
        let history = FakeHistory {
            window_rows: vec![
                row("d1", Some(12.9), Some(77.6), "2026-08-28 10:00:00"),
                row("d2", Some(13.0), Some(77.7), "2026-08-28 10:00:01"),
            ],
            ..Default::default()
        };
        let (service, history) = service_with(FakeLive::default(), history).await;

        // Fill the shared realtime entry, then ask for one device
        service.vehicles_in_window(&WindowQuery::default()).await.unwrap();
        let result = service
            .vehicles_in_window(&WindowQuery {
                device_id: Some("d2".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].device_id, "d2");
        assert_eq!(history.window_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_points_and_empty_devices_are_dropped() {
        let history = FakeHistory {
            window_rows: vec![
                // d1: one valid point among sentinels, out of order
                row("d1", Some(12.9), Some(77.6), "2026-08-28 10:00:05"),
                row("d1", Some(0.0), Some(77.6), "2026-08-28 10:00:06"),
                row("d1", None, Some(77.6), "2026-08-28 10:00:07"),
                row("d1", Some(12.8), Some(77.5), "2026-08-28 10:00:01"),
                // d2: nothing valid, must not appear at all
                row("d2", Some(0.0), Some(0.0), "2026-08-28 10:00:02"),
                row("d2", None, None, "2026-08-28 10:00:03"),
            ],
            ..Default::default()
        };
        let (service, _) = service_with(FakeLive::default(), history).await;

        let result = service
            .vehicles_in_window(&WindowQuery {
                start: Some("2026-08-28 09:00:00".into()),
                end: Some("2026-08-28 11:00:00".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        let timestamps: Vec<&str> = result[0].trail.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["2026-08-28 10:00:01", "2026-08-28 10:00:05"]);
    }

    #[tokio::test]
    async fn malformed_timestamp_is_an_invalid_query() {
        let (service, _) = service_with(FakeLive::default(), FakeHistory::default()).await;
        let err = service
            .vehicles_in_window(&WindowQuery {
                end: Some("28/08/2026 10:00".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn route_query_attaches_ascending_trails() {
        let mut live = FakeLive::default();
        live.routes
            .insert("route:R1".into(), vec![live_vehicle("KA03", "d3")]);
        let history = FakeHistory {
            // Descending arrival order, as the store returns them
            recent_rows: vec![
                row("d3", Some(12.98), Some(77.60), "2026-08-28 10:05:00"),
                row("d3", Some(12.97), Some(77.59), "2026-08-28 10:00:00"),
            ],
            ..Default::default()
        };
        let (service, _) = service_with(live, history).await;

        let result = service.vehicles_on_route("R1").await.unwrap();
        assert_eq!(result.len(), 1);
        let v = &result[0];
        assert_eq!(v.vehicle_number, "KA03");
        assert_eq!(v.route_id, "R1");
        assert_eq!(v.last_seen.as_deref(), Some("2025-08-28 14:03:20"));
        let timestamps: Vec<&str> = v.trail.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["2026-08-28 10:00:00", "2026-08-28 10:05:00"]);
    }

    #[tokio::test]
    async fn short_name_falls_back_to_route_codes() {
        let mut live = FakeLive::default();
        // Vehicles live under route:R1 only; neither route:500A nor route:R2
        live.routes
            .insert("route:R1".into(), vec![live_vehicle("KA03", "d3")]);
        let (service, _) = service_with(live, FakeHistory::default()).await;

        let result = service.vehicles_on_route("500A").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].vehicle_number, "KA03");
    }

    #[tokio::test]
    async fn unknown_route_returns_empty_list() {
        let (service, _) = service_with(FakeLive::default(), FakeHistory::default()).await;
        let result = service.vehicles_on_route("999X").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn trail_store_failure_degrades_to_vehicles_without_trails() {
        let mut live = FakeLive::default();
        live.routes
            .insert("route:R1".into(), vec![live_vehicle("KA03", "d3")]);
        let history = FakeHistory::default();
        history.fail_recent.store(true, Ordering::SeqCst);
        let (service, _) = service_with(live, history).await;

        let result = service.vehicles_on_route("R1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].trail.is_empty());
    }

    #[tokio::test]
    async fn union_across_codes_dedupes_by_device() {
        let mut live = FakeLive::default();
        live.routes
            .insert("route:R1".into(), vec![live_vehicle("KA03", "d3")]);
        live.routes.insert(
            "route:R2".into(),
            vec![live_vehicle("KA03", "d3"), live_vehicle("KA04", "d4")],
        );
        let (service, _) = service_with(live, FakeHistory::default()).await;

        let mut result = service.vehicles_on_route("500A").await.unwrap();
        result.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].device_id, "d3");
        assert_eq!(result[1].device_id, "d4");
    }

    #[tokio::test]
    async fn coverage_report_is_cached_under_fixed_key() {
        let (service, _) = service_with(FakeLive::default(), FakeHistory::default()).await;
        let report = service.daily_coverage().await.unwrap();
        assert_eq!(report.total_devices, 3700);
        assert_eq!(report.provider_coverage.len(), 1);
        assert_eq!(report.provider_coverage[0].provider, "amnex");
        assert_eq!(report.provider_coverage[0].coverage, 50.0);

        assert!(service.invalidate_cache(Some("coverage_daily")).await);
        assert!(!service.invalidate_cache(Some("coverage_daily")).await);
    }
}
