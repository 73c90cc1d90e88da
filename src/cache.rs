//! Tiered in-memory result cache.
//!
//! A generic TTL-keyed store plus the recency classification and key scheme
//! used by the windowed vehicle query. Expiry is evaluated lazily at read
//! time; `get` deletes an expired entry and reports a miss. There is no
//! background sweep.
//!
//! All "recent" aggregate requests (window ending within the last five
//! minutes) collapse onto the single `vehicles_realtime` key, so live
//! dashboard polling shares one upstream query. Historical requests are
//! reproducible and cache under their exact bounds.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// TTL for a device-scoped result
pub fn device_ttl() -> Duration {
    Duration::seconds(10)
}

/// Cache-freshness classification of a query's time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Recent,
    Historical,
}

impl Tier {
    /// Classify a window end against `now`.
    ///
    /// `Recent` when the window ends within the last five minutes and not in
    /// the future; no window end means an implicit live request.
    pub fn classify(window_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match window_end {
            None => Self::Recent,
            Some(end) => {
                if end <= now && end > now - Duration::minutes(5) {
                    Self::Recent
                } else {
                    Self::Historical
                }
            }
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            Self::Recent => Duration::seconds(30),
            Self::Historical => Duration::minutes(5),
        }
    }
}

/// Cache key for a device-scoped windowed request.
pub fn device_key(device_id: &str, start: Option<&str>, end: Option<&str>) -> String {
    format!(
        "vehicle_{}_{}_{}",
        device_id,
        start.unwrap_or("default"),
        end.unwrap_or("default")
    )
}

/// Cache key for an aggregate windowed request.
pub fn aggregate_key(tier: Tier, start: Option<&str>, end: Option<&str>) -> String {
    match tier {
        Tier::Recent => "vehicles_realtime".to_string(),
        Tier::Historical => format!(
            "vehicles_{}_{}",
            start.unwrap_or("default"),
            end.unwrap_or("default")
        ),
    }
}

struct CacheEntry<T> {
    data: T,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Generic TTL-keyed store with lazy read-time eviction.
///
/// `get` and `set` are compound check-then-act operations; each runs entirely
/// under the map's write lock, so concurrent callers never observe a
/// half-applied step for the same key.
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now()).await
    }

    /// Read with an explicit notion of "now". Evicts and misses when the
    /// entry expired before `now`.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            None => {
                tracing::debug!(key, "Cache miss");
                None
            }
            Some(entry) if now > entry.expires_at => {
                let age_secs = (now - entry.created_at).num_seconds();
                tracing::debug!(key, age_secs, "Cache expired");
                entries.remove(key);
                None
            }
            Some(entry) => {
                tracing::debug!(key, "Cache hit");
                Some(entry.data.clone())
            }
        }
    }

    pub async fn set(&self, key: &str, data: T, ttl: Duration) {
        self.set_at(key, data, ttl, Utc::now()).await;
    }

    /// Store with an explicit creation time. Overwrites any existing entry.
    pub async fn set_at(&self, key: &str, data: T, ttl: Duration, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        tracing::debug!(key, ttl_secs = ttl.num_seconds(), "Cached data");
    }

    /// Remove one entry. Returns whether anything was evicted.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            tracing::info!(key, "Cache invalidated");
        }
        removed
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
        tracing::info!("All cache entries invalidated");
    }

    /// Number of stored entries, including any not yet lazily evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
