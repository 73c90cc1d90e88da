use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// PostgreSQL connection URL for the identity-mapping tables
    pub postgres_url: String,
    /// Redis connection URL for the live vehicle-state store
    pub redis_url: String,
    /// ClickHouse historical store connection
    pub clickhouse: ClickHouseConfig,
    /// IANA timezone name for the wire civil-time convention (default: Asia/Kolkata)
    #[serde(default = "Config::default_timezone")]
    pub timezone: String,
    /// Identity-mapping refresh configuration
    #[serde(default)]
    pub mapping_sync: MappingSyncConfig,
    /// Route-scoped trail query configuration
    #[serde(default)]
    pub trail: TrailConfig,
    /// OSRM routing server base URL for the directions proxy
    #[serde(default = "Config::default_osrm_server")]
    pub osrm_server: String,
    /// Total tracked fleet size, the denominator for coverage percentages
    #[serde(default = "Config::default_fleet_size")]
    pub fleet_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP interface URL (e.g. http://localhost:8123)
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Fully-qualified table holding position samples
    #[serde(default = "ClickHouseConfig::default_table")]
    pub table: String,
}

impl ClickHouseConfig {
    fn default_table() -> String {
        "atlas_kafka.amnex_direct_data".to_string()
    }
}

/// Configuration for the periodic identity-mapping refresh
#[derive(Debug, Clone, Deserialize)]
pub struct MappingSyncConfig {
    /// Minimum interval in seconds between mapping refreshes (default: 900)
    #[serde(default = "MappingSyncConfig::default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for MappingSyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: Self::default_refresh_interval_secs(),
        }
    }
}

impl MappingSyncConfig {
    fn default_refresh_interval_secs() -> u64 {
        15 * 60
    }
}

/// Configuration for the trailing-window trail lookup on route queries
#[derive(Debug, Clone, Deserialize)]
pub struct TrailConfig {
    /// Trailing window in minutes (default: 30)
    #[serde(default = "TrailConfig::default_window_minutes")]
    pub window_minutes: i64,
    /// Maximum rows fetched per trail query (default: 5000)
    #[serde(default = "TrailConfig::default_max_rows")]
    pub max_rows: u32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            window_minutes: Self::default_window_minutes(),
            max_rows: Self::default_max_rows(),
        }
    }
}

impl TrailConfig {
    fn default_window_minutes() -> i64 {
        30
    }
    fn default_max_rows() -> u32 {
        5000
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse the configured timezone name into a chrono-tz timezone.
    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::ParseError(format!("Unknown timezone: {}", self.timezone)))
    }

    fn default_timezone() -> String {
        "Asia/Kolkata".to_string()
    }

    fn default_osrm_server() -> String {
        "https://router.project-osrm.org".to_string()
    }

    fn default_fleet_size() -> u64 {
        3700
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_applies_defaults() {
        let yaml = r#"
cors_permissive: true
postgres_url: postgres://localhost/atlas
redis_url: redis://localhost:6379
clickhouse:
  url: http://localhost:8123
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timezone, "Asia/Kolkata");
        assert_eq!(config.mapping_sync.refresh_interval_secs, 900);
        assert_eq!(config.trail.window_minutes, 30);
        assert_eq!(config.trail.max_rows, 5000);
        assert_eq!(config.clickhouse.table, "atlas_kafka.amnex_direct_data");
        assert_eq!(config.fleet_size, 3700);
        assert!(config.timezone().is_ok());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let yaml = r#"
cors_permissive: true
postgres_url: postgres://localhost/atlas
redis_url: redis://localhost:6379
clickhouse:
  url: http://localhost:8123
timezone: Mars/Olympus
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.timezone().is_err());
    }
}
