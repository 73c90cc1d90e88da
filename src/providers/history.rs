//! ClickHouse historical trail store, driven over its HTTP interface.
//!
//! Queries are POSTed as SQL with `JSONEachRow` output and parsed line by
//! line. Range bounds are wire-format civil-time strings; the caller is
//! responsible for producing them with `timefmt` so the stored `timestamp`
//! column compares correctly.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ClickHouseConfig;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Historical store request failed: {0}")]
    Network(String),
    #[error("Historical store returned an error: {0}")]
    Api(String),
    #[error("Historical store returned malformed rows: {0}")]
    Malformed(String),
}

/// One position sample row
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRow {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "vehicleNumber", default)]
    pub vehicle_number: Option<String>,
    #[serde(rename = "routeNumber", default)]
    pub route_number: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Wire civil-time format
    pub timestamp: String,
}

/// Per-provider distinct-device count over a window
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCount {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(rename = "deviceCount")]
    pub device_count: u64,
}

/// Read access to the historical store, behind a seam for engine tests.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// All points in `[start, end]`, optionally restricted to one device,
    /// ordered ascending by timestamp.
    async fn points_in_window(
        &self,
        start: &str,
        end: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryRow>, HistoryError>;

    /// Most recent points for a set of devices since `start`, ordered
    /// descending by timestamp and capped at `max_rows`.
    async fn recent_points(
        &self,
        device_ids: &[String],
        start: &str,
        max_rows: u32,
    ) -> Result<Vec<HistoryRow>, HistoryError>;

    /// Distinct devices per provider between `start` and `end`.
    async fn provider_counts(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<ProviderCount>, HistoryError>;
}

pub struct ClickHouseStore {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseStore {
    pub fn new(config: ClickHouseConfig) -> Result<Self, HistoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HistoryError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn query<T: serde::de::DeserializeOwned>(&self, sql: String) -> Result<Vec<T>, HistoryError> {
        tracing::debug!(sql = %sql, "Executing ClickHouse query");

        let mut request = self
            .client
            .post(&self.config.url)
            .query(&[("default_format", "JSONEachRow")])
            .body(sql);
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HistoryError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HistoryError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(HistoryError::Api(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        parse_json_each_row(&body)
    }
}

/// Parse a `JSONEachRow` response body: one JSON document per line.
fn parse_json_each_row<T: serde::de::DeserializeOwned>(body: &str) -> Result<Vec<T>, HistoryError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| HistoryError::Malformed(e.to_string())))
        .collect()
}

/// Escape a string value for interpolation into a single-quoted SQL literal.
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

#[async_trait]
impl HistorySource for ClickHouseStore {
    async fn points_in_window(
        &self,
        start: &str,
        end: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let mut sql = format!(
            "SELECT \
               deviceId, \
               vehicleNumber, \
               routeNumber, \
               provider, \
               toFloat64OrNull(toString(lat)) AS lat, \
               toFloat64OrNull(toString(long)) AS lng, \
               toString(timestamp) AS timestamp \
             FROM {} \
             WHERE timestamp >= {} AND timestamp <= {}",
            self.config.table,
            sql_quote(start),
            sql_quote(end),
        );
        if let Some(device_id) = device_id {
            sql.push_str(&format!(" AND deviceId = {}", sql_quote(device_id)));
        }
        sql.push_str(" ORDER BY timestamp ASC");

        let rows: Vec<HistoryRow> = self.query(sql).await?;
        tracing::debug!(rows = rows.len(), "Fetched historical points");
        Ok(rows)
    }

    async fn recent_points(
        &self,
        device_ids: &[String],
        start: &str,
        max_rows: u32,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = device_ids
            .iter()
            .map(|id| sql_quote(id))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT \
               deviceId, \
               vehicleNumber, \
               routeNumber, \
               provider, \
               toFloat64OrNull(toString(lat)) AS lat, \
               toFloat64OrNull(toString(long)) AS lng, \
               toString(timestamp) AS timestamp \
             FROM {} \
             WHERE timestamp >= {} AND deviceId IN ({}) \
             ORDER BY timestamp DESC \
             LIMIT {}",
            self.config.table,
            sql_quote(start),
            id_list,
            max_rows,
        );

        self.query(sql).await
    }

    async fn provider_counts(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<ProviderCount>, HistoryError> {
        let sql = format!(
            "SELECT provider, count(DISTINCT deviceId) AS deviceCount \
             FROM {} \
             WHERE timestamp >= {} AND timestamp <= {} \
               AND lat != 0 AND long != 0 AND deviceId != '' \
             GROUP BY provider \
             ORDER BY deviceCount DESC",
            self.config.table,
            sql_quote(start),
            sql_quote(end),
        );

        self.query(sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_quote_escapes_quotes_and_backslashes() {
        assert_eq!(sql_quote("d1"), "'d1'");
        assert_eq!(sql_quote("it's"), "'it''s'");
        assert_eq!(sql_quote(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn parses_json_each_row_body() {
        let body = concat!(
            r#"{"deviceId":"d1","vehicleNumber":"KA01","routeNumber":"335E","provider":"amnex","lat":12.9,"lng":77.6,"timestamp":"2026-08-28 10:00:00"}"#,
            "\n",
            r#"{"deviceId":"d2","vehicleNumber":null,"routeNumber":null,"provider":null,"lat":null,"lng":null,"timestamp":"2026-08-28 10:00:01"}"#,
            "\n",
        );
        let rows: Vec<HistoryRow> = parse_json_each_row(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device_id, "d1");
        assert_eq!(rows[0].lat, Some(12.9));
        assert_eq!(rows[1].vehicle_number, None);
        assert_eq!(rows[1].lat, None);
    }

    #[test]
    fn malformed_row_is_a_hard_error() {
        let body = "{\"deviceId\":\"d1\",\"timestamp\":\"2026-08-28 10:00:00\"}\nnot json\n";
        let result: Result<Vec<HistoryRow>, _> = parse_json_each_row(body);
        assert!(matches!(result, Err(HistoryError::Malformed(_))));
    }

    #[test]
    fn empty_body_parses_to_no_rows() {
        let rows: Vec<HistoryRow> = parse_json_each_row("").unwrap();
        assert!(rows.is_empty());
    }
}
