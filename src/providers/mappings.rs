//! Read-only PostgreSQL access to the identity-mapping tables.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::mappings::MappingSource;

#[derive(Debug, Error)]
pub enum MappingStoreError {
    #[error("Mapping store query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for MappingStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// PostgreSQL-backed implementation of the mapping source.
///
/// The pool is created lazily by the caller, so a store outage at startup
/// surfaces here as per-read errors rather than aborting the process.
pub struct PostgresMappingStore {
    pool: PgPool,
}

impl PostgresMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingSource for PostgresMappingStore {
    async fn device_vehicle_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT device_id, vehicle_no FROM atlas_app.device_vehicle_mapping",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn vehicle_route_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT vehicle_no, route_id FROM atlas_app.vehicle_route_mapping",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn route_code_pairs(&self) -> Result<Vec<(String, String)>, MappingStoreError> {
        // Ordered so each short name's code list is deterministic
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT short_name, code FROM atlas_app.route ORDER BY short_name, code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
