//! Clients for the three external stores: PostgreSQL identity mappings,
//! the Redis live-state store, and the ClickHouse historical trail store.

pub mod history;
pub mod live;
pub mod mappings;
