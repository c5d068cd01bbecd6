//! Backend abstraction.
//!
//! A [`GeoStore`] is opened once per run from the `db` property and hands
//! out one [`GeoSession`] per worker. Sessions own their connection and
//! release it on drop. Every native driver error is turned into a
//! [`StoreError`] inside the adapter, so callers only ever see statuses.

pub mod cache;
pub mod factory;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "neo4j")]
pub mod neo4j;
#[cfg(feature = "redis")]
pub mod redis;

use thiserror::Error as ThisError;
use crate::core::types::{GeoPoint, Status};

pub use cache::StatementCache;
pub use factory::{open_store, open_store_from_config, BackendKind};
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    /// The backend refused or failed the call. Recoverable.
    #[error("backend error: {0}")]
    Backend(String),
    /// The call went through but the backend reported an impossible outcome,
    /// e.g. zero rows affected by an insert.
    #[error("unexpected state: {0}")]
    UnexpectedState(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl Status {
    pub fn of<T>(result: &StoreResult<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(StoreError::Backend(_)) => Status::RecoverableError,
            Err(StoreError::UnexpectedState(_)) => Status::UnexpectedState,
        }
    }
}

/// Per-run handle to one backend.
pub trait GeoStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn open_session(&self) -> StoreResult<Box<dyn GeoSession>>;
}

/// Per-worker connection. Not shared between threads.
pub trait GeoSession: Send {
    /// Drops and recreates `table` together with its spatial index.
    fn reset(&mut self, table: &str) -> StoreResult<()>;

    /// Stores `point` under `key`, which the caller guarantees is unique.
    fn insert(&mut self, table: &str, key: &str, point: &GeoPoint) -> StoreResult<()>;

    /// At most `k` records, nearest first.
    fn scan_knn(&mut self, table: &str, lat: f64, lon: f64, k: usize) -> StoreResult<Vec<GeoPoint>>;

    /// Every record whose haversine distance from `(lat, lon)` is at most `max_km`.
    fn scan_by_distance(&mut self, table: &str, lat: f64, lon: f64, max_km: f64) -> StoreResult<Vec<GeoPoint>>;

    /// Every record inside or on `ring`. The ring may omit its closing vertex.
    fn scan_by_polygon(&mut self, table: &str, ring: &[GeoPoint]) -> StoreResult<Vec<GeoPoint>>;
}

/// Interpolated into statement text, so adapters only accept validated names.
pub(crate) fn checked_table(table: &str) -> StoreResult<&str> {
    crate::core::config::validate_identifier(table)
        .map(|_| table)
        .map_err(|e| StoreError::Backend(e.context))
}
