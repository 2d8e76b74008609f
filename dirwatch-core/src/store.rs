//! Persistence port for scan results.

use async_trait::async_trait;

use crate::error::Result;
use crate::result::ScanResult;

/// Durable storage for [`ScanResult`] records, keyed by `start_time`.
///
/// Implementations live outside the engine (the server crate provides a
/// Postgres-backed one); the supervisor only needs insert and range-query.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store one cycle result.
    async fn insert(&self, result: &ScanResult) -> Result<()>;

    /// Fetch up to `limit` results, newest first, optionally bounded below by
    /// an epoch-seconds `start_time`.
    async fn recent(&self, limit: i64, since: Option<i64>) -> Result<Vec<ScanResult>>;
}
