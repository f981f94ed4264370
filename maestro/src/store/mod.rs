//! Persistent run records keyed by runId.

mod sqlite;

pub use sqlite::SqliteRunStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::run::Run;

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Backend(String),
}

/// Run persistence contract: single-row atomic upserts by runId, listings
/// most-recent-first.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts or fully replaces the record for `run.run_id`.
    async fn upsert(&self, run: &Run) -> Result<(), StoreError>;

    async fn get(&self, run_id: &str) -> Result<Option<Run>, StoreError>;

    /// Removes the record; false when it did not exist.
    async fn delete(&self, run_id: &str) -> Result<bool, StoreError>;

    /// Most recent runs by `started_at` descending, up to `limit`
    /// (default [`DEFAULT_LIST_LIMIT`]).
    async fn list(&self, limit: Option<u32>) -> Result<Vec<Run>, StoreError>;
}
