//! The seam between the snapshot cache and wherever flags actually live.
use async_trait::async_trait;

use crate::models::Flag;
use crate::Result;

/// A source of flag configuration.
///
/// The refresher pulls the full flag set through this trait, so the cache machinery is
/// independent of where flags come from: the HTTP [`SnapshotFetcher`](crate::fetcher::SnapshotFetcher)
/// implements it for SDK use, and embedding services implement it over their persistence layer.
///
/// Implementations should return every flag, enabled or not, fully preloaded (segments,
/// constraints, distributions, variants).
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the complete flag set.
    ///
    /// Errors are recoverable from the cache's point of view: the previous snapshot stays in
    /// service and the fetch is retried on the next cycle. Wrap custom error types with
    /// [`Error::from_source`](crate::Error::from_source).
    async fn fetch_flags(&self) -> Result<Vec<Flag>>;
}
