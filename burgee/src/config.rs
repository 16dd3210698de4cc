use std::path::PathBuf;
use std::time::Duration;

use crate::{OfflineClient, Result};

/// Configuration for [`OfflineClient`].
///
/// # Examples
/// ```no_run
/// # use burgee::ClientConfig;
/// # fn test() -> burgee::Result<()> {
/// let client = ClientConfig::from_base_url("https://flags.example.com/api/v1")
///     .persist_path("/var/cache/burgee/snapshot.json")
///     .to_client()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) snapshot_ttl: Duration,
    pub(crate) auto_refresh: bool,
    pub(crate) refresh_interval: Duration,
    pub(crate) fetch_timeout: Duration,
    pub(crate) persist_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Default value for [`ClientConfig::snapshot_ttl`].
    pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);
    /// Default value for [`ClientConfig::refresh_interval`].
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`ClientConfig::fetch_timeout`].
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a default configuration for the API rooted at `base_url`
    /// (e.g. `https://host/api/v1`).
    ///
    /// ```
    /// # use burgee::ClientConfig;
    /// ClientConfig::from_base_url("https://flags.example.com/api/v1");
    /// ```
    pub fn from_base_url(base_url: impl Into<String>) -> ClientConfig {
        ClientConfig {
            base_url: base_url.into(),
            snapshot_ttl: ClientConfig::DEFAULT_SNAPSHOT_TTL,
            auto_refresh: true,
            refresh_interval: ClientConfig::DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: ClientConfig::DEFAULT_FETCH_TIMEOUT,
            persist_path: None,
        }
    }

    /// Update how long a fetched snapshot is considered fresh.
    ///
    /// Expiry is advisory: an expired snapshot is still served while refresh catches up.
    pub fn snapshot_ttl(mut self, snapshot_ttl: Duration) -> ClientConfig {
        self.snapshot_ttl = snapshot_ttl;
        self
    }

    /// Enable or disable the background refresh thread.
    ///
    /// With auto-refresh off, the snapshot is fetched once per [`OfflineClient::bootstrap`] (or
    /// explicit [`OfflineClient::refresh`]) call and never in the background.
    pub fn auto_refresh(mut self, auto_refresh: bool) -> ClientConfig {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Update the background refresh interval.
    pub fn refresh_interval(mut self, refresh_interval: Duration) -> ClientConfig {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Update the hard deadline for a single snapshot fetch.
    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> ClientConfig {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Persist every fetched snapshot to `persist_path`, and bootstrap from that file when the
    /// network is unavailable.
    pub fn persist_path(mut self, persist_path: impl Into<PathBuf>) -> ClientConfig {
        self.persist_path = Some(persist_path.into());
        self
    }

    /// Create a new [`OfflineClient`] using the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`](crate::Error::InvalidBaseUrl) if the base URL does not
    /// parse.
    pub fn to_client(self) -> Result<OfflineClient> {
        OfflineClient::new(self)
    }
}
