use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use burgee_core::eval::{self, EvalResult};
use burgee_core::fetcher::SnapshotFetcher;
use burgee_core::refresher::{RefreshConfig, RefreshThread};
use burgee_core::snapshot_store::SnapshotStore;
use burgee_core::{Error, EvalRequest, Flag, Result, Snapshot, SnapshotSource};

use crate::storage::SnapshotFile;
use crate::ClientConfig;

/// How many times a bootstrap through the refresh thread retries the initial fetch before the
/// persisted-file fallback kicks in.
const BOOTSTRAP_RETRY_ATTEMPTS: u32 = 3;
const BOOTSTRAP_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

/// Lets the client and its refresh thread share one source.
struct SharedSource(Arc<dyn SnapshotSource>);

#[async_trait]
impl SnapshotSource for SharedSource {
    async fn fetch_flags(&self) -> Result<Vec<Flag>> {
        self.0.fetch_flags().await
    }
}

/// Writes every successfully fetched flag set through to the snapshot file.
struct PersistingSource {
    inner: Box<dyn SnapshotSource>,
    file: SnapshotFile,
}

#[async_trait]
impl SnapshotSource for PersistingSource {
    async fn fetch_flags(&self) -> Result<Vec<Flag>> {
        let flags = self.inner.fetch_flags().await?;
        // Persistence is best-effort: a full disk must not take flag serving down.
        if let Err(err) = self.file.save(&flags) {
            log::warn!(target: "burgee", "failed to persist snapshot: {err}");
        }
        Ok(flags)
    }
}

/// An offline-first feature flag client.
///
/// The client bootstraps a snapshot of every flag from the server's export endpoint, evaluates
/// locally against it, and (by default) keeps it fresh with a background refresh thread. When
/// the network is down it keeps serving the snapshot it has, even past its TTL; with a persist
/// path configured it can bootstrap from the last written file without any network at all.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```no_run
/// # fn test() -> burgee::Result<()> {
/// let mut client = burgee::ClientConfig::from_base_url("https://flags.example.com/api/v1")
///     .persist_path("/var/cache/burgee/snapshot.json")
///     .to_client()?;
/// client.bootstrap(false)?;
///
/// let request = burgee::EvalRequest::by_flag_key(
///     "checkout-redesign",
///     burgee::EvalContext::new("user123"),
/// );
/// let result = client.evaluate(&request)?;
/// println!("assigned variant: {:?}", result.variant_key);
/// # Ok(())
/// # }
/// ```
pub struct OfflineClient {
    store: Arc<SnapshotStore>,
    source: Arc<dyn SnapshotSource>,
    refresh_thread: Option<RefreshThread>,
    storage: Option<SnapshotFile>,
    config: ClientConfig,
    bootstrapped: bool,
}

impl OfflineClient {
    pub(crate) fn new(config: ClientConfig) -> Result<OfflineClient> {
        let fetcher = SnapshotFetcher::new(&config.base_url)?;
        Ok(OfflineClient::with_source(fetcher, config))
    }

    /// Create a client over a custom snapshot source instead of the HTTP fetcher (e.g. flags
    /// bundled with the application).
    pub fn with_source(
        source: impl SnapshotSource + 'static,
        config: ClientConfig,
    ) -> OfflineClient {
        let storage = config.persist_path.clone().map(SnapshotFile::new);

        let inner: Box<dyn SnapshotSource> = Box::new(source);
        let source: Arc<dyn SnapshotSource> = match storage.clone() {
            Some(file) => Arc::new(PersistingSource { inner, file }),
            None => Arc::from(inner),
        };

        OfflineClient {
            store: Arc::new(SnapshotStore::new()),
            source,
            refresh_thread: None,
            storage,
            config,
            bootstrapped: false,
        }
    }

    /// Load the initial snapshot and, with auto-refresh enabled, start the background refresh
    /// thread.
    ///
    /// A no-op when already bootstrapped, unless `force_refresh` is set, in which case a fresh
    /// fetch happens now. If the fetch fails but a persisted snapshot file is configured and
    /// readable, the client bootstraps from the file instead (even an expired one); the
    /// background thread keeps trying the network and replaces the file snapshot once it
    /// recovers.
    ///
    /// # Errors
    ///
    /// Returns an error only when no snapshot could be obtained from any source:
    ///
    /// - [`Error::InitialLoadFailed`] if the network fetch exhausted its attempts.
    /// - [`Error::FetchTimeout`] if a direct fetch (auto-refresh off) timed out.
    /// - Transport and decode errors from a direct fetch.
    pub fn bootstrap(&mut self, force_refresh: bool) -> Result<()> {
        if self.bootstrapped && !force_refresh {
            log::debug!(target: "burgee", "client already bootstrapped");
            return Ok(());
        }

        let fetched = if self.config.auto_refresh {
            self.start_refresh_thread()
        } else {
            self.refresh()
        };

        match fetched {
            Ok(()) => {
                self.bootstrapped = true;
                Ok(())
            }
            Err(err) => {
                // A stale local snapshot beats no snapshot at all.
                if let Some(snapshot) = self.load_persisted() {
                    log::warn!(target: "burgee",
                        "bootstrap fetch failed, serving persisted snapshot: {err}");
                    self.store.set_snapshot(Arc::new(snapshot));
                    self.bootstrapped = true;
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Whether a snapshot has been obtained from any source.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Fetch a snapshot now, replacing the current one on success.
    ///
    /// # Errors
    ///
    /// - [`Error::FetchTimeout`] if the fetch exceeded the configured timeout.
    /// - Transport and decode errors from the source.
    pub fn refresh(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let flags = runtime.block_on(async {
            tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_flags())
                .await
                .map_err(|_elapsed| Error::FetchTimeout)?
        })?;

        self.store
            .set_snapshot(Arc::new(Snapshot::new(flags, self.config.snapshot_ttl)));
        Ok(())
    }

    /// Evaluate a request against the current snapshot.
    ///
    /// An expired snapshot is still evaluated against; staleness never fails a request.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no snapshot has been obtained yet (see
    ///   [`OfflineClient::bootstrap`]).
    pub fn evaluate(&self, request: &EvalRequest) -> Result<EvalResult> {
        eval::evaluate(self.current_snapshot().as_deref(), request)
    }

    /// Evaluate a batch of requests against one consistent snapshot.
    pub fn evaluate_batch(&self, requests: &[EvalRequest]) -> Result<Vec<EvalResult>> {
        eval::evaluate_batch(self.current_snapshot().as_deref(), requests)
    }

    /// Get the current snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.snapshot()
    }

    /// Signal the background refresh thread to stop without waiting for it.
    pub fn stop(&self) {
        if let Some(thread) = &self.refresh_thread {
            thread.stop();
        }
    }

    /// Stop the background refresh thread and wait for it to exit.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.refresh_thread.take() {
            Some(thread) => thread.shutdown(),
            None => Ok(()),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        let snapshot = self.store.snapshot();
        if let Some(snapshot) = &snapshot {
            if snapshot.is_expired(Utc::now()) {
                log::debug!(target: "burgee", "serving expired snapshot");
            }
        }
        snapshot
    }

    fn start_refresh_thread(&mut self) -> Result<()> {
        if self.refresh_thread.is_some() {
            // Forced re-bootstrap with the thread already polling: fetch now instead of
            // waiting out the interval.
            return self.refresh();
        }

        let thread = RefreshThread::start(
            Box::new(SharedSource(Arc::clone(&self.source))),
            Arc::clone(&self.store),
            self.refresh_config(),
        )?;
        let ready = thread.wait_until_ready();
        self.refresh_thread = Some(thread);
        ready
    }

    fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::new()
            .with_interval(self.config.refresh_interval)
            .with_timeout(self.config.fetch_timeout)
            .with_snapshot_ttl(self.config.snapshot_ttl)
            .with_initial_retry(BOOTSTRAP_RETRY_ATTEMPTS, BOOTSTRAP_RETRY_DELAY)
    }

    fn load_persisted(&self) -> Option<Snapshot> {
        let file = self.storage.as_ref()?;
        match file.load(self.config.snapshot_ttl) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!(target: "burgee", "persisted snapshot unavailable: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::OfflineClient;
    use crate::storage::SnapshotFile;
    use crate::ClientConfig;
    use burgee_core::eval_cache::EvalCache;
    use burgee_core::refresher::RefreshConfig;
    use burgee_core::{
        Distribution, Error, EvalContext, EvalRequest, Flag, Result, Segment, SnapshotSource,
        Variant,
    };

    struct CountingSource {
        calls: Arc<AtomicU32>,
        flags: Vec<Flag>,
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.flags.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "offline",
            )))
        }
    }

    /// First fetch succeeds, later ones fail.
    struct FlakySource {
        calls: Arc<AtomicU32>,
        flags: Vec<Flag>,
    }

    #[async_trait]
    impl SnapshotSource for FlakySource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(self.flags.clone())
            } else {
                Err(Error::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "offline",
                )))
            }
        }
    }

    fn checkout_flag() -> Flag {
        Flag {
            id: 1,
            key: "checkout".to_owned(),
            enabled: true,
            segments: vec![Segment {
                id: 1,
                rank: 0,
                rollout_percent: 100,
                constraints: vec![],
                distributions: vec![Distribution {
                    id: 1,
                    variant_id: 10,
                    percent: 100,
                }],
            }],
            variants: vec![Variant {
                id: 10,
                key: "on".to_owned(),
                attachment: None,
            }],
        }
    }

    fn manual_config() -> ClientConfig {
        ClientConfig::from_base_url("https://flags.example.com/api/v1").auto_refresh(false)
    }

    fn checkout_request() -> EvalRequest {
        EvalRequest::by_flag_key("checkout", EvalContext::new("user123"))
    }

    #[test]
    fn bootstrap_then_evaluate() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut client = OfflineClient::with_source(
            CountingSource {
                calls: calls.clone(),
                flags: vec![checkout_flag()],
            },
            manual_config(),
        );

        client.bootstrap(false).unwrap();

        let result = client.evaluate(&checkout_request()).unwrap();
        assert_eq!(result.variant_id, Some(10));
        assert_eq!(result.variant_key.as_deref(), Some("on"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bootstrap_is_idempotent_unless_forced() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut client = OfflineClient::with_source(
            CountingSource {
                calls: calls.clone(),
                flags: vec![checkout_flag()],
            },
            manual_config(),
        );

        client.bootstrap(false).unwrap();
        client.bootstrap(false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.bootstrap(true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn evaluate_before_bootstrap_is_not_ready() {
        let client = OfflineClient::with_source(FailingSource, manual_config());

        let err = client.evaluate(&checkout_request()).unwrap_err();
        assert!(matches!(err, Error::NotReady));
    }

    #[test]
    fn bootstrap_without_any_source_fails() {
        let mut client = OfflineClient::with_source(FailingSource, manual_config());

        assert!(client.bootstrap(false).is_err());
        assert!(!client.is_bootstrapped());
    }

    #[test]
    fn bootstrap_falls_back_to_persisted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        SnapshotFile::new(&path).save(&[checkout_flag()]).unwrap();

        let mut client =
            OfflineClient::with_source(FailingSource, manual_config().persist_path(&path));

        client.bootstrap(false).unwrap();
        assert!(client.is_bootstrapped());

        let result = client.evaluate(&checkout_request()).unwrap();
        assert_eq!(result.variant_id, Some(10));
    }

    #[test]
    fn expired_persisted_snapshot_still_serves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        SnapshotFile::new(&path).save(&[checkout_flag()]).unwrap();

        let mut client = OfflineClient::with_source(
            FailingSource,
            manual_config().snapshot_ttl(Duration::ZERO).persist_path(&path),
        );

        client.bootstrap(false).unwrap();

        let snapshot = client.snapshot().unwrap();
        assert!(snapshot.is_expired(Utc::now()));
        assert_eq!(
            client.evaluate(&checkout_request()).unwrap().variant_id,
            Some(10)
        );
    }

    #[test]
    fn successful_fetch_persists_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let calls = Arc::new(AtomicU32::new(0));
        let mut online = OfflineClient::with_source(
            CountingSource {
                calls,
                flags: vec![checkout_flag()],
            },
            manual_config().persist_path(&path),
        );
        online.bootstrap(false).unwrap();

        // A later client with no network starts from the file the first one wrote.
        let mut offline =
            OfflineClient::with_source(FailingSource, manual_config().persist_path(&path));
        offline.bootstrap(false).unwrap();

        let result = offline.evaluate(&checkout_request()).unwrap();
        assert_eq!(result.variant_id, Some(10));
    }

    #[test]
    fn background_refresh_failure_keeps_serving() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut client = OfflineClient::with_source(
            FlakySource {
                calls: calls.clone(),
                flags: vec![checkout_flag()],
            },
            ClientConfig::from_base_url("https://flags.example.com/api/v1")
                .refresh_interval(Duration::from_millis(10)),
        );

        client.bootstrap(false).unwrap();

        // Let several background refreshes fail.
        while calls.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }

        let result = client.evaluate(&checkout_request()).unwrap();
        assert_eq!(result.variant_id, Some(10));

        client.shutdown().unwrap();
    }

    #[test]
    fn batch_evaluates_against_one_snapshot() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut client = OfflineClient::with_source(
            CountingSource {
                calls,
                flags: vec![checkout_flag()],
            },
            manual_config(),
        );
        client.bootstrap(false).unwrap();

        let requests = vec![
            checkout_request(),
            EvalRequest::by_flag_id(2, EvalContext::new("user123")),
        ];
        let results = client.evaluate_batch(&requests).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].variant_id, Some(10));
        assert_eq!(results[1].variant_id, None);
    }

    #[test]
    fn agrees_with_server_cache() {
        let flags = vec![checkout_flag()];

        let mut cache = EvalCache::new(
            CountingSource {
                calls: Arc::new(AtomicU32::new(0)),
                flags: flags.clone(),
            },
            RefreshConfig::new()
                .with_interval(Duration::from_secs(600))
                .with_jitter(Duration::ZERO)
                .with_initial_retry(1, Duration::from_millis(1)),
        );
        cache.start().unwrap();

        let mut client = OfflineClient::with_source(
            CountingSource {
                calls: Arc::new(AtomicU32::new(0)),
                flags,
            },
            manual_config(),
        );
        client.bootstrap(false).unwrap();

        let request = checkout_request().with_debug();
        assert_eq!(
            cache.evaluate(&request).unwrap(),
            client.evaluate(&request).unwrap()
        );

        cache.shutdown().unwrap();
    }
}
