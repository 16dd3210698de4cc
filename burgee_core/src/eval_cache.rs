//! The server-side snapshot cache: an always-warm, background-refreshed view of all flags that
//! request handlers evaluate against without blocking each other.
use std::sync::Arc;

use crate::context::EvalRequest;
use crate::eval::{self, EvalResult};
use crate::export::SnapshotExport;
use crate::models::Flag;
use crate::refresher::{RefreshConfig, RefreshThread};
use crate::snapshot::Snapshot;
use crate::snapshot_source::SnapshotSource;
use crate::snapshot_store::SnapshotStore;
use crate::{Error, Result};

/// An in-memory flag cache refreshed in the background from a [`SnapshotSource`].
///
/// The cache is constructed unstarted; [`EvalCache::start`] performs the initial load
/// synchronously (with the configured retry budget), so a cache that started successfully is
/// ready to evaluate. Lookups and evaluation read the current snapshot with a single pointer
/// clone and are never blocked by a refresh in progress.
pub struct EvalCache {
    store: Arc<SnapshotStore>,
    config: RefreshConfig,
    /// Consumed by `start`.
    source: Option<Box<dyn SnapshotSource>>,
    refresh_thread: Option<RefreshThread>,
}

impl EvalCache {
    /// Create an unstarted cache over `source`.
    pub fn new(source: impl SnapshotSource + 'static, config: RefreshConfig) -> EvalCache {
        EvalCache {
            store: Arc::new(SnapshotStore::new()),
            config,
            source: Some(Box::new(source)),
            refresh_thread: None,
        }
    }

    /// Start the background refresher and block until the initial snapshot is loaded.
    ///
    /// Idempotent: starting a started cache is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::InitialLoadFailed`] if the initial load exhausted its retry budget. The
    ///   refresher keeps running and the cache heals if the source recovers; readiness probes
    ///   may call `start` again to re-check.
    /// - [`Error::Io`] if the refresh thread failed to spawn.
    pub fn start(&mut self) -> Result<()> {
        if let Some(thread) = &self.refresh_thread {
            return thread.wait_until_ready();
        }

        let source = match self.source.take() {
            Some(source) => source,
            // The source is gone but no thread handle was stored: a previous start() failed to
            // spawn the OS thread. Nothing left to retry with.
            None => return Err(Error::NotReady),
        };

        let thread = RefreshThread::start(source, Arc::clone(&self.store), self.config.clone())?;
        let ready = thread.wait_until_ready();
        self.refresh_thread = Some(thread);
        ready
    }

    /// Get a flag by id from the current snapshot.
    ///
    /// Returns `None` both for an unknown flag and for a cache that has no snapshot yet; use
    /// [`EvalCache::evaluate`] when the distinction matters.
    pub fn get(&self, flag_id: i64) -> Option<Arc<Flag>> {
        self.store
            .snapshot()
            .and_then(|snapshot| snapshot.get_by_id(flag_id).cloned())
    }

    /// Get a flag by key from the current snapshot.
    pub fn get_by_key(&self, flag_key: &str) -> Option<Arc<Flag>> {
        self.store
            .snapshot()
            .and_then(|snapshot| snapshot.get_by_key(flag_key).cloned())
    }

    /// Get the current snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.snapshot()
    }

    /// Evaluate a request against the current snapshot.
    pub fn evaluate(&self, request: &EvalRequest) -> Result<EvalResult> {
        eval::evaluate(self.store.snapshot().as_deref(), request)
    }

    /// Evaluate a batch of requests against one consistent snapshot.
    pub fn evaluate_batch(&self, requests: &[EvalRequest]) -> Result<Vec<EvalResult>> {
        eval::evaluate_batch(self.store.snapshot().as_deref(), requests)
    }

    /// Export the current snapshot as the wire document offline consumers bootstrap from.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if no snapshot has been loaded yet.
    pub fn export(&self) -> Result<SnapshotExport> {
        let snapshot = self.store.snapshot().ok_or(Error::NotReady)?;
        Ok(SnapshotExport::from_snapshot(&snapshot))
    }

    /// Signal the refresher to stop without waiting for it.
    pub fn stop(&self) {
        if let Some(thread) = &self.refresh_thread {
            thread.stop();
        }
    }

    /// Stop the refresher and wait for it to exit.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.refresh_thread.take() {
            Some(thread) => thread.shutdown(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::EvalCache;
    use crate::context::{EvalContext, EvalRequest};
    use crate::models::{Distribution, Flag, Segment, Variant};
    use crate::refresher::RefreshConfig;
    use crate::snapshot_source::SnapshotSource;
    use crate::{Error, Result};

    struct FixedSource {
        flags: Vec<Flag>,
    }

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            Ok(self.flags.clone())
        }
    }

    struct FailingSource {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "source unavailable",
            )))
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

    fn test_config() -> RefreshConfig {
        RefreshConfig::new()
            .with_interval(Duration::from_secs(600))
            .with_jitter(Duration::ZERO)
            .with_initial_retry(1, Duration::from_millis(1))
    }

    #[test]
    fn started_cache_serves_lookups_and_evaluation() {
        let mut cache = EvalCache::new(
            FixedSource {
                flags: vec![checkout_flag()],
            },
            test_config(),
        );
        cache.start().unwrap();

        assert_eq!(cache.get(1).unwrap().key, "checkout");
        assert_eq!(cache.get_by_key("checkout").unwrap().id, 1);
        assert!(cache.get(2).is_none());

        let request = EvalRequest::by_flag_key("checkout", EvalContext::new("user123"));
        let result = cache.evaluate(&request).unwrap();
        assert_eq!(result.variant_id, Some(10));
        assert_eq!(result.variant_key.as_deref(), Some("on"));

        cache.shutdown().unwrap();
    }

    #[test]
    fn unstarted_cache_is_not_ready() {
        let cache = EvalCache::new(FixedSource { flags: vec![] }, test_config());

        let request = EvalRequest::by_flag_id(1, EvalContext::new("user123"));
        assert!(matches!(cache.evaluate(&request), Err(Error::NotReady)));
        assert!(matches!(cache.export(), Err(Error::NotReady)));
        assert!(cache.get(1).is_none());
        assert!(cache.snapshot().is_none());
    }

    #[test]
    fn start_surfaces_initial_load_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut cache = EvalCache::new(
            FailingSource {
                calls: calls.clone(),
            },
            test_config().with_initial_retry(2, Duration::from_millis(1)),
        );

        let err = cache.start().unwrap_err();
        assert!(matches!(err, Error::InitialLoadFailed { attempts: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.shutdown().unwrap();
    }

    #[test]
    fn start_is_idempotent() {
        let mut cache = EvalCache::new(
            FixedSource {
                flags: vec![checkout_flag()],
            },
            test_config(),
        );

        cache.start().unwrap();
        cache.start().unwrap();
        assert!(cache.snapshot().is_some());

        cache.shutdown().unwrap();
    }

    #[test]
    fn export_round_trips_the_snapshot() {
        let mut cache = EvalCache::new(
            FixedSource {
                flags: vec![checkout_flag()],
            },
            test_config(),
        );
        cache.start().unwrap();

        let export = cache.export().unwrap();
        assert_eq!(export.flags.len(), 1);
        assert_eq!(export.flags[0].key, "checkout");

        cache.shutdown().unwrap();
    }

    #[test]
    fn batch_evaluation_uses_one_snapshot() {
        let mut cache = EvalCache::new(
            FixedSource {
                flags: vec![checkout_flag()],
            },
            test_config(),
        );
        cache.start().unwrap();

        let requests = vec![
            EvalRequest::by_flag_id(1, EvalContext::new("user123")),
            EvalRequest::by_flag_key("checkout", EvalContext::new("carol")),
        ];
        let results = cache.evaluate_batch(&requests).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.variant_id == Some(10)));

        cache.shutdown().unwrap();
    }
}
