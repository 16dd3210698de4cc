//! A background refresh thread that periodically pulls the full flag set from a
//! [`SnapshotSource`] and swaps the resulting snapshot into a [`SnapshotStore`].
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::snapshot::Snapshot;
use crate::snapshot_source::SnapshotSource;
use crate::snapshot_store::SnapshotStore;
use crate::{Error, Result};

/// Configuration for [`RefreshThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval to wait between snapshot refreshes.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_REFRESH_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration subtracted from the interval. This helps to avoid
    /// multiple server instances synchronizing and producing spiky load on the source.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_REFRESH_JITTER`].
    pub jitter: Duration,
    /// Hard deadline for a single fetch. A fetch exceeding it aborts that cycle only; the
    /// previous snapshot stays in service.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_REFRESH_TIMEOUT`].
    pub timeout: Duration,
    /// TTL stamped on built snapshots. Expiry is advisory (see [`Snapshot::is_expired`]).
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_SNAPSHOT_TTL`].
    pub snapshot_ttl: Duration,
    /// How many times the initial load is attempted before readiness fails.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_INITIAL_RETRY_ATTEMPTS`].
    pub initial_retry_attempts: u32,
    /// Delay before the second initial-load attempt; later delays grow by
    /// [`RefreshConfig::initial_retry_multiplier`].
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_INITIAL_RETRY_DELAY`].
    pub initial_retry_delay: Duration,
    /// Backoff multiplier applied to the initial-load retry delay.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_INITIAL_RETRY_MULTIPLIER`].
    pub initial_retry_multiplier: f64,
    /// Upper bound on the initial-load retry delay.
    ///
    /// Defaults to [`RefreshConfig::DEFAULT_INITIAL_RETRY_MAX_DELAY`].
    pub initial_retry_max_delay: Duration,
}

impl RefreshConfig {
    /// Default value for [`RefreshConfig::interval`].
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3);
    /// Default value for [`RefreshConfig::jitter`].
    pub const DEFAULT_REFRESH_JITTER: Duration = Duration::from_millis(300);
    /// Default value for [`RefreshConfig::timeout`].
    pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(59);
    /// Default value for [`RefreshConfig::snapshot_ttl`].
    pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(300);
    /// Default value for [`RefreshConfig::initial_retry_attempts`].
    pub const DEFAULT_INITIAL_RETRY_ATTEMPTS: u32 = 9;
    /// Default value for [`RefreshConfig::initial_retry_delay`].
    pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
    /// Default value for [`RefreshConfig::initial_retry_multiplier`].
    pub const DEFAULT_INITIAL_RETRY_MULTIPLIER: f64 = 2.0;
    /// Default value for [`RefreshConfig::initial_retry_max_delay`].
    pub const DEFAULT_INITIAL_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

    /// Create a new `RefreshConfig` using default configuration.
    pub fn new() -> RefreshConfig {
        RefreshConfig::default()
    }

    /// Update refresh interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> RefreshConfig {
        self.interval = interval;
        self
    }

    /// Update refresh interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> RefreshConfig {
        self.jitter = jitter;
        self
    }

    /// Update the per-fetch timeout with `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> RefreshConfig {
        self.timeout = timeout;
        self
    }

    /// Update the TTL stamped on built snapshots with `snapshot_ttl`.
    pub fn with_snapshot_ttl(mut self, snapshot_ttl: Duration) -> RefreshConfig {
        self.snapshot_ttl = snapshot_ttl;
        self
    }

    /// Update the initial-load retry budget.
    pub fn with_initial_retry(mut self, attempts: u32, delay: Duration) -> RefreshConfig {
        self.initial_retry_attempts = attempts;
        self.initial_retry_delay = delay;
        self
    }
}

impl Default for RefreshConfig {
    fn default() -> RefreshConfig {
        RefreshConfig {
            interval: RefreshConfig::DEFAULT_REFRESH_INTERVAL,
            jitter: RefreshConfig::DEFAULT_REFRESH_JITTER,
            timeout: RefreshConfig::DEFAULT_REFRESH_TIMEOUT,
            snapshot_ttl: RefreshConfig::DEFAULT_SNAPSHOT_TTL,
            initial_retry_attempts: RefreshConfig::DEFAULT_INITIAL_RETRY_ATTEMPTS,
            initial_retry_delay: RefreshConfig::DEFAULT_INITIAL_RETRY_DELAY,
            initial_retry_multiplier: RefreshConfig::DEFAULT_INITIAL_RETRY_MULTIPLIER,
            initial_retry_max_delay: RefreshConfig::DEFAULT_INITIAL_RETRY_MAX_DELAY,
        }
    }
}

/// A snapshot refresh thread.
///
/// The thread loads the first snapshot with bounded retry, then periodically pulls a fresh flag
/// set from the [`SnapshotSource`] and swaps it into the [`SnapshotStore`]. A failed refresh
/// leaves the previous snapshot in service.
pub struct RefreshThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the refresh thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` until the initial load resolves. Holds `Some(Ok(()))` once a snapshot has
    /// been stored successfully. Holds `Some(Err(...))` if the initial load exhausted its
    /// retries; a later successful refresh flips it back to `Some(Ok(()))`.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl RefreshThread {
    /// Starts the snapshot refresh thread.
    ///
    /// The thread begins with an initial load governed by the retry fields of `config`, then
    /// settles into the refresh loop. Use [`RefreshThread::wait_until_ready`] to block until
    /// the initial load resolves.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the OS thread failed to start.
    pub fn start(
        source: Box<dyn SnapshotSource>,
        store: Arc<SnapshotStore>,
        config: RefreshConfig,
    ) -> std::io::Result<RefreshThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough: we `try_send()` a single stop command and
        // ignore the send failing because the buffer is full (someone else already sent stop).
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value| {
                *result.0.lock().unwrap() = Some(value);
                result.1.notify_all();
            };

            std::thread::Builder::new()
                .name("burgee-refresh".to_owned())
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let runtime = match tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                        {
                            Ok(runtime) => runtime,
                            Err(err) => {
                                update_result(Err(Error::from(err)));
                                return;
                            }
                        };

                        // Initial load with bounded retry and stop-aware backoff.
                        let mut attempt = 1;
                        let mut delay = config.initial_retry_delay;
                        loop {
                            log::debug!(target: "burgee", attempt = attempt; "loading initial snapshot");
                            match fetch_snapshot(&runtime, &*source, &config) {
                                Ok(snapshot) => {
                                    store.set_snapshot(Arc::new(snapshot));
                                    update_result(Ok(()));
                                    break;
                                }
                                Err(err) => {
                                    log::warn!(target: "burgee", attempt = attempt;
                                        "initial snapshot load failed: {err}");
                                    if attempt >= config.initial_retry_attempts {
                                        update_result(Err(Error::InitialLoadFailed {
                                            attempts: attempt,
                                        }));
                                        break;
                                    }
                                }
                            }

                            match stop_receiver.recv_timeout(delay) {
                                Err(RecvTimeoutError::Timeout) => {}
                                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                                    // Stopped before the initial load resolved. Resolve the
                                    // result so waiters wake up.
                                    update_result(Err(Error::InitialLoadFailed {
                                        attempts: attempt,
                                    }));
                                    return;
                                }
                            }

                            attempt += 1;
                            delay = delay
                                .mul_f64(config.initial_retry_multiplier)
                                .min(config.initial_retry_max_delay);
                        }

                        // Steady state. The thread keeps polling even after a failed initial
                        // load, so the cache can heal once the source recovers.
                        loop {
                            let timeout = jitter(config.interval, config.jitter);
                            match stop_receiver.recv_timeout(timeout) {
                                Err(RecvTimeoutError::Timeout) => {
                                    // Timed out. Fetch a new snapshot below.
                                }
                                Ok(()) => {
                                    log::debug!(target: "burgee", "refresh thread received stop command");
                                    return;
                                }
                                Err(RecvTimeoutError::Disconnected) => {
                                    // When the other end of channel disconnects, calls to
                                    // .recv_timeout() return immediately. Stop the thread.
                                    log::debug!(target: "burgee", "refresh thread received disconnected");
                                    return;
                                }
                            }

                            log::debug!(target: "burgee", "refreshing snapshot");
                            match fetch_snapshot(&runtime, &*source, &config) {
                                Ok(snapshot) => {
                                    store.set_snapshot(Arc::new(snapshot));
                                    update_result(Ok(()));
                                }
                                Err(err) => {
                                    // Recoverable: keep serving the previous snapshot.
                                    log::warn!(target: "burgee",
                                        "snapshot refresh failed, keeping previous snapshot: {err}");
                                }
                            }
                        }
                    }));

                    // If catch_unwind returns Err, it means a panic occurred.
                    if let Err(_panic_info) = outcome {
                        // Handle the panic gracefully by updating the result with an error.
                        update_result(Err(Error::RefreshThreadPanicked));
                    }
                })?
        };

        Ok(RefreshThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Waits for the initial snapshot load to resolve.
    ///
    /// Blocks until the refresh thread has either stored the first snapshot (`Ok(())`) or
    /// given up on the initial load.
    ///
    /// # Errors
    ///
    /// - [`Error::InitialLoadFailed`] if all initial attempts failed.
    /// - [`Error::RefreshThreadPanicked`] if the thread panicked.
    pub fn wait_until_ready(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::RefreshThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => {
                    // The initial load has resolved. Return Ok(()) or a possible error.
                    return result.clone();
                }
                None => {
                    // Block waiting for the initial load.
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::RefreshThreadPanicked)?;
                }
            }
        }
    }

    /// Stop the refresh thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. First case can be ignored as there's nothing useful we can do. Second case can
        // be ignored as it indicates that another thread already sent a stop command.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the refresh thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`RefreshThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::RefreshThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in
        // that case.
        self.join_handle
            .join()
            .map_err(|_| Error::RefreshThreadPanicked)?;

        Ok(())
    }
}

/// Run one bounded fetch on the thread's runtime and build a snapshot from it.
fn fetch_snapshot(
    runtime: &tokio::runtime::Runtime,
    source: &dyn SnapshotSource,
    config: &RefreshConfig,
) -> Result<Snapshot> {
    let flags = runtime.block_on(async {
        tokio::time::timeout(config.timeout, source.fetch_flags())
            .await
            .map_err(|_elapsed| Error::FetchTimeout)?
    })?;
    Ok(Snapshot::new(flags, config.snapshot_ttl))
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{RefreshConfig, RefreshThread};
    use crate::models::Flag;
    use crate::snapshot_source::SnapshotSource;
    use crate::snapshot_store::SnapshotStore;
    use crate::{Error, Result};

    /// Calls are numbered from 0; the script decides each call's outcome.
    struct ScriptedSource {
        calls: Arc<AtomicU32>,
        script: Box<dyn Fn(u32) -> Result<Vec<Flag>> + Send + Sync>,
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch_flags(&self) -> Result<Vec<Flag>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call)
        }
    }

    fn flag(id: i64, key: &str) -> Flag {
        Flag {
            id,
            key: key.to_owned(),
            enabled: true,
            segments: vec![],
            variants: vec![],
        }
    }

    fn refused() -> Error {
        Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "source unavailable",
        ))
    }

    fn slow_config() -> RefreshConfig {
        // Interval long enough that the steady loop never fires during a test.
        RefreshConfig::new()
            .with_interval(Duration::from_secs(600))
            .with_jitter(Duration::ZERO)
    }

    #[test]
    fn initial_load_makes_snapshot_available() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|_| Ok(vec![flag(1, "checkout")])),
        };
        let store = Arc::new(SnapshotStore::new());

        let thread =
            RefreshThread::start(Box::new(source), store.clone(), slow_config()).unwrap();

        thread.wait_until_ready().unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.get_by_key("checkout").unwrap().id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        thread.shutdown().unwrap();
    }

    #[test]
    fn initial_retry_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|call| {
                if call == 0 {
                    Err(refused())
                } else {
                    Ok(vec![flag(1, "checkout")])
                }
            }),
        };
        let store = Arc::new(SnapshotStore::new());
        let config = slow_config().with_initial_retry(3, Duration::from_millis(1));

        let thread = RefreshThread::start(Box::new(source), store.clone(), config).unwrap();

        thread.wait_until_ready().unwrap();
        assert!(store.snapshot().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        thread.shutdown().unwrap();
    }

    #[test]
    fn exhausted_initial_retries_fail_readiness() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|_| Err(refused())),
        };
        let store = Arc::new(SnapshotStore::new());
        let config = slow_config().with_initial_retry(2, Duration::from_millis(1));

        let thread = RefreshThread::start(Box::new(source), store.clone(), config).unwrap();

        let err = thread.wait_until_ready().unwrap_err();
        assert!(matches!(err, Error::InitialLoadFailed { attempts: 2 }));
        assert!(store.snapshot().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        thread.shutdown().unwrap();
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|call| {
                if call == 0 {
                    Ok(vec![flag(1, "checkout")])
                } else {
                    Err(refused())
                }
            }),
        };
        let store = Arc::new(SnapshotStore::new());
        let config = RefreshConfig::new()
            .with_interval(Duration::from_millis(10))
            .with_jitter(Duration::ZERO);

        let thread = RefreshThread::start(Box::new(source), store.clone(), config).unwrap();
        thread.wait_until_ready().unwrap();

        // Let several refresh cycles fail.
        while calls.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.get_by_key("checkout").unwrap().id, 1);

        thread.shutdown().unwrap();
    }

    #[test]
    fn refresh_swaps_in_new_snapshot() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|call| {
                if call == 0 {
                    Ok(vec![flag(1, "checkout")])
                } else {
                    Ok(vec![flag(1, "checkout"), flag(2, "banner")])
                }
            }),
        };
        let store = Arc::new(SnapshotStore::new());
        let config = RefreshConfig::new()
            .with_interval(Duration::from_millis(10))
            .with_jitter(Duration::ZERO);

        let thread = RefreshThread::start(Box::new(source), store.clone(), config).unwrap();
        thread.wait_until_ready().unwrap();

        while store.snapshot().unwrap().len() < 2 {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(store.snapshot().unwrap().get_by_key("banner").is_some());

        thread.shutdown().unwrap();
    }

    #[test]
    fn shutdown_interrupts_initial_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let source = ScriptedSource {
            calls: calls.clone(),
            script: Box::new(|_| Err(refused())),
        };
        let store = Arc::new(SnapshotStore::new());
        // Long backoff: shutdown must not wait it out.
        let config = slow_config().with_initial_retry(100, Duration::from_secs(600));

        let thread = RefreshThread::start(Box::new(source), store, config).unwrap();
        thread.shutdown().unwrap();
    }
}
