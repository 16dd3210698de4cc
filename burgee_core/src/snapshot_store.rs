//! A thread-safe in-memory holder for the currently active snapshot. [`SnapshotStore`] provides
//! concurrent access for readers (flag evaluation) and writers (the background refresher).
use std::sync::{Arc, RwLock};

use crate::Snapshot;

/// `SnapshotStore` provides a thread-safe (`Sync`) slot for the active [`Snapshot`], allowing
/// concurrent access for readers and writers.
///
/// The snapshot itself is always immutable and can only be replaced completely, so readers
/// never observe a half-built snapshot and are unaffected by a refresh in progress: the write
/// lock is held only for the pointer swap.
#[derive(Default)]
pub struct SnapshotStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// Create a new empty snapshot store.
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    /// Get the currently-active snapshot. Returns None if a snapshot hasn't been loaded yet.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        // self.snapshot.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding snapshot lock should not panic");

        snapshot.clone()
    }

    /// Set a new snapshot.
    pub fn set_snapshot(&self, snapshot: Arc<Snapshot>) {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        *slot = Some(snapshot);
    }
}
