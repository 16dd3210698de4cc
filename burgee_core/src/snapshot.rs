//! Immutable point-in-time view of all flags.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::Flag;

/// An immutable snapshot of every flag, indexed by id and by key.
///
/// A snapshot is built once from fetched flags and never mutated; refreshing produces a new
/// snapshot that replaces the old one wholesale. Readers holding an `Arc<Snapshot>` are
/// unaffected by later swaps, so one request always evaluates against one consistent view.
#[derive(Debug, Clone)]
pub struct Snapshot {
    flags_by_id: HashMap<i64, Arc<Flag>>,
    flags_by_key: HashMap<String, Arc<Flag>>,
    /// When the underlying flags were fetched.
    pub fetched_at: DateTime<Utc>,
    /// How long this snapshot is considered fresh.
    pub ttl: Duration,
}

impl Snapshot {
    /// Build a snapshot from fetched flags, stamped with the current time.
    ///
    /// Disabled flags are kept: evaluation reports them as having no variant, and the export
    /// document carries their `enabled` field. Flags with an empty key are reachable by id
    /// only. On duplicate ids or keys the last entry wins.
    pub fn new(flags: Vec<Flag>, ttl: Duration) -> Snapshot {
        Snapshot::with_fetched_at(flags, ttl, Utc::now())
    }

    /// Build a snapshot with an explicit fetch timestamp (e.g. restored from disk).
    pub fn with_fetched_at(flags: Vec<Flag>, ttl: Duration, fetched_at: DateTime<Utc>) -> Snapshot {
        let mut flags_by_id = HashMap::with_capacity(flags.len());
        let mut flags_by_key = HashMap::with_capacity(flags.len());

        for flag in flags {
            let flag = Arc::new(flag);
            if !flag.key.is_empty() {
                flags_by_key.insert(flag.key.clone(), Arc::clone(&flag));
            }
            flags_by_id.insert(flag.id, flag);
        }

        Snapshot {
            flags_by_id,
            flags_by_key,
            fetched_at,
            ttl,
        }
    }

    /// Look up a flag by id.
    pub fn get_by_id(&self, flag_id: i64) -> Option<&Arc<Flag>> {
        self.flags_by_id.get(&flag_id)
    }

    /// Look up a flag by key.
    pub fn get_by_key(&self, flag_key: &str) -> Option<&Arc<Flag>> {
        self.flags_by_key.get(flag_key)
    }

    /// Iterate over all flags in unspecified order.
    pub fn flags(&self) -> impl Iterator<Item = &Arc<Flag>> {
        self.flags_by_id.values()
    }

    /// Number of flags in the snapshot.
    pub fn len(&self) -> usize {
        self.flags_by_id.len()
    }

    /// Whether the snapshot holds no flags at all.
    pub fn is_empty(&self) -> bool {
        self.flags_by_id.is_empty()
    }

    /// Whether the snapshot has outlived its TTL at `now`.
    ///
    /// Expiry is advisory: evaluation keeps serving an expired snapshot (availability over
    /// freshness) while a refresh catches up.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::TimeDelta::from_std(self.ttl) else {
            return false;
        };
        now >= self.fetched_at + ttl
    }
}
