//! The snapshot export document.
//!
//! This is the wire format offline consumers bootstrap from: the full flag set, serialized as
//! camelCase JSON. The server side produces it from a [`Snapshot`]; the SDK side parses it back
//! and evaluates against the result with the same core functions.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{Flag, TryParse};
use crate::snapshot::Snapshot;

/// The full flag set in export form.
///
/// Serialization is deterministic: flags are ordered by id. Parsing is per-entry tolerant: a
/// flag entry that fails to deserialize (e.g. produced by a newer server) is logged and skipped
/// instead of failing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotExport {
    pub flags: Vec<Flag>,
}

/// Parsed form of the document before damaged entries are dropped.
#[derive(Deserialize)]
struct SnapshotExportWire {
    #[serde(default)]
    flags: Vec<TryParse<Flag>>,
}

impl SnapshotExport {
    /// Build the export document from a snapshot, ordered by flag id.
    pub fn from_snapshot(snapshot: &Snapshot) -> SnapshotExport {
        let mut flags: Vec<Flag> = snapshot.flags().map(|flag| (**flag).clone()).collect();
        flags.sort_by_key(|flag| flag.id);
        SnapshotExport { flags }
    }

    /// Consume the document, returning the flags it carries.
    pub fn into_flags(self) -> Vec<Flag> {
        self.flags
    }

    /// Build a snapshot from the document, stamped with the current time.
    pub fn into_snapshot(self, ttl: Duration) -> Snapshot {
        Snapshot::new(self.flags, ttl)
    }
}

impl<'de> Deserialize<'de> for SnapshotExport {
    fn deserialize<D>(deserializer: D) -> std::result::Result<SnapshotExport, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = SnapshotExportWire::deserialize(deserializer)?;

        let mut flags = Vec::with_capacity(wire.flags.len());
        for entry in wire.flags {
            match entry {
                TryParse::Parsed(flag) => flags.push(flag),
                TryParse::ParseFailed(raw) => {
                    log::warn!(target: "burgee", "skipping unparsable flag entry: {raw}");
                }
            }
        }

        Ok(SnapshotExport { flags })
    }
}
