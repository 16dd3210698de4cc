//! Snapshot persistence: the export document saved to a local file, so a client can bootstrap
//! without the network.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use burgee_core::export::SnapshotExport;
use burgee_core::{Flag, Result, Snapshot};

/// Borrowed form of the export document, so saving does not clone the flag set.
#[derive(Serialize)]
struct ExportRef<'a> {
    flags: &'a [Flag],
}

/// A snapshot persisted as an export JSON file.
///
/// The file carries no timestamp of its own: its modification time doubles as the snapshot's
/// fetch time, so a restored snapshot expires relative to when it was actually written.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Address a snapshot file at `path`. The file itself may not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> SnapshotFile {
        SnapshotFile { path: path.into() }
    }

    /// Write `flags` to the file as an export document, replacing any previous content.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`](crate::Error::Io) if the file cannot be created or written.
    /// - [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn save(&self, flags: &[Flag]) -> Result<()> {
        let file = File::create(&self.path)?;
        serde_json::to_writer(BufWriter::new(file), &ExportRef { flags })?;
        log::debug!(target: "burgee", "persisted snapshot to {:?}", self.path);
        Ok(())
    }

    /// Read the file back into a snapshot, using the file's modification time as the fetch time.
    ///
    /// An expired file still loads; staleness is the caller's call to make.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`](crate::Error::Io) if the file is missing or unreadable.
    /// - [`Error::Json`](crate::Error::Json) if the content is not an export document.
    pub fn load(&self, ttl: Duration) -> Result<Snapshot> {
        let file = File::open(&self.path)?;
        let fetched_at = file
            .metadata()
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let export: SnapshotExport = serde_json::from_reader(BufReader::new(file))?;

        log::debug!(target: "burgee", "loaded persisted snapshot from {:?}", self.path);
        Ok(Snapshot::with_fetched_at(export.into_flags(), ttl, fetched_at))
    }
}
