//! `burgee_core` is the common core of the burgee feature-flag system: the flag data model, the
//! evaluation engine, and the snapshot plumbing shared by the server-side cache and the offline
//! SDK. If you're building an application client, you probably want the `burgee` crate instead.
//!
//! # Overview
//!
//! `burgee_core` is organized as a set of building blocks that compose into a cache or an SDK.
//!
//! [`Snapshot`] is the heart of the crate. It is an immutable view of every flag, indexed by id
//! and by key, stamped with a fetch time and a TTL. Snapshots are replaced wholesale and never
//! mutated, so a reader holding one evaluates against a consistent flag set no matter what
//! refreshes happen meanwhile.
//!
//! [`SnapshotStore`](snapshot_store::SnapshotStore) is a thread-safe holder for the current
//! snapshot. It is the central authority on what snapshot is active: writers swap in a complete
//! replacement, readers grab a cheap handle.
//!
//! [`SnapshotSource`] is the seam between evaluation and persistence: anything that can produce
//! the full flag set. [`SnapshotFetcher`](fetcher::SnapshotFetcher) is the HTTP implementation
//! used by offline clients; a server embeds its own source backed by whatever storage it uses.
//!
//! [`RefreshThread`](refresher::RefreshThread) launches a background thread that loads an
//! initial snapshot (with bounded retry) and then periodically pulls a fresh flag set from a
//! `SnapshotSource` into a `SnapshotStore`. A failed refresh keeps the previous snapshot in
//! service.
//!
//! The [`eval`] module contains the evaluation functions. They are pure: given a snapshot and a
//! request, they produce an [`EvalResult`](eval::EvalResult) (and, on request, the per-segment
//! debug trail) without side effects.
//!
//! [`EvalCache`](eval_cache::EvalCache) ties the pieces together for server use: store plus
//! refresh thread plus source, with evaluation and [export](export::SnapshotExport) on top.
//!
//! # Versioning
//!
//! This library follows semver. However, it is considered an internal library, so expect
//! frequent breaking changes and major version bumps.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod constraints;
pub mod eval;
pub mod eval_cache;
pub mod export;
pub mod fetcher;
pub mod refresher;
pub mod rollout;
pub mod snapshot_store;

mod context;
mod error;
mod models;
mod snapshot;
mod snapshot_source;

pub use context::{EntityContext, EvalContext, EvalRequest};
pub use error::{Error, Result};
pub use models::{
    Constraint, Distribution, DistributionTable, Flag, Operator, Segment, TryParse, Variant,
};
pub use snapshot::Snapshot;
pub use snapshot_source::SnapshotSource;
