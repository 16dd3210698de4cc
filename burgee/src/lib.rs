//! The offline-first SDK for burgee feature flags.
//!
//! # Overview
//!
//! The SDK revolves around an [`OfflineClient`] that downloads a complete snapshot of every
//! flag from a burgee server and evaluates flags locally, so request paths never wait on the
//! network. Evaluation takes an [`EvalRequest`] (flag id or key, plus an [`EvalContext`]
//! identifying the entity) and returns an [`EvalResult`] with the assigned variant, if any.
//!
//! The local snapshot is identical in structure to the server's own cache, and the evaluation
//! code is literally the same, so a client and a server looking at the same snapshot always
//! agree on every assignment.
//!
//! # Offline behavior
//!
//! The client is built to degrade instead of fail:
//!
//! - a snapshot that outlives its TTL keeps serving until a refresh succeeds;
//! - a failed background refresh keeps the previous snapshot in place;
//! - with [`ClientConfig::persist_path`] set, every fetched snapshot is written to disk and
//!   [`OfflineClient::bootstrap`] falls back to that file when the network is unavailable.
//!
//! Only one situation is a hard error: no snapshot could be obtained from any source.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! In production, it is recommended to ignore all errors, as feature flag evaluation should not
//! be critical enough to cause system crashes. However, the returned errors are valuable for
//! debugging and usually indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the examples directory of the `burgee` crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;
mod storage;

#[doc(inline)]
pub use burgee_core::{
    eval::{EvalResult, SegmentDebugLog},
    Constraint, Distribution, EntityContext, Error, EvalContext, EvalRequest, Flag, Operator,
    Result, Segment, Snapshot, SnapshotSource, Variant,
};

pub use client::OfflineClient;
pub use config::ClientConfig;
pub use storage::SnapshotFile;
