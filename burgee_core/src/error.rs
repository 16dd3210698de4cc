use std::sync::Arc;

/// Represents a result type for operations in Burgee.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// burgee-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in Burgee.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Evaluation or export was requested before the first snapshot was loaded.
    ///
    /// This is distinct from asking for an unknown flag: an unknown flag produces a blank
    /// [`EvalResult`](crate::eval::EvalResult), not an error.
    #[error("snapshot is not loaded yet")]
    NotReady,

    /// The initial snapshot load failed after exhausting all retry attempts.
    #[error("initial snapshot load failed after {attempts} attempts")]
    InitialLoadFailed {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A snapshot fetch exceeded the configured refresh timeout and was aborted. Only that
    /// cycle is lost; the previous snapshot stays in service.
    #[error("snapshot fetch timed out")]
    FetchTimeout,

    /// Indicates that the refresh thread panicked. This should normally never happen.
    #[error("refresh thread panicked")]
    RefreshThreadPanicked,

    /// Invalid base_url configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The server responded with an unexpected status code.
    #[error("unexpected response from server: {status}")]
    UnexpectedResponse {
        /// HTTP status code returned by the server.
        status: reqwest::StatusCode,
    },

    /// The export or flag listing document could not be decoded.
    #[error(transparent)]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Json(Arc<serde_json::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Error produced by a custom [`SnapshotSource`](crate::SnapshotSource) implementation.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error from a [`SnapshotSource`](crate::SnapshotSource) implementation.
    pub fn from_source(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Source(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
