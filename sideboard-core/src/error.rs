//! Error types for Sideboard cache operations.
//!
//! Failures never crash the owning thread: every failure path in the
//! runtime layer ends in a stale-success callback or an explicit error
//! callback. These types carry the reasons those callbacks deliver.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Durable-layer errors.
///
/// A failed write guarantees the destination file was left untouched;
/// the previous content (if any) is still readable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("No persisted file at {path}")]
    NotFound { path: PathBuf },

    #[error("Write to {path} failed during {op}: {kind:?}: {message}")]
    WriteFailed {
        path: PathBuf,
        op: &'static str,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Read from {path} failed: {kind:?}: {message}")]
    ReadFailed {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Envelope at {path} is not valid: {reason}")]
    InvalidEnvelope { path: PathBuf, reason: String },
}

impl PersistError {
    /// Wrap an io error from a write-side operation.
    pub fn write(path: impl Into<PathBuf>, op: &'static str, err: &io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            op,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Wrap an io error from the read side, mapping NotFound to its
    /// own variant.
    pub fn read(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::ReadFailed {
                path,
                kind: err.kind(),
                message: err.to_string(),
            }
        }
    }

    /// True when the failure is a missing file rather than an io fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failure of a caller-supplied fetch closure.
///
/// The cache treats fetch operations as black boxes: the reason is
/// whatever the closure reported, and the closure is never retried
/// automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Fetch failed: {reason}")]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<String> for FetchError {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for FetchError {
    fn from(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// Background worker errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker has shut down; task dropped")]
    ShutDown,

    #[error("Worker thread did not exit within {waited_ms}ms")]
    JoinTimedOut { waited_ms: u64 },
}

/// Master error type for all Sideboard cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SideboardError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Result type alias for Sideboard cache operations.
pub type SideboardResult<T> = Result<T, SideboardError>;

// =============================================================================
// TESTS
// =============================================================================
