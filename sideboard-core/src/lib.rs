//! Sideboard Core - Shared Types
//!
//! Data types shared by the storage and cache layers: cache keys, the
//! on-disk persist envelope, and the error taxonomy. No I/O and no
//! threading live here.

pub mod envelope;
pub mod error;
pub mod key;

pub use envelope::PersistEnvelope;
pub use error::{FetchError, PersistError, SideboardError, SideboardResult, WorkerError};
pub use key::CacheKey;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
