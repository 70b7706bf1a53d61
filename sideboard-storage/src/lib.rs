//! Sideboard Storage - Durable Layer
//!
//! Crash-safe file persistence guarded by per-path locks. Two pieces:
//!
//! - [`PathLockRegistry`]: append-only registry of per-path mutexes so
//!   writers to the same file are strictly serialized while writers to
//!   different files never block each other.
//! - [`AtomicPersister`]: write-replace via a colocated temp file plus
//!   fsync, so readers observe either the old content or the new
//!   content, never a truncated mixture, and a failed write leaves the
//!   destination untouched.
//!
//! Readers take no lock; the rename is the atomicity boundary.

pub mod atomic;
pub mod path_lock;

pub use atomic::AtomicPersister;
pub use path_lock::{PathLockGuard, PathLockHandle, PathLockRegistry};
