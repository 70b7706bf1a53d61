//! Per-path mutual exclusion for writers.
//!
//! A registry hands out one lock object per normalized path. Creation
//! of a new per-path lock is itself guarded by the registry's coarse
//! lock (double-checked through the map entry), so two callers racing
//! on the same new path always receive the same lock object.
//!
//! Locks are never removed. The set of distinct paths a process writes
//! is small and bounded by its lifetime, and keeping entries around
//! avoids the destroy-while-held race a reaping scheme would need to
//! solve.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of per-path write locks.
///
/// Acquisition never fails; it may block while another writer holds the
/// same path's lock. A poisoned mutex (a writer panicked mid-section)
/// is recovered rather than propagated: the persister's write protocol
/// never leaves the destination in a broken state, so the lock itself
/// guards no invariant that a panic could have violated.
#[derive(Debug, Default)]
pub struct PathLockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (creating if needed) the lock handle for a path.
    ///
    /// The same normalized path always yields a handle to the same
    /// underlying lock, across threads.
    pub fn handle(&self, path: &Path) -> PathLockHandle {
        let normalized = normalize_path(path);
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = locks
            .entry(normalized)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        PathLockHandle { lock }
    }

    /// Number of distinct paths ever locked. Test and diagnostics hook.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// True if no path has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cloneable handle to one path's lock.
#[derive(Debug, Clone)]
pub struct PathLockHandle {
    lock: Arc<Mutex<()>>,
}

impl PathLockHandle {
    /// Block until the path's lock is held; release on drop.
    ///
    /// Release is guaranteed on all exit paths including panics, since
    /// the guard is RAII.
    pub fn lock(&self) -> PathLockGuard<'_> {
        let guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        PathLockGuard { _guard: guard }
    }
}

/// RAII guard for a held path lock.
#[derive(Debug)]
pub struct PathLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Normalize a path so that spellings of the same file share a lock.
///
/// `canonicalize` fails for files that do not exist yet, which is the
/// common case for first writes, so: absolutize first, then
/// canonicalize the deepest existing ancestor (normally the parent
/// directory) and re-append the remainder.
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    absolute
}
