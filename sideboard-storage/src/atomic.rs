//! Crash-safe write-replace persistence.
//!
//! Write protocol, under the destination path's lock:
//!
//! 1. write content to a temp file colocated in the destination
//!    directory (same filesystem, so the final rename is atomic)
//! 2. fsync the temp file
//! 3. atomically rename over the destination
//! 4. fsync the containing directory so the rename survives a crash
//!
//! Any failure before step 3 leaves the destination untouched; the
//! temp file is cleaned up on drop. Readers take no lock: concurrent
//! with a write they see the old file or the new file, never a mixture.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

use sideboard_core::PersistError;

/// Atomic file persister guarded by a [`PathLockRegistry`].
///
/// The registry is injected so a persister can share path locks with
/// other writers in the same process (the cache layer and the save
/// scheduler both write through one registry).
///
/// [`PathLockRegistry`]: crate::PathLockRegistry
#[derive(Debug, Clone)]
pub struct AtomicPersister {
    locks: Arc<crate::PathLockRegistry>,
}

impl AtomicPersister {
    /// Create a persister with its own private lock registry.
    pub fn new() -> Self {
        Self {
            locks: Arc::new(crate::PathLockRegistry::new()),
        }
    }

    /// Create a persister sharing an existing lock registry.
    pub fn with_registry(locks: Arc<crate::PathLockRegistry>) -> Self {
        Self { locks }
    }

    /// The lock registry this persister writes through.
    pub fn registry(&self) -> &Arc<crate::PathLockRegistry> {
        &self.locks
    }

    /// Durably replace `path` with `bytes`, all-or-nothing.
    ///
    /// Creates parent directories as needed. Serialized against other
    /// writes to the same path; independent of writes to other paths.
    ///
    /// # Errors
    ///
    /// Out-of-space, permission, and other io failures are returned as
    /// [`PersistError::WriteFailed`] with the destination untouched.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)
                .map_err(|e| PersistError::write(path, "create_dir_all", &e))?;
        }

        let handle = self.locks.handle(path);
        let _guard = handle.lock();

        let dir = parent.unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| PersistError::write(path, "create_temp", &e))?;
        tmp.write_all(bytes)
            .map_err(|e| PersistError::write(path, "write_temp", &e))?;
        tmp.flush()
            .map_err(|e| PersistError::write(path, "flush_temp", &e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PersistError::write(path, "sync_temp", &e))?;
        tmp.persist(path)
            .map_err(|e| PersistError::write(path, "persist", &e.error))?;

        // Make the rename itself durable. Failure here is not a write
        // failure: the content is already in place.
        fsync_dir(dir);

        debug!(path = %path.display(), bytes = bytes.len(), "atomic write complete");
        Ok(())
    }

    /// Read the full content of `path`.
    ///
    /// Lock-free; a missing file is [`PersistError::NotFound`].
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, PersistError> {
        fs::read(path).map_err(|e| PersistError::read(path, &e))
    }

    /// Serialize `value` as pretty JSON and write it atomically.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::InvalidEnvelope {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.write(path, &bytes)
    }

    /// Read and parse a JSON document written by [`write_json`].
    ///
    /// [`write_json`]: AtomicPersister::write_json
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, PersistError> {
        let bytes = self.read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| PersistError::InvalidEnvelope {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl Default for AtomicPersister {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort fsync of a directory.
///
/// Mirrors the tool's historical behavior: some filesystems and
/// platforms refuse directory fsync, and losing the rename's durability
/// there is preferable to failing a write whose content is already
/// safely in place.
fn fsync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideboard_core::PersistEnvelope;
    use std::time::Duration;

    #[test]
    fn test_round_trip_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let persister = AtomicPersister::new();

        persister.write(&path, b"exact bytes \x00\x01\x02").unwrap();
        assert_eq!(persister.read(&path).unwrap(), b"exact bytes \x00\x01\x02");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/data.json");
        let persister = AtomicPersister::new();

        persister.write(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_overwrite_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let persister = AtomicPersister::new();

        persister.write(&path, b"first version, longer content").unwrap();
        persister.write(&path, b"second").unwrap();
        assert_eq!(persister.read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let persister = AtomicPersister::new();

        let err = persister.read(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_interrupted_write_leaves_previous_content() {
        // Simulate the crash window: a fully-written temp file exists
        // in the directory but the replace never happened. The reader
        // must still see the pre-write content.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let persister = AtomicPersister::new();

        persister.write(&path, b"committed").unwrap();

        let mut orphan = NamedTempFile::new_in(dir.path()).unwrap();
        orphan.write_all(b"half-finished replacement").unwrap();
        orphan.as_file().sync_all().unwrap();
        // No persist(); the process "crashed" here.

        assert_eq!(persister.read(&path).unwrap(), b"committed");
    }

    #[test]
    fn test_failed_write_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let persister = AtomicPersister::new();

        persister.write(&path, b"original").unwrap();

        // Turn the destination's parent into a file so the temp file
        // cannot be created, failing the write before any replace.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, b"not a directory").unwrap();
        let bad_path = blocked.join("child.json");
        let err = persister.write(&bad_path, b"new").unwrap_err();
        assert!(matches!(err, PersistError::WriteFailed { .. }));

        assert_eq!(persister.read(&path).unwrap(), b"original");
    }

    #[test]
    fn test_json_envelope_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta/modern.json");
        let persister = AtomicPersister::new();

        let envelope = PersistEnvelope::new(
            vec!["burn".to_string(), "tron".to_string()],
            Duration::from_secs(3600),
            chrono::Utc::now(),
        );
        persister.write_json(&path, &envelope).unwrap();
        let loaded: PersistEnvelope<Vec<String>> = persister.read_json(&path).unwrap();
        assert_eq!(loaded, envelope);
    }

    #[test]
    fn test_read_json_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        let persister = AtomicPersister::new();

        persister.write(&path, b"not json at all").unwrap();
        let err = persister
            .read_json::<PersistEnvelope<String>>(&path)
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidEnvelope { .. }));
    }

    #[test]
    fn test_shared_registry_is_used() {
        let registry = Arc::new(crate::PathLockRegistry::new());
        let persister = AtomicPersister::with_registry(Arc::clone(&registry));
        let dir = tempfile::tempdir().unwrap();

        persister.write(&dir.path().join("a.json"), b"a").unwrap();
        assert_eq!(registry.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_write_then_read_is_identity(content in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096)) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.bin");
            let persister = AtomicPersister::new();

            persister.write(&path, &content).unwrap();
            proptest::prop_assert_eq!(persister.read(&path).unwrap(), content);
        }
    }
}
