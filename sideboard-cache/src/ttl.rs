//! TTL cache with background refresh.
//!
//! Read path for callers that cannot block: a fresh entry is delivered
//! synchronously; anything else goes through the [`TaskWorker`] and
//! comes back as a callback on the owning thread. At most one fetch is
//! ever in flight per key; concurrent requests for the same key attach
//! to the existing fetch instead of starting another.
//!
//! Staleness is computed lazily at read time. There is no eviction
//! sweep; a stale entry stays resident so it can serve as a fallback
//! when a refresh fails.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use sideboard_core::{CacheKey, FetchError, PersistEnvelope, Timestamp, WorkerError};
use sideboard_storage::AtomicPersister;

use crate::entry::CacheEntry;
use crate::worker::TaskWorker;

// ============================================================================
// Configuration
// ============================================================================

/// Cache layer configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    root: PathBuf,
    default_ttl: Duration,
}

impl CacheConfig {
    /// Configuration rooted at the given cache directory, with a
    /// one-hour default freshness window.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_ttl: Duration::from_secs(3600),
        }
    }

    /// Override the freshness window used when a request passes no TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The directory persisted envelopes live under.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// The freshness window used when a request passes no TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

// ============================================================================
// Cache
// ============================================================================

/// A caller waiting on an in-flight fetch.
///
/// Exactly one of the two callbacks runs when the fetch resolves.
struct Waiter<V> {
    on_success: Box<dyn FnOnce(V, bool) + Send>,
    on_error: Box<dyn FnOnce(FetchError) + Send>,
}

struct CacheInner<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<CacheKey, Vec<Waiter<V>>>>,
    worker: Arc<TaskWorker>,
    persister: AtomicPersister,
    config: CacheConfig,
}

/// Read-through cache keyed by [`CacheKey`], refreshed off-thread.
///
/// Cloning is cheap and shares the underlying state.
pub struct TtlCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Serialize + DeserializeOwned + 'static,
{
    pub fn new(config: CacheConfig, worker: Arc<TaskWorker>, persister: AtomicPersister) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                worker,
                persister,
                config,
            }),
        }
    }

    /// Serve `key` from cache or refresh it in the background.
    ///
    /// Must be called on the owning thread. Resolution order:
    ///
    /// 1. Fresh entry and `force` is false: `on_success(value, false)`
    ///    runs synchronously before this returns.
    /// 2. A fetch for `key` is already in flight: this request attaches
    ///    to it; no second fetch starts.
    /// 3. Otherwise `fetch` runs on the worker thread. On success the
    ///    envelope is persisted, the entry replaced wholesale, and
    ///    every attached waiter gets `on_success(value, false)`. On
    ///    failure, waiters get the resident entry as
    ///    `on_success(stale, true)` if one exists, else
    ///    `on_error(reason)`.
    ///
    /// `ttl` of `None` uses the configured default. Deferred callbacks
    /// arrive via the dispatch queue; after [`shutdown`] a cache miss
    /// resolves to nothing at all.
    ///
    /// [`shutdown`]: TtlCache::shutdown
    pub fn get_or_refresh<F, S, E>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        force: bool,
        fetch: F,
        on_success: S,
        on_error: E,
    ) where
        F: FnOnce() -> Result<V, FetchError> + Send + 'static,
        S: FnOnce(V, bool) + Send + 'static,
        E: FnOnce(FetchError) + Send + 'static,
    {
        let ttl = ttl.unwrap_or(self.inner.config.default_ttl);

        if !force {
            let entries = self.lock_entries();
            if let Some(entry) = entries.get(key) {
                if !entry.is_stale(Utc::now()) {
                    let value = entry.payload().clone();
                    drop(entries);
                    on_success(value, false);
                    return;
                }
            }
        }

        let waiter = Waiter {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        };
        {
            let mut in_flight = self.lock_in_flight();
            if let Some(waiters) = in_flight.get_mut(key) {
                debug!(%key, waiters = waiters.len() + 1, "joining in-flight fetch");
                waiters.push(waiter);
                return;
            }
            in_flight.insert(key.clone(), vec![waiter]);
        }

        let path = self.inner.config.root.join(key.relative_path());
        let persister = self.inner.persister.clone();
        let operation = move || {
            let value = fetch()?;
            let fetched_at = Utc::now();
            let envelope = PersistEnvelope::new(value.clone(), ttl, fetched_at);
            // Persistence is write-through but non-fatal: a failed
            // write never withholds a successfully fetched value.
            if let Err(err) = persister.write_json(&path, &envelope) {
                warn!(path = %path.display(), error = %err, "failed to persist cache entry");
            }
            Ok((value, fetched_at))
        };

        let inner_ok = Arc::clone(&self.inner);
        let key_ok = key.clone();
        let complete = move |(value, fetched_at): (V, Timestamp)| {
            inner_ok
                .entries
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(key_ok.clone(), CacheEntry::new(value.clone(), ttl, fetched_at));
            let waiters = take_waiters(&inner_ok, &key_ok);
            for waiter in waiters {
                (waiter.on_success)(value.clone(), false);
            }
        };

        let inner_err = Arc::clone(&self.inner);
        let key_err = key.clone();
        let fail = move |err: FetchError| {
            let waiters = take_waiters(&inner_err, &key_err);
            let stale = inner_err
                .entries
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(&key_err)
                .map(|entry| entry.payload().clone());
            match stale {
                Some(value) => {
                    debug!(key = %key_err, "fetch failed; serving stale entry");
                    for waiter in waiters {
                        (waiter.on_success)(value.clone(), true);
                    }
                }
                None => {
                    for waiter in waiters {
                        (waiter.on_error)(err.clone());
                    }
                }
            }
        };

        let handle = self.inner.worker.submit(operation, complete, fail);
        if handle.is_cancelled() {
            // Worker already shut down: the task was never queued, so
            // clear the record instead of wedging the key forever.
            self.lock_in_flight().remove(key);
        }
    }

    /// Load the persisted envelope for `key` into memory, keeping its
    /// original fetch time so staleness carries over a restart.
    ///
    /// Returns false when no readable envelope exists on disk.
    pub fn hydrate(&self, key: &CacheKey) -> bool {
        let path = self.inner.config.root.join(key.relative_path());
        match self.inner.persister.read_json::<PersistEnvelope<V>>(&path) {
            Ok(envelope) => {
                self.lock_entries()
                    .insert(key.clone(), CacheEntry::from_envelope(envelope));
                true
            }
            Err(err) => {
                if !err.is_not_found() {
                    warn!(path = %path.display(), error = %err, "failed to hydrate cache entry");
                }
                false
            }
        }
    }

    /// The resident value for `key`, fresh or stale, without fetching.
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        self.lock_entries()
            .get(key)
            .map(|entry| entry.payload().clone())
    }

    /// Drop `key` from memory and delete its persisted envelope.
    ///
    /// Refused while a fetch for `key` is in flight: the fetch is about
    /// to replace the entry anyway, and removing it mid-flight would
    /// discard the waiters' stale fallback. Returns whether a resident
    /// entry was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        if self.lock_in_flight().contains_key(key) {
            debug!(%key, "invalidate skipped; fetch in flight");
            return false;
        }
        let removed = self.lock_entries().remove(key).is_some();
        let path = self.inner.config.root.join(key.relative_path());
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to delete cache file");
            }
        }
        removed
    }

    /// Whether a resident entry exists for `key`, fresh or stale.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock_entries().contains_key(key)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Shut down the background worker; see [`TaskWorker::shutdown`].
    pub fn shutdown(&self, timeout: Duration) -> Result<(), WorkerError> {
        self.inner.worker.shutdown(timeout)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.inner.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Vec<Waiter<V>>>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

fn take_waiters<V>(inner: &CacheInner<V>, key: &CacheKey) -> Vec<Waiter<V>> {
    inner
        .in_flight
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .remove(key)
        .unwrap_or_default()
}
