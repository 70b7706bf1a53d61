//! Sideboard Cache - Background Refresh Runtime
//!
//! Keeps locally-derived data (metagame listings, deck lists, session
//! settings) instantly available on the interactive thread while
//! refreshing it in the background. The moving parts:
//!
//! - [`dispatch`]: the single marshaling seam. Background threads post
//!   closures; the owning thread drains them. Every callback in this
//!   crate is delivered through it.
//! - [`TaskWorker`]: one dedicated thread draining a FIFO task queue,
//!   with pre-execution cancellation and drain-with-deadline shutdown.
//! - [`TtlCache`]: keyed entries with freshness windows, single-flight
//!   fetch coalescing, stale-on-failure fallback, and write-through
//!   persistence via [`sideboard_storage::AtomicPersister`].
//! - [`merge`]: priority-ordered union of independently-fetched
//!   sub-sources, deduplicated by a stable identity field.
//! - [`DebouncedSaveScheduler`]: collapses bursts of mutation events
//!   into one deferred persist, with a synchronous flush for teardown.
//!
//! # Threading contract
//!
//! Exactly two threads matter per cache instance: the owning
//! (interactive) thread and the worker thread. `get_or_refresh`,
//! `submit`, and `schedule_save` never block the caller. Callbacks
//! always run on the owning thread, when it pumps the dispatch queue.
//! Cross-key completion order is unspecified.

pub mod debounce;
pub mod dispatch;
pub mod entry;
pub mod merge;
pub mod ttl;
pub mod worker;

pub use debounce::DebouncedSaveScheduler;
pub use dispatch::{dispatch_queue, DispatchHandle, DispatchQueue};
pub use entry::CacheEntry;
pub use merge::{merge_by_identity, MergeCollector, SourceBatch, SourceRank};
pub use ttl::{CacheConfig, TtlCache};
pub use worker::{TaskHandle, TaskWorker};
