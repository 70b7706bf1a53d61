//! In-memory cache entries.
//!
//! Entries are owned exclusively by the cache: the payload is opaque,
//! never mutated in place, and replaced wholesale on refresh.
//! Staleness is derived lazily from `fetched_at` + `ttl` at read time;
//! there is no background eviction.

use chrono::{DateTime, Utc};
use std::time::Duration;

use sideboard_core::PersistEnvelope;

/// One cached value with its freshness window.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    payload: V,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Build an entry fetched at the given instant.
    pub fn new(payload: V, ttl: Duration, fetched_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            fetched_at,
            ttl,
        }
    }

    /// The cached value.
    pub fn payload(&self) -> &V {
        &self.payload
    }

    /// When the value was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// The freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether the entry's age exceeds its freshness window.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.fetched_at).to_std() {
            Ok(age) => age > self.ttl,
            Err(_) => false,
        }
    }

    /// The on-disk form of this entry.
    pub fn to_envelope(&self) -> PersistEnvelope<V>
    where
        V: Clone,
    {
        PersistEnvelope::new(self.payload.clone(), self.ttl, self.fetched_at)
    }

    /// Rebuild an entry from a persisted envelope, preserving its
    /// original fetch time so staleness carries over a restart.
    pub fn from_envelope(envelope: PersistEnvelope<V>) -> Self {
        Self {
            fetched_at: envelope.fetched_at,
            ttl: envelope.ttl(),
            payload: envelope.payload,
        }
    }
}
