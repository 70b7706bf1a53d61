//! On-disk representation of a cache entry.
//!
//! One self-describing JSON document per cache key:
//! `{fetched_at, ttl_seconds, payload}`. The payload is opaque to the
//! cache; staleness is derived from `fetched_at` + `ttl_seconds` at
//! read time, never stored.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted form of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistEnvelope<T> {
    /// When the payload was fetched from its source.
    pub fetched_at: DateTime<Utc>,
    /// Freshness window in whole seconds.
    pub ttl_seconds: u64,
    /// The cached value, opaque to the cache layer.
    pub payload: T,
}

impl<T> PersistEnvelope<T> {
    /// Build an envelope fetched now with the given freshness window.
    ///
    /// Sub-second TTL precision is dropped; the original tool persists
    /// whole seconds and freshness windows are minutes to hours.
    pub fn new(payload: T, ttl: Duration, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            ttl_seconds: ttl.as_secs(),
            payload,
        }
    }

    /// The freshness window as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Whether the envelope is stale as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match age.to_std() {
            Ok(age) => age > self.ttl(),
            // fetched_at in the future: clock skew, treat as fresh
            Err(_) => false,
        }
    }
}

impl<T: Serialize> PersistEnvelope<T> {
    /// Serialize to the on-disk JSON document.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

impl<T: DeserializeOwned> PersistEnvelope<T> {
    /// Parse an on-disk JSON document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_within_ttl() {
        let fetched = fixed_now();
        let env = PersistEnvelope::new(vec![1, 2, 3], Duration::from_secs(60), fetched);
        let now = fetched + chrono::Duration::seconds(59);
        assert!(!env.is_stale(now));
    }

    #[test]
    fn test_stale_after_ttl() {
        let fetched = fixed_now();
        let env = PersistEnvelope::new("payload", Duration::from_secs(60), fetched);
        let now = fetched + chrono::Duration::seconds(70);
        assert!(env.is_stale(now));
    }

    #[test]
    fn test_boundary_is_not_stale() {
        // Staleness is strictly "older than ttl", not "at least ttl".
        let fetched = fixed_now();
        let env = PersistEnvelope::new((), Duration::from_secs(60), fetched);
        let now = fetched + chrono::Duration::seconds(60);
        assert!(!env.is_stale(now));
    }

    #[test]
    fn test_future_fetched_at_is_fresh() {
        let fetched = fixed_now();
        let env = PersistEnvelope::new((), Duration::from_secs(60), fetched);
        let now = fetched - chrono::Duration::seconds(10);
        assert!(!env.is_stale(now));
    }

    #[test]
    fn test_json_roundtrip() {
        let env = PersistEnvelope::new(
            serde_json::json!({"decks": ["burn", "control"]}),
            Duration::from_secs(3600),
            fixed_now(),
        );
        let bytes = env.to_bytes().unwrap();
        let parsed: PersistEnvelope<serde_json::Value> =
            PersistEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn test_document_is_self_describing() {
        let env = PersistEnvelope::new(42u32, Duration::from_secs(10), fixed_now());
        let text = String::from_utf8(env.to_bytes().unwrap()).unwrap();
        assert!(text.contains("fetched_at"));
        assert!(text.contains("ttl_seconds"));
        assert!(text.contains("payload"));
    }
}
