//! Cache key type with deterministic on-disk path derivation.
//!
//! A key is a namespace (the data category, e.g. `"metagame"`) plus an
//! identifier (the sub-selector, e.g. a format name). Lookup is by
//! equality only; keys carry no ordering semantics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A cache key: namespace plus identifier.
///
/// # Design
///
/// The private fields ensure a `CacheKey` can only be constructed via
/// [`CacheKey::new`], which sanitizes both components, so every key maps
/// to a well-formed relative file path. One file exists per key.
///
/// # On-disk mapping
///
/// [`CacheKey::relative_path`] derives `<namespace>/<identifier>.json`.
/// Characters that are path separators or otherwise hostile to file
/// names are replaced with `_` at construction, so two keys that differ
/// only in hostile characters may collide; callers are expected to use
/// plain identifiers (format names, archetype slugs, setting groups).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    namespace: String,
    identifier: String,
}

impl CacheKey {
    /// Create a new cache key, sanitizing both components.
    pub fn new(namespace: impl AsRef<str>, identifier: impl AsRef<str>) -> Self {
        Self {
            namespace: sanitize_component(namespace.as_ref()),
            identifier: sanitize_component(identifier.as_ref()),
        }
    }

    /// The data category this key belongs to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The sub-selector within the namespace.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Relative path of the persisted envelope for this key.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.namespace).join(format!("{}.json", self.identifier))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.identifier)
    }
}

/// Replace path separators and control characters with `_`.
///
/// Empty or all-dot components become `_` so the derived path always
/// has both levels and never escapes the cache root.
fn sanitize_component(raw: &str) -> String {
    if raw.is_empty() || raw.chars().all(|c| c == '.') {
        return "_".to_string();
    }
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_and_hash_by_value() {
        use std::collections::HashMap;
        let a = CacheKey::new("metagame", "modern");
        let b = CacheKey::new("metagame", "modern");
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn test_relative_path_shape() {
        let key = CacheKey::new("decklists", "burn");
        assert_eq!(key.relative_path(), PathBuf::from("decklists/burn.json"));
    }

    #[test]
    fn test_separators_are_sanitized() {
        let key = CacheKey::new("meta/game", "mod:ern");
        assert_eq!(key.namespace(), "meta_game");
        assert_eq!(key.identifier(), "mod_ern");
        let path = key.relative_path();
        assert_eq!(path.components().count(), 2);
    }

    #[test]
    fn test_empty_components_become_placeholder() {
        let key = CacheKey::new("", "");
        assert_eq!(key.relative_path(), PathBuf::from("_/_.json"));
    }

    #[test]
    fn test_display() {
        let key = CacheKey::new("session", "window");
        assert_eq!(format!("{}", key), "session/window");
    }

    #[test]
    fn test_serde_roundtrip() {
        let key = CacheKey::new("metagame", "legacy");
        let json = serde_json::to_string(&key).unwrap();
        let parsed: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    proptest::proptest! {
        #[test]
        fn prop_relative_path_stays_under_root(ns in ".*", id in ".*") {
            let key = CacheKey::new(&ns, &id);
            let path = key.relative_path();
            // Always exactly namespace dir + file, no parent escapes.
            proptest::prop_assert_eq!(path.components().count(), 2);
            proptest::prop_assert!(path
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_))));
        }
    }
}
