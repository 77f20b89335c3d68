//! # Headers
//!
//! Header map with lower-cased keys. Header sources hand us names in whatever
//! case the wire produced, so normalization happens once at construction and
//! every lookup normalizes its query the same way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response headers keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a header map from raw `(name, value)` pairs.
    ///
    /// When two names differ only by case, the later pair wins.
    pub fn from_raw<I, K, V>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        raw.into_iter().collect()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(name, value)` pairs in name order. Names are lower case.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let headers = Headers::from_raw([("X-Request-Id", "42"), ("content-TYPE", "text/plain")]);

        for key in ["x-request-id", "X-REQUEST-ID", "X-Request-Id"] {
            assert_eq!(headers.get(key), Some("42"));
        }
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert!(headers.get("missing").is_none());
    }

    #[test]
    fn test_keys_are_stored_lower_case() {
        let headers = Headers::from_raw([("ETag", "abc"), ("Cache-Control", "no-cache")]);
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["cache-control", "etag"]);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let headers = Headers::from_raw([("ETag", "first"), ("etag", "second")]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("etag"), Some("second"));
    }

    #[test]
    fn test_deserialize_normalizes_keys() {
        let headers: Headers = serde_json::from_str(r#"{"ETag":"abc","Content-Type":"text/html"}"#).unwrap();
        assert_eq!(headers.get("etag"), Some("abc"));
        assert!(headers.iter().all(|(k, _)| k == k.to_ascii_lowercase()));
    }
}
