//! # Entity
//!
//! An [`Entity`] is one version of a resource's representation: the payload
//! plus the metadata the transport handed us (content type, charset,
//! validator, headers) and the moment we last knew it to be fresh.
//!
//! ## Immutability
//!
//! Once constructed an entity never changes, with one exception:
//! [`Entity::touch`] moves the freshness timestamp forward. That is how a
//! "not modified" response confirms existing data without replacing it.
//!
//! The payload sits behind an `Arc`, so cloning an entity to hand it to
//! observers or callbacks never copies the content. A clone is a separate
//! snapshot: touching the cache's copy does not move the timestamp of a copy
//! somebody else already holds.

pub mod headers;

pub use headers::Headers;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Content type assumed when the source declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// One version of a resource's data.
#[derive(Debug)]
pub struct Entity<P> {
    payload: Arc<P>,
    mime_type: String,
    charset: Option<String>,
    etag: Option<String>,
    headers: Headers,
    timestamp: Instant,
}

impl<P> Clone for Entity<P> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            mime_type: self.mime_type.clone(),
            charset: self.charset.clone(),
            etag: self.etag.clone(),
            headers: self.headers.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl<P> Entity<P> {
    /// Entity with no headers: octet-stream, no validator.
    pub fn new(payload: P) -> Self {
        Self::from_parts(std::iter::empty::<(String, String)>(), payload, None, None)
    }

    /// Entity whose metadata is derived entirely from the raw headers.
    pub fn with_headers<I, K, V>(raw_headers: I, payload: P) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::from_parts(raw_headers, payload, None, None)
    }

    /// Full constructor.
    ///
    /// - Header names are lower-cased.
    /// - `mime_type` falls back to the media type of `content-type`, then to
    ///   [`DEFAULT_MIME_TYPE`].
    /// - `charset` falls back to the `charset` parameter of `content-type`.
    /// - `etag` is the value of the `etag` header, if any.
    pub fn from_parts<I, K, V>(
        raw_headers: I,
        payload: P,
        mime_type: Option<String>,
        charset: Option<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers: Headers = raw_headers.into_iter().collect();
        let content_type = headers.get("content-type").map(parse_content_type);

        let mime_type = mime_type
            .or_else(|| content_type.as_ref().map(|(mime, _)| mime.clone()))
            .filter(|mime| !mime.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let charset = charset.or_else(|| content_type.and_then(|(_, charset)| charset));
        let etag = headers.get("etag").map(str::to_string);

        Self {
            payload: Arc::new(payload),
            mime_type,
            charset,
            etag,
            headers,
            timestamp: Instant::now(),
        }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Shared handle to the payload.
    pub fn payload_arc(&self) -> Arc<P> {
        Arc::clone(&self.payload)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// The validator to send back as a conditional-request hint.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Time since creation or the last [`touch`](Self::touch).
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// Marks the data as confirmed fresh right now.
    pub fn touch(&mut self) {
        self.timestamp = Instant::now();
    }

    /// Runs a transformation over the payload, keeping all metadata.
    pub fn map_payload<Q>(&self, f: impl FnOnce(&P) -> Q) -> Entity<Q> {
        Entity {
            payload: Arc::new(f(&self.payload)),
            mime_type: self.mime_type.clone(),
            charset: self.charset.clone(),
            etag: self.etag.clone(),
            headers: self.headers.clone(),
            timestamp: self.timestamp,
        }
    }
}

// "application/json; charset=UTF-8" -> ("application/json", Some("UTF-8"))
fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_string();
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    (mime, charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metadata_from_headers() {
        let entity = Entity::with_headers(
            [("ETag", "abc"), ("Content-Type", "application/json")],
            "{}".to_string(),
        );

        assert_eq!(entity.mime_type(), "application/json");
        assert_eq!(entity.etag(), Some("abc"));
        assert_eq!(entity.header("etag"), Some("abc"));
        assert_eq!(entity.header("ETAG"), Some("abc"));
        assert_eq!(entity.payload(), "{}");
        assert!(entity.charset().is_none());
    }

    #[test]
    fn test_defaults_without_headers() {
        let entity = Entity::new(vec![1u8, 2, 3]);
        assert_eq!(entity.mime_type(), DEFAULT_MIME_TYPE);
        assert!(entity.etag().is_none());
        assert!(entity.headers().is_empty());
    }

    #[test]
    fn test_explicit_values_beat_headers() {
        let entity = Entity::from_parts(
            [("Content-Type", "text/html; charset=iso-8859-1")],
            (),
            Some("text/plain".to_string()),
            Some("utf-8".to_string()),
        );
        assert_eq!(entity.mime_type(), "text/plain");
        assert_eq!(entity.charset(), Some("utf-8"));
    }

    #[test]
    fn test_charset_from_content_type_parameter() {
        let entity = Entity::with_headers([("content-type", "text/html; Charset=\"UTF-8\"")], ());
        assert_eq!(entity.mime_type(), "text/html");
        assert_eq!(entity.charset(), Some("UTF-8"));
    }

    #[test]
    fn test_touch_only_moves_timestamp() {
        let mut entity = Entity::with_headers(
            [("ETag", "v1"), ("Content-Type", "text/plain"), ("X-Extra", "1")],
            "body".to_string(),
        );
        let before = entity.clone();
        std::thread::sleep(Duration::from_millis(2));

        entity.touch();

        assert!(entity.timestamp() > before.timestamp());
        assert!(Arc::ptr_eq(&entity.payload_arc(), &before.payload_arc()));
        assert_eq!(entity.etag(), before.etag());
        assert_eq!(entity.headers(), before.headers());
        assert_eq!(entity.mime_type(), before.mime_type());
        assert_eq!(entity.charset(), before.charset());
    }

    #[test]
    fn test_touch_does_not_affect_published_clone() {
        let mut entity = Entity::new(1u32);
        let published = entity.clone();
        std::thread::sleep(Duration::from_millis(2));
        entity.touch();
        assert!(published.timestamp() < entity.timestamp());
    }

    #[test]
    fn test_map_payload_keeps_metadata() {
        let raw = Entity::with_headers([("ETag", "x")], b"hello".to_vec());
        let text = raw.map_payload(|bytes| String::from_utf8_lossy(bytes).into_owned());
        assert_eq!(text.payload(), "hello");
        assert_eq!(text.etag(), Some("x"));
        assert_eq!(text.timestamp(), raw.timestamp());
    }
}
