//! # Transport
//!
//! The seam between a cache and the network. A [`Transport`] receives a
//! conditional [`FetchRequest`] and eventually produces exactly one
//! [`Outcome`]. Failures are values (`Outcome::Failure`), never panics or
//! `Err`s escaping the request.
//!
//! Cancellation is best effort. The cache races every fetch against the
//! request's cancellation, so a transport that ignores [`Progress::cancelled`]
//! is simply dropped mid-flight; a transport that watches it can clean up
//! first.
//!
//! See [`mock`] for test doubles.

pub mod mock;

use crate::request::{Outcome, Resolver};
use async_trait::async_trait;
use std::time::Instant;

/// What to fetch, plus the validators the cache already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Identity of the resource (usually a URL or path).
    pub identity: String,
    /// Id of the [`Request`](crate::request::Request) this fetch settles.
    pub request_id: u64,
    /// Validator of the cached entity, for `If-None-Match`.
    pub etag: Option<String>,
    /// Local clock reading of when the cached entity was last confirmed
    /// fresh. Monotonic, so it cannot become an `If-Modified-Since` date.
    pub fresh_as_of: Option<Instant>,
}

/// Progress sink for one fetch.
pub struct Progress<P> {
    resolver: Resolver<P>,
}

impl<P> Progress<P> {
    pub(crate) fn new(resolver: Resolver<P>) -> Self {
        Self { resolver }
    }

    pub fn request_id(&self) -> u64 {
        self.resolver.request_id()
    }

    /// Reports fractional completion; clamped to `[0, 1]`.
    pub fn report(&self, progress: f64) {
        self.resolver.report_progress(progress);
    }

    pub fn is_cancelled(&self) -> bool {
        self.resolver.is_cancelled()
    }

    /// Completes once the consumer cancels the request.
    pub async fn cancelled(&self) {
        self.resolver.cancelled().await
    }
}

/// Performs fetches for caches holding payloads of type `P`.
#[async_trait]
pub trait Transport<P>: Send + Sync + 'static {
    async fn fetch(&self, request: FetchRequest, progress: Progress<P>) -> Outcome<P>;
}
