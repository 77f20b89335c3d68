//! # Mock Transports
//!
//! Test doubles for driving a cache without a network.
//!
//! - [`MockTransport`]: queue of scripted outcomes with a fluent builder,
//!   plus a log of every [`FetchRequest`] it saw.
//! - [`create_mock_transport`] + [`expect_fetch`]: a channel-backed transport
//!   that hands each fetch to the test, which answers it whenever it likes.
//!   Use it to hold a load open, report progress, or race cancellation.

use super::{FetchRequest, Progress, Transport};
use crate::entity::Entity;
use crate::request::{Outcome, RequestError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Expectation<P> {
    Respond(Outcome<P>),
    // Never answers; only cancellation ends the fetch.
    Hold,
}

struct MockState<P> {
    expectations: VecDeque<Expectation<P>>,
    recorded: Vec<FetchRequest>,
    unexpected: usize,
}

/// Scripted transport.
///
/// Clones share one script, so keep a clone for assertions and hand another
/// to the cache.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::<String>::new();
/// mock.expect_fetch().return_success(Entity::new("v1".to_string()));
/// mock.expect_fetch().return_not_modified();
///
/// let (cache, dispatcher) = ResourceCache::new("/doc", Arc::new(mock.clone()), CacheConfig::default());
/// // ... load twice ...
/// mock.verify();
/// assert_eq!(mock.requests()[1].etag, None);
/// ```
pub struct MockTransport<P> {
    state: Arc<Mutex<MockState<P>>>,
}

impl<P> Clone for MockTransport<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<P> Default for MockTransport<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> MockTransport<P> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                recorded: Vec::new(),
                unexpected: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the response to the next fetch.
    pub fn expect_fetch(&self) -> FetchExpectationBuilder<P> {
        FetchExpectationBuilder {
            state: Arc::clone(&self.state),
        }
    }

    /// Every fetch seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.lock().recorded.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().recorded.len()
    }

    /// Panics unless every expectation was consumed and no fetch arrived
    /// unannounced.
    pub fn verify(&self) {
        let state = self.lock();
        if state.unexpected > 0 {
            panic!("{} unexpected fetch(es)", state.unexpected);
        }
        if !state.expectations.is_empty() {
            panic!("Not all expectations were met. {} remaining", state.expectations.len());
        }
    }
}

#[async_trait]
impl<P: Send + Sync + 'static> Transport<P> for MockTransport<P> {
    async fn fetch(&self, request: FetchRequest, _progress: Progress<P>) -> Outcome<P> {
        let expectation = {
            let mut state = self.lock();
            state.recorded.push(request.clone());
            let next = state.expectations.pop_front();
            if next.is_none() {
                state.unexpected += 1;
            }
            next
        };

        match expectation {
            Some(Expectation::Respond(outcome)) => outcome,
            Some(Expectation::Hold) => std::future::pending().await,
            None => {
                warn!(resource = %request.identity, "Unexpected fetch");
                Outcome::Failure(RequestError::new(format!(
                    "unexpected fetch of {}",
                    request.identity
                )))
            }
        }
    }
}

/// Builder for one scripted fetch.
pub struct FetchExpectationBuilder<P> {
    state: Arc<Mutex<MockState<P>>>,
}

impl<P> FetchExpectationBuilder<P> {
    fn push(self, expectation: Expectation<P>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .expectations
            .push_back(expectation);
    }

    pub fn return_success(self, entity: Entity<P>) {
        self.push(Expectation::Respond(Outcome::Success(entity)));
    }

    pub fn return_not_modified(self) {
        self.push(Expectation::Respond(Outcome::NotModified));
    }

    pub fn return_failure(self, error: RequestError) {
        self.push(Expectation::Respond(Outcome::Failure(error)));
    }

    /// The fetch never completes on its own; cancel the request to end it.
    pub fn hold(self) {
        self.push(Expectation::Hold);
    }
}

// =============================================================================
// CHANNEL HELPERS
// =============================================================================

/// A fetch waiting for the test to answer it.
pub struct FetchCall<P> {
    pub request: FetchRequest,
    pub progress: Progress<P>,
    pub respond_to: oneshot::Sender<Outcome<P>>,
}

/// Transport that forwards every fetch over a channel.
pub struct ChannelTransport<P> {
    sender: mpsc::Sender<FetchCall<P>>,
}

impl<P> Clone for ChannelTransport<P> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl<P: Send + Sync + 'static> Transport<P> for ChannelTransport<P> {
    async fn fetch(&self, request: FetchRequest, progress: Progress<P>) -> Outcome<P> {
        let (respond_to, response) = oneshot::channel();
        let call = FetchCall {
            request,
            progress,
            respond_to,
        };
        if self.sender.send(call).await.is_err() {
            return Outcome::Failure(RequestError::new("transport channel closed"));
        }
        response
            .await
            .unwrap_or_else(|_| Outcome::Failure(RequestError::new("fetch responder dropped")))
    }
}

/// Creates a channel-backed transport and the receiver the test reads
/// fetches from.
pub fn create_mock_transport<P>(buffer_size: usize) -> (ChannelTransport<P>, mpsc::Receiver<FetchCall<P>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ChannelTransport { sender }, receiver)
}

/// Waits for the next fetch. `None` once every transport handle is gone.
pub async fn expect_fetch<P>(
    receiver: &mut mpsc::Receiver<FetchCall<P>>,
) -> Option<(FetchRequest, Progress<P>, oneshot::Sender<Outcome<P>>)> {
    let call = receiver.recv().await?;
    Some((call.request, call.progress, call.respond_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn fetch_request(identity: &str) -> FetchRequest {
        FetchRequest {
            identity: identity.to_string(),
            request_id: 0,
            etag: Some("\"v1\"".to_string()),
            fresh_as_of: None,
        }
    }

    #[tokio::test]
    async fn test_mock_transport_scripted_outcomes() {
        let mock = MockTransport::<u32>::new();
        mock.expect_fetch().return_success(Entity::new(1));
        mock.expect_fetch().return_failure(RequestError::http_status(503));

        let (_request, resolver) = Request::pending();
        let first = mock.fetch(fetch_request("/a"), Progress::new(resolver.clone())).await;
        let second = mock.fetch(fetch_request("/b"), Progress::new(resolver)).await;

        assert!(first.is_success());
        assert_eq!(second.error().and_then(RequestError::http_status_code), Some(503));
        assert_eq!(mock.fetch_count(), 2);
        assert_eq!(mock.requests()[1].identity, "/b");
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "unexpected fetch")]
    async fn test_mock_transport_flags_unexpected_fetch() {
        let mock = MockTransport::<u32>::new();
        let (_request, resolver) = Request::pending();

        let outcome = mock.fetch(fetch_request("/a"), Progress::new(resolver)).await;
        assert!(outcome.is_failure());

        mock.verify();
    }

    #[tokio::test]
    async fn test_channel_transport() {
        let (transport, mut receiver) = create_mock_transport::<u32>(4);
        let (_request, resolver) = Request::pending();

        let fetch = tokio::spawn(async move {
            transport.fetch(fetch_request("/a"), Progress::new(resolver)).await
        });

        let (request, _progress, respond_to) = expect_fetch(&mut receiver).await.expect("fetch");
        assert_eq!(request.etag.as_deref(), Some("\"v1\""));
        respond_to.send(Outcome::NotModified).ok();

        assert!(fetch.await.unwrap().is_not_modified());
    }
}
