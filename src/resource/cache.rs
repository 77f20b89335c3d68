//! # Resource Cache
//!
//! A [`ResourceCache`] is the local state of one remote resource: the latest
//! [`Entity`], the latest [`RequestError`], and the load currently in flight.
//!
//! ## State machine
//!
//! ```text
//!   Idle(entity?, error?) --load()--> Loading(entity?, error?, request)
//!   Loading --Success(e)----> Idle(e, None)          NewData(Network)
//!   Loading --NotModified---> Idle(touched, error)   NotModified
//!   Loading --Failure(err)--> Idle(entity, err)      Error
//! ```
//!
//! State only changes by applying the outcome of a resolved [`Request`]. A
//! second `load()` while one is in flight returns the same request.
//!
//! ## Concurrency
//!
//! The handle is cheap to clone and can be used from any task. State sits
//! behind a short-lived mutex that is never held while user code runs.
//! Observer callbacks run on the cache's [`Dispatcher`] task.
//!
//! ## Lifetime
//!
//! The cache lives as long as any handle does. An in-flight load holds one,
//! so a cache is never freed mid-request; the dispatcher only holds it
//! weakly.

use super::config::CacheConfig;
use super::dispatcher::{Dispatcher, Notification};
use crate::entity::Entity;
use crate::lifecycle::ServiceError;
use crate::observer::{NewDataSource, ObserverOwner, ObserverRegistry, ResourceEvent, ResourceObserver};
use crate::request::{Outcome, Request, RequestError, Resolver};
use crate::transport::{FetchRequest, Progress, Transport};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Observer of a cache holding payloads of type `P`.
pub type CacheObserver<P> = Arc<dyn ResourceObserver<ResourceCache<P>>>;

struct CacheState<P> {
    latest_entity: Option<Entity<P>>,
    latest_error: Option<RequestError>,
    current_request: Option<Request<P>>,
    invalidated: bool,
}

impl<P> CacheState<P> {
    fn is_fresh(&self, threshold: Duration) -> bool {
        !self.invalidated
            && self
                .latest_entity
                .as_ref()
                .is_some_and(|entity| entity.age() <= threshold)
    }

    // A failure newer than the entity suppresses reloads for `retry_time`.
    // Cancellations never count.
    fn in_retry_backoff(&self, retry_time: Duration) -> bool {
        if retry_time.is_zero() {
            return false;
        }
        let Some(error) = &self.latest_error else {
            return false;
        };
        let newer_than_entity = self
            .latest_entity
            .as_ref()
            .map_or(true, |entity| error.timestamp() > entity.timestamp());
        !error.is_cancellation() && newer_than_entity && error.timestamp().elapsed() < retry_time
    }
}

pub(crate) struct Inner<P> {
    identity: String,
    config: CacheConfig,
    transport: Arc<dyn Transport<P>>,
    state: Mutex<CacheState<P>>,
    observers: Mutex<ObserverRegistry<ResourceCache<P>>>,
    notifier: mpsc::UnboundedSender<Notification<P>>,
}

impl<P> Inner<P> {
    fn lock_state(&self) -> MutexGuard<'_, CacheState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(&self) -> MutexGuard<'_, ObserverRegistry<ResourceCache<P>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, notification: Notification<P>) {
        if self.notifier.send(notification).is_err() {
            debug!(resource = %self.identity, "Dispatcher gone, notification dropped");
        }
    }
}

impl<P> Drop for Inner<P> {
    fn drop(&mut self) {
        debug!(resource = %self.identity, "Cache released");
    }
}

/// Shared handle to the cached state of one resource.
pub struct ResourceCache<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for ResourceCache<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> PartialEq for ResourceCache<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<P> fmt::Debug for ResourceCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("ResourceCache")
            .field("identity", &self.inner.identity)
            .field("has_entity", &state.latest_entity.is_some())
            .field("has_error", &state.latest_error.is_some())
            .field("loading", &state.current_request.is_some())
            .finish()
    }
}

impl<P> ResourceCache<P> {
    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn latest_entity(&self) -> Option<Entity<P>> {
        self.inner.lock_state().latest_entity.clone()
    }

    /// Payload of the latest entity, if any.
    pub fn latest_payload(&self) -> Option<Arc<P>> {
        self.inner
            .lock_state()
            .latest_entity
            .as_ref()
            .map(Entity::payload_arc)
    }

    pub fn latest_error(&self) -> Option<RequestError> {
        self.inner.lock_state().latest_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().current_request.is_some()
    }

    pub fn current_request(&self) -> Option<Request<P>> {
        self.inner.lock_state().current_request.clone()
    }

    /// True when an entity exists, was not invalidated, and is younger than
    /// the configured expiration.
    pub fn is_up_to_date(&self) -> bool {
        self.inner.lock_state().is_fresh(self.inner.config.expiration())
    }

    /// Number of observers whose owner is still alive.
    pub fn observer_count(&self) -> usize {
        self.inner.lock_observers().live_count()
    }

    pub(crate) fn upgrade(weak: &Weak<Inner<P>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Strong handles, in-flight loads included.
    pub(crate) fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn stop_dispatcher(&self) {
        self.inner.enqueue(Notification::Shutdown);
    }
}

impl<P: Send + Sync + 'static> ResourceCache<P> {
    /// Creates a cache and its dispatcher. The dispatcher must be spawned
    /// before observers hear anything.
    pub fn new(
        identity: impl Into<String>,
        transport: Arc<dyn Transport<P>>,
        config: CacheConfig,
    ) -> (Self, Dispatcher<P>) {
        let identity = identity.into();
        let (notifier, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            identity: identity.clone(),
            config,
            transport,
            state: Mutex::new(CacheState {
                latest_entity: None,
                latest_error: None,
                current_request: None,
                invalidated: false,
            }),
            observers: Mutex::new(ObserverRegistry::deferred()),
            notifier,
        });
        let dispatcher = Dispatcher::new(identity, Arc::downgrade(&inner), receiver);
        (Self { inner }, dispatcher)
    }

    /// [`new`](Self::new), with the dispatcher spawned on the current runtime.
    pub fn spawn(
        identity: impl Into<String>,
        transport: Arc<dyn Transport<P>>,
        config: CacheConfig,
    ) -> (Self, JoinHandle<()>) {
        let (cache, dispatcher) = Self::new(identity, transport, config);
        (cache, tokio::spawn(dispatcher.run()))
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Starts a load, or joins the one in flight.
    ///
    /// The fetch carries the current entity's etag and timestamp as
    /// conditional hints. Observers hear `RequestStarted` once per new load.
    pub fn load(&self) -> Request<P> {
        let (request, resolver, fetch) = {
            let mut state = self.inner.lock_state();
            if let Some(request) = &state.current_request {
                debug!(resource = %self.inner.identity, request_id = request.id(), "Joining load in flight");
                return request.clone();
            }

            let (request, resolver) = Request::pending();
            let fetch = FetchRequest {
                identity: self.inner.identity.clone(),
                request_id: request.id(),
                etag: state
                    .latest_entity
                    .as_ref()
                    .and_then(|entity| entity.etag().map(str::to_owned)),
                fresh_as_of: state.latest_entity.as_ref().map(Entity::timestamp),
            };
            state.current_request = Some(request.clone());
            self.inner.enqueue(Notification::Changed(ResourceEvent::RequestStarted));
            (request, resolver, fetch)
        };

        let request_id = request.id();
        info!(resource = %self.inner.identity, request_id, conditional = fetch.etag.is_some(), "Load started");

        let cache = self.clone();
        request.on_settled(move |outcome| {
            cache.apply_outcome(request_id, outcome, NewDataSource::Network)
        });
        let weak = Arc::downgrade(&self.inner);
        request.on_progress(move |progress| {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue(Notification::Progress(progress));
            }
        });

        let span = info_span!("load", resource = %self.inner.identity, request_id);
        let transport = Arc::clone(&self.inner.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(drive(transport, fetch, resolver).instrument(span));
            }
            Err(error) => {
                warn!(resource = %self.inner.identity, request_id, "No async runtime, load failed");
                let failure = RequestError::transport(error)
                    .with_user_message("No async runtime available to perform the load");
                if let Err(error) = resolver.resolve(Outcome::Failure(failure)) {
                    warn!(request_id, %error, "Outcome discarded");
                }
            }
        }
        request
    }

    /// Loads unless the cached data is fresh enough.
    ///
    /// Returns the in-flight request if there is one, a new request if the
    /// entity is missing, invalidated or older than the configured
    /// expiration, and `None` otherwise.
    pub fn load_if_needed(&self) -> Option<Request<P>> {
        self.load_if_needed_within(self.inner.config.expiration())
    }

    /// [`load_if_needed`](Self::load_if_needed) with an explicit staleness
    /// threshold.
    pub fn load_if_needed_within(&self, threshold: Duration) -> Option<Request<P>> {
        {
            let state = self.inner.lock_state();
            if let Some(request) = &state.current_request {
                return Some(request.clone());
            }
            if state.is_fresh(threshold) {
                trace!(resource = %self.inner.identity, "Up to date, no load");
                return None;
            }
            if state.in_retry_backoff(self.inner.config.retry_time()) {
                debug!(resource = %self.inner.identity, "Recent failure, load deferred");
                return None;
            }
        }
        Some(self.load())
    }

    /// Marks the cached data stale. The next `load_if_needed` reloads; the
    /// mark clears on the next successful or not-modified outcome.
    pub fn invalidate(&self) {
        self.inner.lock_state().invalidated = true;
        debug!(resource = %self.inner.identity, "Invalidated");
    }

    /// Publishes `entity` as if it had just been loaded. Observers hear
    /// `NewData(LocalOverride)`. Does not touch a load in flight.
    pub fn override_local_data(&self, entity: Entity<P>) -> Request<P> {
        let (request, resolver) = Request::pending();
        let request_id = request.id();
        let cache = self.clone();
        request.on_settled(move |outcome| {
            cache.apply_outcome(request_id, outcome, NewDataSource::LocalOverride)
        });
        if let Err(error) = resolver.resolve(Outcome::Success(entity)) {
            warn!(request_id, %error, "Local override discarded");
        }
        request
    }

    /// Cancels the load in flight, if any. The cache goes idle once the
    /// transport side reports back.
    pub fn cancel_load(&self) -> bool {
        let Some(request) = self.current_request() else {
            return false;
        };
        info!(resource = %self.inner.identity, request_id = request.id(), "Cancelling load");
        request.cancel();
        true
    }

    /// Cancels the load in flight only if nobody is watching.
    pub fn cancel_load_if_unobserved(&self) -> bool {
        if self.observer_count() > 0 {
            return false;
        }
        self.cancel_load()
    }

    fn apply_outcome(&self, request_id: u64, outcome: &Outcome<P>, source: NewDataSource) {
        let resource = self.inner.identity.as_str();
        let mut state = self.inner.lock_state();
        if state.current_request.as_ref().map(Request::id) == Some(request_id) {
            state.current_request = None;
        }

        let event = match outcome {
            Outcome::Success(entity) => {
                info!(%resource, request_id, ?source, mime_type = entity.mime_type(), "New data");
                state.latest_entity = Some(entity.clone());
                state.latest_error = None;
                state.invalidated = false;
                ResourceEvent::NewData(source)
            }
            Outcome::NotModified => {
                debug!(%resource, request_id, "Not modified");
                if let Some(entity) = state.latest_entity.as_mut() {
                    entity.touch();
                }
                state.invalidated = false;
                ResourceEvent::NotModified
            }
            Outcome::Failure(error) => {
                warn!(%resource, request_id, %error, cancelled = error.is_cancellation(), "Load failed");
                state.latest_error = Some(error.clone());
                ResourceEvent::Error
            }
        };
        self.inner.enqueue(Notification::Changed(event));
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Registers `observer` under `owner`. The observer hears
    /// `ObserverAdded` first. Adding the same pair twice is a no-op.
    pub fn add_observer(&self, observer: CacheObserver<P>, owner: &impl ObserverOwner) -> &Self {
        // Lock order: state, then observers.
        let _state = self.inner.lock_state();
        let mut observers = self.inner.lock_observers();
        if observers.insert(Arc::clone(&observer), owner) {
            debug!(resource = %self.inner.identity, "Observer added");
            self.inner.enqueue(Notification::ObserverAdded(observer));
        }
        self
    }

    /// Registers an observer that is its own owner. It stays registered as
    /// long as the caller keeps a handle to it.
    pub fn add_self_owned_observer<O>(&self, observer: &Arc<O>) -> &Self
    where
        O: ResourceObserver<ResourceCache<P>> + 'static,
    {
        let _state = self.inner.lock_state();
        let mut observers = self.inner.lock_observers();
        if observers.add_self_owned(observer) {
            debug!(resource = %self.inner.identity, "Self-owned observer added");
            let observer: CacheObserver<P> = observer.clone();
            self.inner.enqueue(Notification::ObserverAdded(observer));
        }
        self
    }

    /// Removes everything registered under `owned_by`; the removed observers
    /// hear `stopped_observing_resource`.
    pub fn remove_observers(&self, owned_by: &impl ObserverOwner) -> &Self {
        let removed = self.inner.lock_observers().remove_observers(owned_by);
        if !removed.is_empty() {
            debug!(resource = %self.inner.identity, removed = removed.len(), "Observers removed");
            self.inner.enqueue(Notification::Stopped(removed));
        }
        self
    }

    /// Waits until every notification queued before this call was delivered.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let (respond_to, response) = oneshot::channel();
        let stopped = || ServiceError::DispatcherStopped(self.inner.identity.clone());
        self.inner
            .notifier
            .send(Notification::Barrier(respond_to))
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    pub(crate) fn deliver(&self, notification: Notification<P>) {
        match notification {
            Notification::Changed(event) => {
                let (stopped, live) = {
                    let mut observers = self.inner.lock_observers();
                    (observers.prune(), observers.live_observers())
                };
                if !stopped.is_empty() {
                    debug!(resource = %self.inner.identity, pruned = stopped.len(), "Pruned observers");
                }
                for observer in stopped {
                    observer.stopped_observing_resource(self);
                }
                trace!(resource = %self.inner.identity, %event, observers = live.len(), "Notify");
                for observer in live {
                    observer.resource_changed(self, &event);
                }
            }
            Notification::ObserverAdded(observer) => {
                self.inner.lock_observers().announce(&observer);
                observer.resource_changed(self, &ResourceEvent::ObserverAdded);
            }
            Notification::Progress(progress) => {
                let live = self.inner.lock_observers().live_observers();
                for observer in live {
                    observer.resource_request_progress(self, progress);
                }
            }
            Notification::Stopped(removed) => {
                for observer in removed {
                    observer.stopped_observing_resource(self);
                }
            }
            Notification::Barrier(respond_to) => {
                let _ = respond_to.send(());
            }
            Notification::Shutdown => {}
        }
    }
}

// Runs one fetch to completion, or until the request is cancelled.
async fn drive<P: Send + Sync + 'static>(
    transport: Arc<dyn Transport<P>>,
    fetch: FetchRequest,
    resolver: Resolver<P>,
) {
    let progress = Progress::new(resolver.clone());
    let outcome = tokio::select! {
        outcome = transport.fetch(fetch, progress) => outcome,
        _ = resolver.cancelled() => {
            debug!("Fetch abandoned after cancel");
            Outcome::Failure(RequestError::cancelled())
        }
    };
    trace!(outcome = outcome.label(), "Fetch finished");
    if let Err(error) = resolver.resolve(outcome) {
        warn!(%error, "Outcome discarded");
    }
}
