//! # Request & Resolver
//!
//! A [`Request`] is the consumer half of one fetch; a [`Resolver`] is the
//! producer half handed to whoever performs the I/O. They share one state
//! cell, the same split as a `oneshot` sender/receiver pair, except that a
//! request accepts any number of callbacks on several channels.
//!
//! ## Channels
//!
//! Every channel is derived from [`Request::on_completion`], which receives
//! the full [`Outcome`]. `on_success`, `on_new_data`, `on_not_modified` and
//! `on_failure` are filters over it, so resolution logic lives in one place.
//!
//! ## Ordering
//!
//! Callbacks fire in registration order, each exactly once. A callback
//! registered after resolution fires right away on the calling context. If
//! registration races with delivery, the new callback is queued behind the
//! ones still being delivered.
//!
//! ## Cancellation
//!
//! [`Request::cancel`] on a pending request moves it to `Cancelled`: pending
//! callbacks are dropped, later registrations never fire, and the resolver's
//! [`cancelled`](Resolver::cancelled) future wakes so the transport can stop.
//! The resolver must still report once. That report does not reach public
//! callbacks, but crate-internal settle hooks (the owning cache's bookkeeping)
//! always see it.

use super::error::{RequestError, ResolveError};
use super::outcome::Outcome;
use crate::entity::Entity;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace, warn};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

type Callback<P> = Box<dyn FnOnce(&Outcome<P>) + Send>;
type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Coarse state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Resolved,
    Cancelled,
}

enum Phase<P> {
    Pending,
    Resolved(Outcome<P>),
    Cancelled,
}

struct Shared<P> {
    phase: Phase<P>,
    // Set by the first resolver report, even when cancelled.
    settled: Option<Outcome<P>>,
    delivering: bool,
    callbacks: Vec<Callback<P>>,
    settle_hooks: Vec<Callback<P>>,
    progress: f64,
    progress_callbacks: Vec<ProgressCallback>,
}

struct RequestInner<P> {
    id: u64,
    shared: Mutex<Shared<P>>,
    cancelled: AtomicBool,
    cancel_signal: Notify,
}

impl<P> RequestInner<P> {
    fn lock(&self) -> MutexGuard<'_, Shared<P>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Outcome<P>) -> Result<(), ResolveError> {
        let mut shared = self.lock();
        if shared.settled.is_some() {
            return Err(ResolveError::AlreadyResolved(self.id));
        }
        shared.settled = Some(outcome.clone());
        let hooks = std::mem::take(&mut shared.settle_hooks);
        let deliver = matches!(shared.phase, Phase::Pending);
        if deliver {
            shared.phase = Phase::Resolved(outcome.clone());
            shared.progress = 1.0;
            shared.delivering = true;
        }
        shared.progress_callbacks.clear();
        drop(shared);

        trace!(request_id = self.id, outcome = outcome.label(), deliver, "Request settled");
        for hook in hooks {
            hook(&outcome);
        }
        if deliver {
            self.drain(&outcome);
        }
        Ok(())
    }

    // Runs queued callbacks until none are left. Callbacks registered while
    // this runs land in the queue and are picked up by the next pass.
    fn drain(&self, outcome: &Outcome<P>) {
        loop {
            let batch = {
                let mut shared = self.lock();
                if shared.callbacks.is_empty() {
                    shared.delivering = false;
                    return;
                }
                std::mem::take(&mut shared.callbacks)
            };
            for callback in batch {
                callback(outcome);
            }
        }
    }
}

/// Handle to one fetch. Cheap to clone; clones refer to the same request.
pub struct Request<P> {
    inner: Arc<RequestInner<P>>,
}

impl<P> Clone for Request<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> PartialEq for Request<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<P> Eq for Request<P> {}

impl<P> fmt::Debug for Request<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<P> Request<P> {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn status(&self) -> RequestStatus {
        match self.inner.lock().phase {
            Phase::Pending => RequestStatus::Pending,
            Phase::Resolved(_) => RequestStatus::Resolved,
            Phase::Cancelled => RequestStatus::Cancelled,
        }
    }

    /// True once resolved or cancelled.
    pub fn is_completed(&self) -> bool {
        self.status() != RequestStatus::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == RequestStatus::Cancelled
    }

    /// The outcome, if resolved. Cancelled requests have none.
    pub fn outcome(&self) -> Option<Outcome<P>> {
        match &self.inner.lock().phase {
            Phase::Resolved(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Last reported progress in `0.0..=1.0`; `1.0` once resolved.
    pub fn progress(&self) -> f64 {
        self.inner.lock().progress
    }
}

impl<P: Send + Sync + 'static> Request<P> {
    /// Creates a pending request and the resolver that settles it.
    pub fn pending() -> (Self, Resolver<P>) {
        let inner = Arc::new(RequestInner {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            shared: Mutex::new(Shared {
                phase: Phase::Pending,
                settled: None,
                delivering: false,
                callbacks: Vec::new(),
                settle_hooks: Vec::new(),
                progress: 0.0,
                progress_callbacks: Vec::new(),
            }),
            cancelled: AtomicBool::new(false),
            cancel_signal: Notify::new(),
        });
        let resolver = Resolver {
            guard: Arc::new(ResolverGuard {
                request: Arc::clone(&inner),
            }),
        };
        (Self { inner }, resolver)
    }

    /// A request that is already resolved with `outcome`.
    pub fn resolved(outcome: Outcome<P>) -> Self {
        let (request, resolver) = Self::pending();
        if let Err(error) = resolver.resolve(outcome) {
            warn!(request_id = request.id(), %error, "Outcome discarded");
        }
        request
    }

    /// Registers a callback for the full outcome.
    ///
    /// On a resolved request the callback runs right away on the caller.
    /// While another thread is still delivering the outcome, it is queued
    /// instead and runs on that thread after the callbacks ahead of it.
    pub fn on_completion(&self, callback: impl FnOnce(&Outcome<P>) + Send + 'static) -> &Self {
        let mut shared = self.inner.lock();
        let ready = match &shared.phase {
            Phase::Pending => None,
            Phase::Resolved(_) if shared.delivering => None,
            Phase::Resolved(outcome) => Some(outcome.clone()),
            Phase::Cancelled => {
                trace!(request_id = self.inner.id, "Callback ignored, request cancelled");
                return self;
            }
        };
        match ready {
            None => shared.callbacks.push(Box::new(callback)),
            Some(outcome) => {
                drop(shared);
                callback(&outcome);
            }
        }
        self
    }

    /// Fires only when new data arrives.
    pub fn on_success(&self, callback: impl FnOnce(&Entity<P>) + Send + 'static) -> &Self {
        self.on_completion(move |outcome| {
            if let Outcome::Success(entity) = outcome {
                callback(entity);
            }
        })
    }

    /// Same channel as [`on_success`](Self::on_success). Reads better next to
    /// [`on_not_modified`](Self::on_not_modified).
    pub fn on_new_data(&self, callback: impl FnOnce(&Entity<P>) + Send + 'static) -> &Self {
        self.on_success(callback)
    }

    pub fn on_not_modified(&self, callback: impl FnOnce() + Send + 'static) -> &Self {
        self.on_completion(move |outcome| {
            if let Outcome::NotModified = outcome {
                callback();
            }
        })
    }

    pub fn on_failure(&self, callback: impl FnOnce(&RequestError) + Send + 'static) -> &Self {
        self.on_completion(move |outcome| {
            if let Outcome::Failure(error) = outcome {
                callback(error);
            }
        })
    }

    /// Called with every progress report while the request is pending.
    pub fn on_progress(&self, callback: impl Fn(f64) + Send + Sync + 'static) -> &Self {
        let mut shared = self.inner.lock();
        if matches!(shared.phase, Phase::Pending) {
            shared.progress_callbacks.push(Arc::new(callback));
        }
        self
    }

    /// Requests cancellation. Idempotent; a no-op once resolved.
    pub fn cancel(&self) {
        let mut shared = self.inner.lock();
        if !matches!(shared.phase, Phase::Pending) {
            return;
        }
        shared.phase = Phase::Cancelled;
        let dropped = std::mem::take(&mut shared.callbacks);
        shared.progress_callbacks.clear();
        drop(shared);

        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.cancel_signal.notify_waiters();
        debug!(request_id = self.inner.id, dropped_callbacks = dropped.len(), "Request cancelled");
    }

    /// Waits for the outcome. Returns `None` if the request is cancelled.
    pub async fn completed(&self) -> Option<Outcome<P>> {
        let (respond_to, response) = oneshot::channel();
        self.on_completion(move |outcome| {
            let _ = respond_to.send(outcome.clone());
        });
        response.await.ok()
    }

    /// Crate-internal hook that sees the resolver's report even when the
    /// request was cancelled. Runs before public callbacks.
    pub(crate) fn on_settled(&self, hook: impl FnOnce(&Outcome<P>) + Send + 'static) {
        let mut shared = self.inner.lock();
        match shared.settled.clone() {
            None => shared.settle_hooks.push(Box::new(hook)),
            Some(outcome) => {
                drop(shared);
                hook(&outcome);
            }
        }
    }
}

struct ResolverGuard<P> {
    request: Arc<RequestInner<P>>,
}

impl<P> Drop for ResolverGuard<P> {
    fn drop(&mut self) {
        if self.request.lock().settled.is_none() {
            debug!(request_id = self.request.id, "Resolver dropped without an outcome");
            let _ = self.request.settle(Outcome::Failure(RequestError::dropped()));
        }
    }
}

/// Producer half of a request. Settles it exactly once.
///
/// Clones share one slot: whichever clone reports first wins, later reports
/// get [`ResolveError::AlreadyResolved`]. If every clone is dropped without
/// reporting, the request fails with a "dropped" error.
pub struct Resolver<P> {
    guard: Arc<ResolverGuard<P>>,
}

impl<P> Clone for Resolver<P> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<P> Resolver<P> {
    pub fn request_id(&self) -> u64 {
        self.guard.request.id
    }

    pub fn resolve(&self, outcome: Outcome<P>) -> Result<(), ResolveError> {
        self.guard.request.settle(outcome)
    }

    pub fn is_cancelled(&self) -> bool {
        self.guard.request.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the request is cancelled.
    pub async fn cancelled(&self) {
        let request = &self.guard.request;
        loop {
            let notified = request.cancel_signal.notified();
            if request.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Reports progress to the request's progress callbacks.
    pub fn report_progress(&self, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        let callbacks = {
            let mut shared = self.guard.request.lock();
            if !matches!(shared.phase, Phase::Pending) {
                return;
            }
            shared.progress = progress;
            shared.progress_callbacks.clone()
        };
        for callback in callbacks {
            callback(progress);
        }
    }
}
