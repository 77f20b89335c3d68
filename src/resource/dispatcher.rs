//! # Dispatcher
//!
//! Every cache owns one dispatcher task. It is the cache's "owner context":
//! observer callbacks run there, one at a time, in the order the cache queued
//! them. State transitions queue their notification while still holding the
//! state lock, so delivery order is transition order.
//!
//! The dispatcher holds the cache weakly. It exits when the last cache handle
//! is dropped (the channel closes) or on an explicit shutdown.

use super::cache::{CacheObserver, Inner, ResourceCache};
use crate::observer::ResourceEvent;
use std::sync::Weak;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

pub(crate) enum Notification<P> {
    /// Prune, then broadcast to every live observer.
    Changed(ResourceEvent),
    /// Greets a single, newly added observer.
    ObserverAdded(CacheObserver<P>),
    Progress(f64),
    /// Observers removed explicitly by their owner.
    Stopped(Vec<CacheObserver<P>>),
    /// Answered once everything queued before it was delivered.
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

impl<P> Notification<P> {
    fn kind(&self) -> &'static str {
        match self {
            Notification::Changed(_) => "changed",
            Notification::ObserverAdded(_) => "observer_added",
            Notification::Progress(_) => "progress",
            Notification::Stopped(_) => "stopped",
            Notification::Barrier(_) => "barrier",
            Notification::Shutdown => "shutdown",
        }
    }
}

/// Delivery loop of one cache. Run it with `tokio::spawn(dispatcher.run())`.
pub struct Dispatcher<P> {
    identity: String,
    cache: Weak<Inner<P>>,
    receiver: mpsc::UnboundedReceiver<Notification<P>>,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    pub(crate) fn new(
        identity: String,
        cache: Weak<Inner<P>>,
        receiver: mpsc::UnboundedReceiver<Notification<P>>,
    ) -> Self {
        Self {
            identity,
            cache,
            receiver,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn run(mut self) {
        let resource = self.identity.as_str();
        info!(%resource, "Dispatcher started");
        let mut delivered = 0usize;

        while let Some(notification) = self.receiver.recv().await {
            if let Notification::Shutdown = notification {
                debug!(%resource, "Shutdown requested");
                break;
            }
            if let Notification::Barrier(respond_to) = notification {
                let _ = respond_to.send(());
                continue;
            }
            let Some(cache) = ResourceCache::upgrade(&self.cache) else {
                break;
            };
            trace!(%resource, kind = notification.kind(), "Deliver");
            cache.deliver(notification);
            delivered += 1;
        }

        info!(%resource, delivered, "Dispatcher stopped");
    }
}
