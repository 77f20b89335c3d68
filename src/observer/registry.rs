//! # Observer Registry
//!
//! Owner-scoped list of observers for one resource.
//!
//! Each entry pairs an observer with an [`OwnerRef`]. Entries whose owner is
//! gone are pruned at the start of every [`notify`](ObserverRegistry::notify);
//! a pruned observer that is still alive hears
//! [`stopped_observing_resource`](ResourceObserver::stopped_observing_resource)
//! exactly once.
//!
//! Observers are normally held strongly. An observer that owns itself
//! ([`add_self_owned`](ObserverRegistry::add_self_owned)) is held weakly
//! instead, otherwise the registry would keep its own owner alive forever.
//!
//! A [`deferred`](ObserverRegistry::deferred) registry keeps each new entry
//! out of [`live_observers`](ObserverRegistry::live_observers) until it is
//! [`announce`](ObserverRegistry::announce)d. A queue-driven caller uses this
//! so events queued before a registration never reach the new observer.
//!
//! The registry is generic over the resource type `R` it reports about, so
//! it can be exercised without a live cache.

use super::event::ResourceEvent;
use super::owner::{ObserverOwner, OwnerRef};
use super::ResourceObserver;
use std::fmt;
use std::sync::{Arc, Weak};

type SharedObserver<R> = Arc<dyn ResourceObserver<R>>;

enum Held<R> {
    Strong(SharedObserver<R>),
    Weak(Weak<dyn ResourceObserver<R>>),
}

struct Entry<R> {
    observer: Held<R>,
    observer_id: usize,
    owner: OwnerRef,
    announced: bool,
}

impl<R> Entry<R> {
    fn upgrade(&self) -> Option<SharedObserver<R>> {
        match &self.observer {
            Held::Strong(observer) => Some(Arc::clone(observer)),
            Held::Weak(observer) => observer.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        let observer_alive = match &self.observer {
            Held::Strong(_) => true,
            Held::Weak(observer) => observer.strong_count() > 0,
        };
        observer_alive && self.owner.is_alive()
    }
}

fn identity<T: ?Sized>(observer: &Arc<T>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

/// Observers of one resource, in insertion order.
pub struct ObserverRegistry<R> {
    entries: Vec<Entry<R>>,
    deferred: bool,
}

impl<R> Default for ObserverRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ObserverRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("entries", &self.entries.len())
            .field("live", &self.live_count())
            .finish()
    }
}

impl<R> ObserverRegistry<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            deferred: false,
        }
    }

    /// Registry whose new entries hear nothing until announced.
    pub fn deferred() -> Self {
        Self {
            entries: Vec::new(),
            deferred: true,
        }
    }

    /// Adds `observer` under `owner`. Chainable; see [`insert`](Self::insert).
    pub fn add_observer(
        &mut self,
        observer: SharedObserver<R>,
        owner: &impl ObserverOwner,
    ) -> &mut Self {
        self.insert(observer, owner);
        self
    }

    /// Adds `observer` under `owner`. Returns `false` if that exact pair is
    /// already registered.
    ///
    /// An observer passed as its own owner is held weakly, the same as
    /// [`add_self_owned`](Self::add_self_owned).
    pub fn insert(&mut self, observer: SharedObserver<R>, owner: &impl ObserverOwner) -> bool {
        let owner = owner.owner_ref();
        let observer_id = identity(&observer);
        if self.contains_pair(observer_id, &owner) {
            return false;
        }
        let held = if owner.points_to(observer_id) {
            Held::Weak(Arc::downgrade(&observer))
        } else {
            Held::Strong(observer)
        };
        self.push(held, observer_id, owner);
        true
    }

    /// Adds an observer that is its own owner. It is held weakly and drops
    /// out silently once the last outside handle goes away.
    pub fn add_self_owned<O>(&mut self, observer: &Arc<O>) -> bool
    where
        O: ResourceObserver<R> + 'static,
    {
        let owner = observer.owner_ref();
        let observer_id = identity(observer);
        if self.contains_pair(observer_id, &owner) {
            return false;
        }
        let weak: Weak<O> = Arc::downgrade(observer);
        self.push(Held::Weak(weak), observer_id, owner);
        true
    }

    fn push(&mut self, observer: Held<R>, observer_id: usize, owner: OwnerRef) {
        self.entries.push(Entry {
            observer,
            observer_id,
            owner,
            announced: !self.deferred,
        });
    }

    /// Lets every entry of `observer` start receiving events.
    pub fn announce(&mut self, observer: &SharedObserver<R>) {
        let observer_id = identity(observer);
        for entry in self.entries.iter_mut().filter(|e| e.observer_id == observer_id) {
            entry.announced = true;
        }
    }

    fn contains_pair(&self, observer_id: usize, owner: &OwnerRef) -> bool {
        self.entries
            .iter()
            .any(|e| e.observer_id == observer_id && e.owner.same_owner(owner))
    }

    /// Removes every entry registered under `owner`.
    ///
    /// Returns the removed observers that are still alive so the caller can
    /// tell them they stopped observing.
    pub fn remove_observers(&mut self, owned_by: &impl ObserverOwner) -> Vec<SharedObserver<R>> {
        let owner = owned_by.owner_ref();
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if !entry.owner.same_owner(&owner) {
                return true;
            }
            removed.extend(entry.upgrade());
            false
        });
        removed
    }

    /// Drops entries whose owner or observer is gone.
    ///
    /// Returns the pruned observers that are still alive.
    pub fn prune(&mut self) -> Vec<SharedObserver<R>> {
        let mut stopped = Vec::new();
        self.entries.retain(|entry| {
            if entry.is_live() {
                return true;
            }
            stopped.extend(entry.upgrade());
            false
        });
        stopped
    }

    /// Snapshot of live, announced observers in insertion order.
    pub fn live_observers(&self) -> Vec<SharedObserver<R>> {
        self.entries
            .iter()
            .filter(|entry| entry.announced && entry.owner.is_alive())
            .filter_map(Entry::upgrade)
            .collect()
    }

    /// Prunes, then delivers `event` to every live observer.
    pub fn notify(&mut self, resource: &R, event: &ResourceEvent) {
        for observer in self.prune() {
            observer.stopped_observing_resource(resource);
        }
        for observer in self.live_observers() {
            observer.resource_changed(resource, event);
        }
    }

    /// Delivers a progress report to every live observer. Does not prune.
    pub fn notify_progress(&self, resource: &R, progress: f64) {
        for observer in self.live_observers() {
            observer.resource_request_progress(resource, progress);
        }
    }

    /// Number of registered entries, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NewDataSource, Owner};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
            })
        }
    }

    impl ResourceObserver<String> for Recorder {
        fn resource_changed(&self, resource: &String, event: &ResourceEvent) {
            self.log.lock().unwrap().push(format!("{}:{resource}:{event}", self.name));
        }

        fn resource_request_progress(&self, _resource: &String, progress: f64) {
            self.log.lock().unwrap().push(format!("{}:progress:{progress}", self.name));
        }

        fn stopped_observing_resource(&self, resource: &String) {
            self.log.lock().unwrap().push(format!("{}:stopped:{resource}", self.name));
        }
    }

    fn resource() -> String {
        "/users/1".to_string()
    }

    #[test]
    fn test_notify_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let owner = Owner::new("view");
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();

        registry
            .add_observer(Recorder::new("b", &log), &owner)
            .add_observer(Recorder::new("a", &log), &owner);
        registry.notify(&resource(), &ResourceEvent::NewData(NewDataSource::Network));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["b:/users/1:NewData(Network)", "a:/users/1:NewData(Network)"]
        );
    }

    #[test]
    fn test_add_is_idempotent_per_pair() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (owner_a, owner_b) = (Owner::new("a"), Owner::new("b"));
        let observer = Recorder::new("x", &log);
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();

        assert!(registry.insert(observer.clone(), &owner_a));
        assert!(!registry.insert(observer.clone(), &owner_a));
        assert!(registry.insert(observer.clone(), &owner_b));

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_released_owner_is_pruned_with_one_stop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let keep = Owner::new("keep");
        let gone = Owner::new("gone");
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();
        registry
            .add_observer(Recorder::new("kept", &log), &keep)
            .add_observer(Recorder::new("orphan", &log), &gone);

        drop(gone);
        registry.notify(&resource(), &ResourceEvent::RequestStarted);
        registry.notify(&resource(), &ResourceEvent::NotModified);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "orphan:stopped:/users/1",
                "kept:/users/1:RequestStarted",
                "kept:/users/1:NotModified",
            ]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_self_owned_observer_drops_silently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observer = Recorder::new("self", &log);
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();

        assert!(registry.add_self_owned(&observer));
        assert!(!registry.add_self_owned(&observer));
        registry.notify(&resource(), &ResourceEvent::Error);
        drop(observer);
        registry.notify(&resource(), &ResourceEvent::Error);

        assert_eq!(*log.lock().unwrap(), vec!["self:/users/1:Error"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_observer_owning_itself_is_held_weakly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let view = Recorder::new("view", &log);
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();

        registry.add_observer(view.clone(), &view);
        registry.notify(&resource(), &ResourceEvent::RequestStarted);
        drop(view);

        assert_eq!(registry.live_count(), 0);
        registry.notify(&resource(), &ResourceEvent::Error);
        assert_eq!(*log.lock().unwrap(), vec!["view:/users/1:RequestStarted"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deferred_entry_waits_for_announce() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let owner = Owner::new("view");
        let observer: SharedObserver<String> = Recorder::new("late", &log);
        let mut registry: ObserverRegistry<String> = ObserverRegistry::deferred();

        registry.add_observer(observer.clone(), &owner);
        registry.notify(&resource(), &ResourceEvent::RequestStarted);
        assert_eq!(registry.live_count(), 1);

        registry.announce(&observer);
        registry.notify(&resource(), &ResourceEvent::Error);
        assert_eq!(*log.lock().unwrap(), vec!["late:/users/1:Error"]);
    }

    #[test]
    fn test_remove_observers_by_owner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Owner::new("a"), Owner::new("b"));
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();
        registry
            .add_observer(Recorder::new("one", &log), &a)
            .add_observer(Recorder::new("two", &log), &b)
            .add_observer(Recorder::new("three", &log), &a);

        assert_eq!(registry.remove_observers(&a).len(), 2);
        assert!(registry.remove_observers(&a).is_empty());

        registry.notify(&resource(), &ResourceEvent::RequestStarted);
        assert_eq!(*log.lock().unwrap(), vec!["two:/users/1:RequestStarted"]);
    }

    #[test]
    fn test_progress_skips_dead_owners_without_pruning() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gone = Owner::new("gone");
        let keep = Owner::new("keep");
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();
        registry
            .add_observer(Recorder::new("orphan", &log), &gone)
            .add_observer(Recorder::new("kept", &log), &keep);
        drop(gone);

        registry.notify_progress(&resource(), 0.5);

        assert_eq!(*log.lock().unwrap(), vec!["kept:progress:0.5"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let owner = Owner::new("closure");
        let mut registry: ObserverRegistry<String> = ObserverRegistry::new();

        registry.add_observer(
            Arc::new(move |r: &String, e: &ResourceEvent| sink.lock().unwrap().push(format!("{r} {e}"))),
            &owner,
        );
        registry.notify(&resource(), &ResourceEvent::NotModified);

        assert_eq!(*seen.lock().unwrap(), vec!["/users/1 NotModified"]);
    }
}
