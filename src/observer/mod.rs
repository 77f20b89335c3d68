//! # Observers
//!
//! Everything a consumer needs to watch a cached resource:
//!
//! - [`ResourceObserver`] - the callback trait
//! - [`ResourceEvent`] / [`NewDataSource`] - what changed
//! - [`ObserverOwner`] / [`Owner`] - lifetime anchors for registrations
//! - [`ObserverRegistry`] - the owner-scoped list behind every cache
//!
//! # Example
//!
//! ```rust,ignore
//! let owner = Owner::new("profile-screen");
//! cache.add_observer(
//!     Arc::new(|cache: &ResourceCache<Profile>, event: &ResourceEvent| {
//!         println!("{} -> {event}", cache.identity());
//!     }),
//!     &owner,
//! );
//! drop(owner); // registration goes away on the next notification
//! ```

pub mod event;
pub mod owner;
pub mod registry;

pub use event::{NewDataSource, ResourceEvent};
pub use owner::{ObserverOwner, Owner, OwnerRef};
pub use registry::ObserverRegistry;

/// Receives notifications about a resource of type `R`.
///
/// Callbacks run on the resource's dispatcher task, one at a time, in the
/// order the underlying transitions happened.
pub trait ResourceObserver<R>: Send + Sync {
    fn resource_changed(&self, resource: &R, event: &ResourceEvent);

    /// Fractional progress of the current load, in `[0, 1]`.
    fn resource_request_progress(&self, _resource: &R, _progress: f64) {}

    /// Called once when the registration is dropped while the observer
    /// itself is still alive.
    fn stopped_observing_resource(&self, _resource: &R) {}
}

impl<R, F> ResourceObserver<R> for F
where
    F: Fn(&R, &ResourceEvent) + Send + Sync,
{
    fn resource_changed(&self, resource: &R, event: &ResourceEvent) {
        self(resource, event)
    }
}
