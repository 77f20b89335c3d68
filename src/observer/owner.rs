//! # Owners
//!
//! An owner anchors an observer registration. The registry holds owners
//! weakly and never reads them; once the last strong handle to an owner is
//! gone, every observer registered under it is forgotten on the next
//! notification.
//!
//! Any `Arc<T>` can act as an owner (a view model, a screen controller), or
//! use the dedicated [`Owner`] token when nothing suitable exists.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Something whose lifetime scopes observer registrations.
pub trait ObserverOwner {
    fn owner_ref(&self) -> OwnerRef;
}

/// Weak, identity-only reference to an owner.
#[derive(Clone)]
pub struct OwnerRef {
    handle: Weak<dyn Any + Send + Sync>,
}

impl OwnerRef {
    pub(crate) fn from_weak(handle: Weak<dyn Any + Send + Sync>) -> Self {
        Self { handle }
    }

    pub fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }

    /// Whether this refers to the allocation at `address`.
    pub(crate) fn points_to(&self, address: usize) -> bool {
        self.handle.as_ptr() as *const () as usize == address
    }

    /// Identity comparison.
    pub fn same_owner(&self, other: &OwnerRef) -> bool {
        Weak::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRef").field("alive", &self.is_alive()).finish()
    }
}

impl<T: Any + Send + Sync> ObserverOwner for Arc<T> {
    fn owner_ref(&self) -> OwnerRef {
        let weak: Weak<T> = Arc::downgrade(self);
        OwnerRef::from_weak(weak)
    }
}

/// Standalone owner token.
///
/// Clones share one identity; registrations are released when the last clone
/// is dropped.
#[derive(Clone)]
pub struct Owner {
    token: Arc<OwnerToken>,
}

struct OwnerToken {
    label: String,
}

impl Owner {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            token: Arc::new(OwnerToken { label: label.into() }),
        }
    }

    pub fn label(&self) -> &str {
        &self.token.label
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owner").field(&self.token.label).finish()
    }
}

impl ObserverOwner for Owner {
    fn owner_ref(&self) -> OwnerRef {
        self.token.owner_ref()
    }
}
