//! Events delivered to observers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where new data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NewDataSource {
    /// A load request resolved with fresh data.
    Network,
    /// Data was supplied locally via `override_local_data`.
    LocalOverride,
}

/// State change of a cached resource.
///
/// Progress is not an event; it travels on its own observer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceEvent {
    /// Sent only to the observer that was just added.
    ObserverAdded,
    RequestStarted,
    NewData(NewDataSource),
    NotModified,
    Error,
}

impl fmt::Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceEvent::ObserverAdded => f.write_str("ObserverAdded"),
            ResourceEvent::RequestStarted => f.write_str("RequestStarted"),
            ResourceEvent::NewData(source) => write!(f, "NewData({source:?})"),
            ResourceEvent::NotModified => f.write_str("NotModified"),
            ResourceEvent::Error => f.write_str("Error"),
        }
    }
}
