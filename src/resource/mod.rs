//! The cache for one resource and its delivery loop.
//!
//! # Main Components
//!
//! - [`ResourceCache`] - state, loading, and observer registration
//! - [`Dispatcher`] - the per-cache task that delivers notifications in order
//! - [`CacheConfig`] - staleness and retry tuning

pub mod cache;
pub mod config;
pub mod dispatcher;

pub use cache::{CacheObserver, ResourceCache};
pub use config::CacheConfig;
pub use dispatcher::Dispatcher;
