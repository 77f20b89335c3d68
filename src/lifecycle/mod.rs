//! Runtime orchestration and lifecycle management.
//!
//! # Main Components
//!
//! - [`ResourceService`] - creates caches on first access, spawns their
//!   dispatchers, and shuts them down
//! - [`setup_tracing`] - initializes the tracing/logging infrastructure

pub mod service;
pub mod tracing;

pub use service::{ResourceService, ServiceError};
pub use tracing::setup_tracing;
