//! Asynchronous requests with multi-channel callbacks.
//!
//! # Main Components
//!
//! - [`Request`] - consumer handle: callbacks, cancellation, introspection
//! - [`Resolver`] - producer handle: settles a request exactly once
//! - [`Outcome`] - the three-way result (new data / not modified / failure)
//! - [`RequestError`] - the failure value

pub mod core;
pub mod error;
pub mod outcome;

pub use self::core::{Request, RequestStatus, Resolver};
pub use error::{ErrorKind, RequestError, ResolveError, UnderlyingError};
pub use outcome::Outcome;
