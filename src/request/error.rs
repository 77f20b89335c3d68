//! # Request Errors
//!
//! [`RequestError`] is the failure outcome of a request. It is data, not a
//! fault: transports build one, the request carries it to callbacks, and the
//! cache keeps the most recent one as `latest_error`.
//!
//! Three families share the type, told apart by [`ErrorKind`]:
//!
//! - **Transport**: the network or I/O layer failed; `underlying_error` is set.
//! - **Protocol**: the server answered with an unexpected status;
//!   `http_status_code` is set.
//! - **Cancelled**: the request was cancelled on purpose. Consumers usually
//!   check [`RequestError::is_cancellation`] before showing anything.

use crate::entity::Entity;
use std::sync::Arc;
use std::time::Instant;

/// Boxed transport-level error shared between clones of a [`RequestError`].
pub type UnderlyingError = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Cancelled,
    Other,
}

/// Failure outcome of a request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{user_message}")]
pub struct RequestError {
    kind: ErrorKind,
    http_status_code: Option<u16>,
    #[source]
    underlying_error: Option<UnderlyingError>,
    user_message: String,
    entity: Option<Entity<Vec<u8>>>,
    timestamp: Instant,
}

impl RequestError {
    fn build(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status_code: None,
            underlying_error: None,
            user_message: user_message.into(),
            entity: None,
            timestamp: Instant::now(),
        }
    }

    /// Generic failure with only a message.
    pub fn new(user_message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Other, user_message)
    }

    /// Network or I/O failure.
    pub fn transport(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        let mut err = Self::build(ErrorKind::Transport, error.to_string());
        err.underlying_error = Some(Arc::new(error));
        err
    }

    /// Unexpected HTTP status from the server.
    pub fn http_status(code: u16) -> Self {
        let mut err = Self::build(ErrorKind::Protocol, format!("Server returned HTTP {code}"));
        err.http_status_code = Some(code);
        err
    }

    pub fn cancelled() -> Self {
        Self::build(ErrorKind::Cancelled, "Request cancelled")
    }

    /// Every resolver was dropped without reporting an outcome.
    pub(crate) fn dropped() -> Self {
        Self::new("Request was dropped before it completed")
    }

    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    /// Attaches the body the server sent along with the failure.
    pub fn with_entity(mut self, entity: Entity<Vec<u8>>) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_http_status(mut self, code: u16) -> Self {
        self.http_status_code = Some(code);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn http_status_code(&self) -> Option<u16> {
        self.http_status_code
    }

    pub fn underlying_error(&self) -> Option<&UnderlyingError> {
        self.underlying_error.as_ref()
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn entity(&self) -> Option<&Entity<Vec<u8>>> {
        self.entity.as_ref()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Errors from settling a request.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ResolveError {
    #[error("Request {0} already resolved")]
    AlreadyResolved(u64),
}
