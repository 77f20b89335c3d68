//! The terminal outcome of a request.

use super::error::RequestError;
use crate::entity::Entity;

/// Exactly one of these ends every request that is not cancelled.
#[derive(Debug)]
pub enum Outcome<P> {
    /// New data arrived.
    Success(Entity<P>),
    /// The server confirmed the cached data is still current.
    NotModified,
    Failure(RequestError),
}

impl<P> Clone for Outcome<P> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Success(entity) => Outcome::Success(entity.clone()),
            Outcome::NotModified => Outcome::NotModified,
            Outcome::Failure(error) => Outcome::Failure(error.clone()),
        }
    }
}

impl<P> Outcome<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, Outcome::NotModified)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn entity(&self) -> Option<&Entity<P>> {
        match self {
            Outcome::Success(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::NotModified => "not_modified",
            Outcome::Failure(e) if e.is_cancellation() => "cancelled",
            Outcome::Failure(_) => "failure",
        }
    }
}
