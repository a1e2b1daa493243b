//! Error type for the unit-of-work layer.

use session::SessionError;
use thiserror::Error;

/// Errors produced by repositories and the unit of work.
///
/// Lookups that find nothing are not errors; they return `Ok(None)`.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The caller broke an argument contract. Raised before the session is
    /// touched.
    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// The entity's own validation rejected it.
    #[error("'{entity}' failed validation: {reason}")]
    Validation {
        entity: &'static str,
        reason: String,
    },

    /// `max` / `min` over a filtered set with no rows.
    #[error("{operation} of '{entity}' is undefined over an empty set")]
    EmptyAggregate {
        entity: &'static str,
        operation: &'static str,
    },

    /// The read was cancelled before it reached the store.
    #[error("operation cancelled")]
    Cancelled,

    /// The unit of work has already been disposed.
    #[error("unit of work has been disposed")]
    Disposed,

    /// Repository registry held an entry of the wrong type.
    #[error("internal error: {0}")]
    Internal(String),

    /// Failure raised by the session, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] SessionError),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    pub(crate) fn invalid(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }
}
