//! Store-level error type.

use thiserror::Error;

/// Errors raised by a [`Session`](crate::Session) implementation.
///
/// The unit-of-work layer never retries or suppresses these; they reach the
/// caller unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A pending change violates a store constraint (duplicate key, …).
    #[error("constraint violation on '{entity}': {reason}")]
    Constraint {
        entity: &'static str,
        reason: String,
    },

    /// A pending update or delete targets a row that no longer exists.
    #[error("write conflict on '{entity}': {reason}")]
    Conflict {
        entity: &'static str,
        reason: String,
    },

    /// The session cannot serve the request (e.g. an unknown raw query).
    #[error("unsupported by this session: {0}")]
    Unsupported(String),

    /// The session has already been released.
    #[error("session has been disposed")]
    Disposed,
}

/// Convenience alias used by every session operation.
pub type SessionResult<T> = Result<T, SessionError>;
