//! `session` crate: the contracts shared by the store and the
//! unit-of-work layer.
//!
//! Every store adapter implements [`Session`]; every persisted record type
//! implements [`Entity`]. [`mock::MockSession`] wraps any session for tests.

pub mod error;
pub mod mock;
pub mod state;
pub mod traits;

pub use error::{SessionError, SessionResult};
pub use state::{EntityState, TrackedEntity};
pub use traits::{CollectionOptions, Entity, Session};
