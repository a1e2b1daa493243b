//! The `Entity` and `Session` traits: the contracts the unit-of-work layer
//! is built on.

use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{EntityState, SessionResult};

/// A persisted record type.
///
/// The data-access layer is agnostic to field shape. It only needs a stable
/// key and the names of the relations that can be eager-loaded.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Logical key. Composite keys are tuples, which keeps them `Ord` and
    /// lets them be rebuilt from a list of JSON key parts.
    type Key: Clone + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Extract the key of this record.
    fn key(&self) -> Self::Key;

    /// Collection name used in logs and error messages.
    fn entity_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Relations that may be named in an include set.
    fn relations() -> &'static [&'static str] {
        &[]
    }

    /// Entity-level validation run before the record is staged for insert
    /// or update.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// How a collection view should be opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Attach loaded rows to the session as `Unchanged`.
    pub track_changes: bool,
    /// Bypass store-level default filters (soft-delete and similar).
    pub ignore_filters: bool,
    /// Relations to load together with each row.
    pub includes: BTreeSet<&'static str>,
}

/// One unit of connectivity to the store.
///
/// Implementations own change tracking and atomicity. A session is meant to
/// be used by one logical operation at a time.
#[async_trait]
pub trait Session: Send + Sync {
    /// Load the backing collection of `E`.
    async fn collection<E: Entity>(&self, options: &CollectionOptions) -> SessionResult<Vec<E>>;

    /// Resolve a single record by key. Tracked, not-deleted entities win over
    /// stored rows.
    async fn find_by_key<E: Entity>(&self, key: &E::Key) -> SessionResult<Option<E>>;

    /// Run a raw, store-specific query returning rows of `E`.
    async fn execute_raw<E: Entity>(&self, sql: &str, params: &[Value]) -> SessionResult<Vec<E>>;

    /// Current tracked state of the record with `key` (`Detached` if unknown).
    fn entity_state<E: Entity>(&self, key: &E::Key) -> EntityState;

    /// Track `entity` with the given state, replacing any earlier snapshot
    /// for the same key.
    fn set_entity_state<E: Entity>(&self, entity: E, state: EntityState) -> SessionResult<()>;

    /// Persist every pending change and return the number of affected rows.
    async fn commit(&self) -> SessionResult<usize>;

    /// Release the session.
    fn dispose(&self) -> SessionResult<()>;
}
