//! Persistence state of tracked entities.
//!
//! Staging operations move an entity through a small, closed set of states.
//! The transitions are declared here once and shared by every session and
//! repository implementation.

use serde::{Deserialize, Serialize};

use crate::Entity;

/// Pending persistence state of an entity known to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Not tracked by the session.
    Detached,
    /// Tracked and identical to the stored row.
    Unchanged,
    /// Will be inserted on commit.
    Added,
    /// Will replace the stored row on commit.
    Modified,
    /// Will be removed on commit.
    Deleted,
}

impl EntityState {
    /// State after the entity is staged for insertion.
    ///
    /// Re-inserting an entity whose deletion is pending turns the pair into a
    /// replacement.
    pub fn on_insert(self) -> Self {
        match self {
            Self::Deleted => Self::Modified,
            _ => Self::Added,
        }
    }

    /// State after the entity is staged for full-record replacement.
    pub fn on_update(self) -> Self {
        match self {
            Self::Added => Self::Added,
            _ => Self::Modified,
        }
    }

    /// State after the entity is staged for removal.
    ///
    /// An entity that was only ever added never reaches the store.
    pub fn on_delete(self) -> Self {
        match self {
            Self::Added => Self::Detached,
            _ => Self::Deleted,
        }
    }

    /// State once a commit has applied the pending change.
    pub fn after_commit(self) -> Self {
        match self {
            Self::Added | Self::Modified | Self::Unchanged => Self::Unchanged,
            Self::Deleted | Self::Detached => Self::Detached,
        }
    }

    /// `true` when a commit has work to do for this entity.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detached  => write!(f, "detached"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Added     => write!(f, "added"),
            Self::Modified  => write!(f, "modified"),
            Self::Deleted   => write!(f, "deleted"),
        }
    }
}

/// An entity snapshot paired with its pending persistence state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity<E: Entity> {
    pub entity: E,
    pub state: EntityState,
}

impl<E: Entity> TrackedEntity<E> {
    pub fn new(entity: E, state: EntityState) -> Self {
        Self { entity, state }
    }

    pub fn key(&self) -> E::Key {
        self.entity.key()
    }
}
