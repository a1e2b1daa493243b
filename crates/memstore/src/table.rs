//! Per-entity-type storage: committed rows plus the change tracker.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use session::{Entity, EntityState, SessionError, SessionResult, TrackedEntity};

/// Store-level default filter (soft-delete and similar).
pub type RowFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Handler standing in for a raw query text.
pub type RawQuery<E> = Arc<dyn Fn(&[E], &[Value]) -> Vec<E> + Send + Sync>;

pub(crate) struct Table<E: Entity> {
    pub(crate) rows: BTreeMap<E::Key, E>,
    pub(crate) tracked: BTreeMap<E::Key, TrackedEntity<E>>,
    pub(crate) default_filter: Option<RowFilter<E>>,
    pub(crate) raw_queries: HashMap<String, RawQuery<E>>,
}

impl<E: Entity> Table<E> {
    pub(crate) fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            tracked: BTreeMap::new(),
            default_filter: None,
            raw_queries: HashMap::new(),
        }
    }

    /// Rows in key order, with the default filter applied unless bypassed.
    pub(crate) fn visible(&self, ignore_filters: bool) -> Vec<E> {
        self.rows
            .values()
            .filter(|row| ignore_filters || self.passes_filter(row))
            .cloned()
            .collect()
    }

    pub(crate) fn passes_filter(&self, row: &E) -> bool {
        self.default_filter.as_ref().map_or(true, |filter| filter(row))
    }

    /// Attach `row` as `Unchanged` unless the key is already tracked.
    pub(crate) fn attach(&mut self, row: &E) {
        self.tracked
            .entry(row.key())
            .or_insert_with(|| TrackedEntity::new(row.clone(), EntityState::Unchanged));
    }
}

/// Type-erased view of a table used by commit and disposal.
pub(crate) trait ErasedTable: Send {
    /// Verify that every pending change can be applied.
    fn check_pending(&self) -> SessionResult<()>;
    /// Apply pending changes and return the number of affected rows.
    fn apply_pending(&mut self) -> usize;
    /// Drop all tracked entries.
    fn clear_tracking(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Entity> ErasedTable for Table<E> {
    fn check_pending(&self) -> SessionResult<()> {
        for (key, tracked) in &self.tracked {
            let exists = self.rows.contains_key(key);
            match tracked.state {
                EntityState::Added if exists => {
                    return Err(SessionError::Constraint {
                        entity: E::entity_name(),
                        reason: format!("duplicate key {key:?}"),
                    });
                }
                EntityState::Modified | EntityState::Deleted if !exists => {
                    return Err(SessionError::Conflict {
                        entity: E::entity_name(),
                        reason: format!("no stored row with key {key:?}"),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply_pending(&mut self) -> usize {
        let mut affected = 0;
        for (key, tracked) in self.tracked.iter_mut() {
            match tracked.state {
                EntityState::Added | EntityState::Modified => {
                    self.rows.insert(key.clone(), tracked.entity.clone());
                    affected += 1;
                }
                EntityState::Deleted => {
                    self.rows.remove(key);
                    affected += 1;
                }
                EntityState::Unchanged | EntityState::Detached => {}
            }
            tracked.state = tracked.state.after_commit();
        }
        self.tracked
            .retain(|_, tracked| tracked.state != EntityState::Detached);
        affected
    }

    fn clear_tracking(&mut self) {
        self.tracked.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
