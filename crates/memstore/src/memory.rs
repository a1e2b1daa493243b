//! `InMemorySession`: an in-process [`Session`] over typed tables.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use session::{
    CollectionOptions, Entity, EntityState, Session, SessionError, SessionResult, TrackedEntity,
};
use tracing::{debug, info};

use crate::table::{ErasedTable, Table};

#[derive(Default)]
struct Store {
    tables: HashMap<TypeId, Box<dyn ErasedTable>>,
    disposed: bool,
}

impl Store {
    fn live(&self) -> SessionResult<()> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn table<E: Entity>(&self) -> Option<&Table<E>> {
        self.tables
            .get(&TypeId::of::<E>())
            .and_then(|table| table.as_any().downcast_ref::<Table<E>>())
    }

    fn table_mut<E: Entity>(&mut self) -> SessionResult<&mut Table<E>> {
        self.tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Table::<E>::new()))
            .as_any_mut()
            .downcast_mut::<Table<E>>()
            .ok_or_else(|| {
                SessionError::Unsupported(format!("table type mismatch for '{}'", E::entity_name()))
            })
    }
}

/// A session whose "store" is a set of in-memory tables.
///
/// Rows are kept in key order, which is the order unordered queries see.
/// Commits are all-or-nothing: every pending change is checked before any
/// is applied.
#[derive(Default)]
pub struct InMemorySession {
    store: Mutex<Store>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InMemorySession::seed`].
    pub fn with_rows<E: Entity>(self, rows: impl IntoIterator<Item = E>) -> Self {
        self.seed(rows);
        self
    }

    /// Builder form of [`InMemorySession::set_default_filter`].
    pub fn with_default_filter<E: Entity>(
        self,
        filter: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.set_default_filter(filter);
        self
    }

    /// Write rows straight into the store, bypassing change tracking.
    pub fn seed<E: Entity>(&self, rows: impl IntoIterator<Item = E>) {
        let mut store = self.lock();
        if let Ok(table) = store.table_mut::<E>() {
            for row in rows {
                table.rows.insert(row.key(), row);
            }
        }
    }

    /// Install a filter applied to every read of `E` unless the caller asks
    /// to ignore filters.
    pub fn set_default_filter<E: Entity>(
        &self,
        filter: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) {
        let mut store = self.lock();
        if let Ok(table) = store.table_mut::<E>() {
            table.default_filter = Some(Arc::new(filter));
        }
    }

    /// Register the handler served for the raw query text `sql`.
    pub fn register_raw_query<E: Entity>(
        &self,
        sql: impl Into<String>,
        handler: impl Fn(&[E], &[Value]) -> Vec<E> + Send + Sync + 'static,
    ) {
        let mut store = self.lock();
        if let Ok(table) = store.table_mut::<E>() {
            table.raw_queries.insert(sql.into(), Arc::new(handler));
        }
    }

    /// Committed rows of `E` in key order, ignoring filters and tracking.
    pub fn stored<E: Entity>(&self) -> Vec<E> {
        self.lock()
            .table::<E>()
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn collection<E: Entity>(&self, options: &CollectionOptions) -> SessionResult<Vec<E>> {
        let mut store = self.lock();
        store.live()?;
        if !options.includes.is_empty() {
            debug!(
                "'{}' includes {:?} are embedded in the in-memory rows",
                E::entity_name(),
                options.includes
            );
        }

        let table = store.table_mut::<E>()?;
        let rows = table.visible(options.ignore_filters);
        if options.track_changes {
            for row in &rows {
                table.attach(row);
            }
        }
        Ok(rows)
    }

    async fn find_by_key<E: Entity>(&self, key: &E::Key) -> SessionResult<Option<E>> {
        let mut store = self.lock();
        store.live()?;
        let table = store.table_mut::<E>()?;

        // Pending inserts are visible to the session that staged them; every
        // other tracked snapshot stays subject to the default filter.
        if let Some(tracked) = table.tracked.get(key) {
            return Ok(match tracked.state {
                EntityState::Deleted | EntityState::Detached => None,
                EntityState::Added => Some(tracked.entity.clone()),
                EntityState::Unchanged | EntityState::Modified => table
                    .passes_filter(&tracked.entity)
                    .then(|| tracked.entity.clone()),
            });
        }

        let found = table
            .rows
            .get(key)
            .filter(|row| table.passes_filter(row))
            .cloned();
        if let Some(row) = &found {
            table.attach(row);
        }
        Ok(found)
    }

    async fn execute_raw<E: Entity>(&self, sql: &str, params: &[Value]) -> SessionResult<Vec<E>> {
        let store = self.lock();
        store.live()?;
        let table = store.table::<E>().ok_or_else(|| {
            SessionError::Unsupported(format!("no raw query registered for '{sql}'"))
        })?;
        let handler = table.raw_queries.get(sql).ok_or_else(|| {
            SessionError::Unsupported(format!("no raw query registered for '{sql}'"))
        })?;
        let rows = table.visible(false);
        Ok(handler(&rows, params))
    }

    fn entity_state<E: Entity>(&self, key: &E::Key) -> EntityState {
        let store = self.lock();
        if store.disposed {
            return EntityState::Detached;
        }
        store
            .table::<E>()
            .and_then(|table| table.tracked.get(key))
            .map_or(EntityState::Detached, |tracked| tracked.state)
    }

    fn set_entity_state<E: Entity>(&self, entity: E, state: EntityState) -> SessionResult<()> {
        let mut store = self.lock();
        store.live()?;
        let table = store.table_mut::<E>()?;
        let key = entity.key();
        if state == EntityState::Detached {
            table.tracked.remove(&key);
        } else {
            table.tracked.insert(key, TrackedEntity::new(entity, state));
        }
        Ok(())
    }

    async fn commit(&self) -> SessionResult<usize> {
        let mut store = self.lock();
        store.live()?;

        for table in store.tables.values() {
            table.check_pending()?;
        }
        let affected = store
            .tables
            .values_mut()
            .map(|table| table.apply_pending())
            .sum();

        info!("in-memory commit applied {} row change(s)", affected);
        Ok(affected)
    }

    fn dispose(&self) -> SessionResult<()> {
        let mut store = self.lock();
        if !store.disposed {
            for table in store.tables.values_mut() {
                table.clear_tracking();
            }
            store.disposed = true;
            debug!("in-memory session disposed");
        }
        Ok(())
    }
}
