//! `Repository<E, S>`: the per-entity façade over a session.
//!
//! Reads build a [`Query`], load the backing collection through the
//! session and evaluate the query over it. Writes only stage state on the
//! session; nothing reaches the store until the owning unit of work commits.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use session::{Entity, EntityState, Session, SessionError};
use tracing::{debug, error, instrument};

use crate::paging::{PageRequest, PagedList, DEFAULT_PAGE_SIZE};
use crate::query::{
    apply_predicate, apply_projection, compose, Include, Predicate, Projection, Query, QueryOptions,
};
use crate::{CancellationSignal, RepoError, RepoResult};

/// Data access for one entity type, bound to one session.
pub struct Repository<E, S> {
    session: Arc<S>,
    default_page_size: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: Session> Repository<E, S> {
    pub fn new(session: Arc<S>) -> Self {
        Self::with_page_size(session, DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn with_page_size(session: Arc<S>, default_page_size: usize) -> Self {
        Self {
            session,
            default_page_size,
            _entity: PhantomData,
        }
    }

    /// Page `index` at the configured default page size.
    pub fn page(&self, index: usize) -> PageRequest {
        PageRequest::new(index, self.default_page_size)
    }

    // -----------------------------------------------------------------------
    // Query composition
    // -----------------------------------------------------------------------

    /// The base view over the backing collection.
    ///
    /// `track_changes = false` yields detached snapshots; `ignore_filters`
    /// bypasses store-level default filters.
    pub fn core_query(&self, track_changes: bool, ignore_filters: bool) -> Query<E> {
        Query::source(track_changes, ignore_filters)
    }

    /// Fully composed query, ready for [`Repository::fetch`].
    pub fn find(&self, options: QueryOptions<E>) -> Query<E> {
        let source = self.core_query(options.track_changes, options.ignore_filters);
        compose(source, options)
    }

    /// As [`Repository::find`], then project every row through `selector`.
    pub fn select<R: 'static>(
        &self,
        selector: impl Fn(&E) -> R + Send + Sync + 'static,
        options: QueryOptions<E>,
    ) -> Projection<E, R> {
        apply_projection(self.find(options), selector)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Materialise `query`.
    pub async fn fetch(&self, query: &Query<E>, cancel: &CancellationSignal) -> RepoResult<Vec<E>> {
        self.load(query, cancel, "fetch").await
    }

    /// Materialise `projection`.
    pub async fn fetch_projected<R>(
        &self,
        projection: &Projection<E, R>,
        cancel: &CancellationSignal,
    ) -> RepoResult<Vec<R>> {
        let rows = self.load(projection.query(), cancel, "fetch_projected").await?;
        Ok(rows.iter().map(|e| projection.project(e)).collect())
    }

    /// First row of the composed query, if any.
    pub async fn find_first(
        &self,
        options: QueryOptions<E>,
        cancel: &CancellationSignal,
    ) -> RepoResult<Option<E>> {
        let rows = self.load(&self.find(options), cancel, "find_first").await?;
        Ok(rows.into_iter().next())
    }

    /// The whole collection, optionally eager-loading every relation.
    pub async fn list_all(
        &self,
        include_all: bool,
        cancel: &CancellationSignal,
    ) -> RepoResult<Vec<E>> {
        let mut options = QueryOptions::new();
        if include_all {
            options = options.include(Include::all::<E>());
        }
        self.load(&self.find(options), cancel, "list_all").await
    }

    /// Look a record up by key. Absence is `Ok(None)`.
    pub async fn find_by_id(
        &self,
        key: &E::Key,
        cancel: &CancellationSignal,
    ) -> RepoResult<Option<E>> {
        cancel.check("find_by_id")?;
        self.session
            .find_by_key::<E>(key)
            .await
            .map_err(Self::store_failure("find_by_id"))
    }

    /// Look a record up by its key parts, in key order.
    ///
    /// # Errors
    /// [`RepoError::InvalidArgument`] when the parts do not form a key of `E`.
    pub async fn find_by_keys(
        &self,
        parts: &[Value],
        cancel: &CancellationSignal,
    ) -> RepoResult<Option<E>> {
        let key = key_from_parts::<E>(parts)?;
        self.find_by_id(&key, cancel).await
    }

    /// One page of the composed query.
    ///
    /// `total_count` is taken from the filtered set before pagination.
    #[instrument(skip(self, options, cancel), fields(entity = E::entity_name()))]
    pub async fn get_paged_list(
        &self,
        options: QueryOptions<E>,
        page: PageRequest,
        cancel: &CancellationSignal,
    ) -> RepoResult<PagedList<E>> {
        page.skip()?;
        let rows = self.load(&self.find(options), cancel, "get_paged_list").await?;
        PagedList::from_rows(rows, page)
    }

    /// One page of the composed query, projected through `selector`.
    #[instrument(skip(self, selector, options, cancel), fields(entity = E::entity_name()))]
    pub async fn get_paged_list_projected<R>(
        &self,
        selector: impl Fn(&E) -> R,
        options: QueryOptions<E>,
        page: PageRequest,
        cancel: &CancellationSignal,
    ) -> RepoResult<PagedList<R>> {
        page.skip()?;
        let rows = self.load(&self.find(options), cancel, "get_paged_list").await?;
        Ok(PagedList::from_rows(rows, page)?.map(|e| selector(&e)))
    }

    /// Run a raw, store-specific query.
    #[instrument(skip(self, params, cancel), fields(entity = E::entity_name()))]
    pub async fn from_sql(
        &self,
        sql: &str,
        params: &[Value],
        cancel: &CancellationSignal,
    ) -> RepoResult<Vec<E>> {
        cancel.check("from_sql")?;
        self.session
            .execute_raw::<E>(sql, params)
            .await
            .map_err(Self::store_failure("from_sql"))
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    pub async fn count(
        &self,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationSignal,
    ) -> RepoResult<usize> {
        Ok(self.load(&self.aggregate_query(predicate), cancel, "count").await?.len())
    }

    pub async fn exists(
        &self,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationSignal,
    ) -> RepoResult<bool> {
        Ok(!self.load(&self.aggregate_query(predicate), cancel, "exists").await?.is_empty())
    }

    /// Largest selected value over the filtered set. Ties keep the first
    /// row in collection order.
    ///
    /// # Errors
    /// [`RepoError::EmptyAggregate`] when no row matches.
    pub async fn max<T: Ord>(
        &self,
        selector: impl Fn(&E) -> T,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationSignal,
    ) -> RepoResult<T> {
        let rows = self.load(&self.aggregate_query(predicate), cancel, "max").await?;
        extreme(rows.iter().map(|e| selector(e)), Ordering::Greater).ok_or(
            RepoError::EmptyAggregate {
                entity: E::entity_name(),
                operation: "max",
            },
        )
    }

    /// Smallest selected value over the filtered set. Ties keep the first
    /// row in collection order.
    ///
    /// # Errors
    /// [`RepoError::EmptyAggregate`] when no row matches.
    pub async fn min<T: Ord>(
        &self,
        selector: impl Fn(&E) -> T,
        predicate: Option<Predicate<E>>,
        cancel: &CancellationSignal,
    ) -> RepoResult<T> {
        let rows = self.load(&self.aggregate_query(predicate), cancel, "min").await?;
        extreme(rows.iter().map(|e| selector(e)), Ordering::Less).ok_or(
            RepoError::EmptyAggregate {
                entity: E::entity_name(),
                operation: "min",
            },
        )
    }

    // -----------------------------------------------------------------------
    // Staged writes
    // -----------------------------------------------------------------------

    /// Stage `entity` for creation.
    pub fn insert(&self, entity: E) -> RepoResult<()> {
        validate(&entity)?;
        let state = self.entity_state(&entity.key()).on_insert();
        self.stage(entity, state, "insert")
    }

    /// Stage every entity for creation. Nothing is staged if any fails
    /// validation.
    pub fn insert_many(&self, entities: impl IntoIterator<Item = E>) -> RepoResult<()> {
        let entities: Vec<E> = entities.into_iter().collect();
        entities.iter().try_for_each(validate)?;
        entities.into_iter().try_for_each(|e| self.insert(e))
    }

    /// Stage `entity` for full replacement. The last staged snapshot for a
    /// key wins.
    pub fn update(&self, entity: E) -> RepoResult<()> {
        validate(&entity)?;
        let state = self.entity_state(&entity.key()).on_update();
        self.stage(entity, state, "update")
    }

    pub fn update_many(&self, entities: impl IntoIterator<Item = E>) -> RepoResult<()> {
        let entities: Vec<E> = entities.into_iter().collect();
        entities.iter().try_for_each(validate)?;
        entities.into_iter().try_for_each(|e| self.update(e))
    }

    /// Stage `entity` for removal.
    pub fn delete(&self, entity: E) -> RepoResult<()> {
        let state = self.entity_state(&entity.key()).on_delete();
        self.stage(entity, state, "delete")
    }

    pub fn delete_many(&self, entities: impl IntoIterator<Item = E>) -> RepoResult<()> {
        entities.into_iter().try_for_each(|e| self.delete(e))
    }

    /// Resolve `key`, then stage the record for removal.
    ///
    /// Returns `false` without staging anything when the key resolves to no
    /// record.
    #[instrument(skip(self, cancel), fields(entity = E::entity_name()))]
    pub async fn delete_by_key(
        &self,
        key: &E::Key,
        cancel: &CancellationSignal,
    ) -> RepoResult<bool> {
        match self.find_by_id(key, cancel).await? {
            Some(entity) => {
                self.delete(entity)?;
                Ok(true)
            }
            None => {
                debug!("delete of '{}' {:?}: no such record", E::entity_name(), key);
                Ok(false)
            }
        }
    }

    /// Override the pending state of `entity` directly.
    pub fn change_entity_state(&self, entity: E, state: EntityState) -> RepoResult<()> {
        self.stage(entity, state, "change_entity_state")
    }

    /// Pending state of the record with `key`.
    pub fn entity_state(&self, key: &E::Key) -> EntityState {
        self.session.entity_state::<E>(key)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn aggregate_query(&self, predicate: Option<Predicate<E>>) -> Query<E> {
        apply_predicate(self.core_query(false, false), predicate)
    }

    async fn load(
        &self,
        query: &Query<E>,
        cancel: &CancellationSignal,
        operation: &'static str,
    ) -> RepoResult<Vec<E>> {
        query.includes().validate::<E>()?;
        cancel.check(operation)?;

        let rows = self
            .session
            .collection::<E>(&query.collection_options())
            .await
            .map_err(Self::store_failure(operation))?;
        let rows = query.evaluate(rows);
        debug!("{} on '{}' matched {} row(s)", operation, E::entity_name(), rows.len());
        Ok(rows)
    }

    fn stage(&self, entity: E, state: EntityState, operation: &'static str) -> RepoResult<()> {
        debug!("{} stages '{}' {:?} as {}", operation, E::entity_name(), entity.key(), state);
        self.session
            .set_entity_state(entity, state)
            .map_err(Self::store_failure(operation))
    }

    fn store_failure(operation: &'static str) -> impl FnOnce(SessionError) -> RepoError {
        move |err| {
            error!("{} on '{}' failed: {}", operation, E::entity_name(), err);
            RepoError::Store(err)
        }
    }
}

/// Rebuild a key of `E` from its parts. One part is the key itself; several
/// parts form a tuple key.
pub fn key_from_parts<E: Entity>(parts: &[Value]) -> RepoResult<E::Key> {
    if parts.is_empty() {
        return Err(RepoError::invalid("keys", "at least one key value is required"));
    }
    let as_tuple = || serde_json::from_value::<E::Key>(Value::Array(parts.to_vec()));
    let parsed = match parts {
        [single] => serde_json::from_value::<E::Key>(single.clone()).or_else(|_| as_tuple()),
        _ => as_tuple(),
    };
    parsed.map_err(|err| {
        RepoError::invalid(
            "keys",
            format!("{parts:?} is not a key of '{}': {err}", E::entity_name()),
        )
    })
}

fn validate<E: Entity>(entity: &E) -> RepoResult<()> {
    entity.validate().map_err(|reason| RepoError::Validation {
        entity: E::entity_name(),
        reason,
    })
}

fn extreme<T: Ord>(values: impl Iterator<Item = T>, wanted: Ordering) -> Option<T> {
    values.fold(None, |best, value| match best {
        Some(best) if value.cmp(&best) != wanted => Some(best),
        _ => Some(value),
    })
}
