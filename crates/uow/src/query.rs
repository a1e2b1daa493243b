//! Query composition.
//!
//! A [`Query`] is an immutable descriptor over one entity collection:
//! the collection view flags, an include set, an optional predicate and an
//! optional ordering. The `apply_*` functions each return a new descriptor.
//! [`compose`] fixes the order: includes, then predicate, then ordering.
//! [`apply_projection`] is terminal; a [`Projection`] cannot be filtered or
//! ordered any further.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use session::{CollectionOptions, Entity};

use crate::{RepoError, RepoResult};

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A pure boolean test over an entity.
pub struct Predicate<E>(Arc<dyn Fn(&E) -> bool + Send + Sync>);

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

impl<E: 'static> Predicate<E> {
    pub fn new(test: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(test))
    }

    pub fn matches(&self, entity: &E) -> bool {
        (self.0)(entity)
    }

    /// Both predicates must hold.
    pub fn and(self, other: Predicate<E>) -> Self {
        Self::new(move |e| self.matches(e) && other.matches(e))
    }

    /// Either predicate may hold.
    pub fn or(self, other: Predicate<E>) -> Self {
        Self::new(move |e| self.matches(e) || other.matches(e))
    }

    pub fn negate(self) -> Self {
        Self::new(move |e| !self.matches(e))
    }

    /// Case-insensitive substring search over a text field.
    ///
    /// An empty needle matches everything.
    pub fn contains_text(
        field: impl Fn(&E) -> String + Send + Sync + 'static,
        needle: impl Into<String>,
    ) -> Self {
        let needle = needle.into().to_lowercase();
        Self::new(move |e| needle.is_empty() || field(e).to_lowercase().contains(&needle))
    }
}

// ---------------------------------------------------------------------------
// OrderBy
// ---------------------------------------------------------------------------

/// A total order over entities.
pub struct OrderBy<E>(Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>);

impl<E> Clone for OrderBy<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> fmt::Debug for OrderBy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderBy(..)")
    }
}

impl<E: 'static> OrderBy<E> {
    pub fn new(compare: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(compare))
    }

    /// Ascending by the extracted key.
    pub fn asc<K: Ord>(key: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        Self::new(move |a, b| key(a).cmp(&key(b)))
    }

    /// Descending by the extracted key.
    pub fn desc<K: Ord>(key: impl Fn(&E) -> K + Send + Sync + 'static) -> Self {
        Self::new(move |a, b| key(b).cmp(&key(a)))
    }

    /// Break ties of `self` with `next`.
    pub fn then(self, next: OrderBy<E>) -> Self {
        Self::new(move |a, b| self.compare(a, b).then_with(|| next.compare(a, b)))
    }

    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        (self.0)(a, b)
    }
}

// ---------------------------------------------------------------------------
// Include
// ---------------------------------------------------------------------------

/// Relations to eager-load with each row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Include {
    relations: BTreeSet<&'static str>,
}

impl Include {
    pub fn relation(name: &'static str) -> Self {
        Self::default().and(name)
    }

    pub fn and(mut self, name: &'static str) -> Self {
        self.relations.insert(name);
        self
    }

    /// Every relation `E` enumerates.
    pub fn all<E: Entity>() -> Self {
        Self {
            relations: E::relations().iter().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.relations.iter().copied()
    }

    fn union(mut self, other: Include) -> Self {
        self.relations.extend(other.relations);
        self
    }

    /// Reject relation names `E` does not declare.
    pub(crate) fn validate<E: Entity>(&self) -> RepoResult<()> {
        let known = E::relations();
        match self.relations.iter().find(|name| !known.contains(*name)) {
            Some(unknown) => Err(RepoError::invalid(
                "include",
                format!("'{}' has no relation named '{}'", E::entity_name(), unknown),
            )),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Immutable query descriptor over the collection of `E`.
pub struct Query<E> {
    track_changes: bool,
    ignore_filters: bool,
    includes: Include,
    predicate: Option<Predicate<E>>,
    ordering: Option<OrderBy<E>>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            track_changes: self.track_changes,
            ignore_filters: self.ignore_filters,
            includes: self.includes.clone(),
            predicate: self.predicate.clone(),
            ordering: self.ordering.clone(),
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("track_changes", &self.track_changes)
            .field("ignore_filters", &self.ignore_filters)
            .field("includes", &self.includes)
            .field("filtered", &self.predicate.is_some())
            .field("ordered", &self.ordering.is_some())
            .finish()
    }
}

impl<E: Entity> Query<E> {
    /// The unfiltered, unordered view over the backing collection.
    pub fn source(track_changes: bool, ignore_filters: bool) -> Self {
        Self {
            track_changes,
            ignore_filters,
            includes: Include::default(),
            predicate: None,
            ordering: None,
        }
    }

    pub fn track_changes(&self) -> bool {
        self.track_changes
    }

    pub fn ignore_filters(&self) -> bool {
        self.ignore_filters
    }

    pub fn includes(&self) -> &Include {
        &self.includes
    }

    pub fn is_filtered(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn is_ordered(&self) -> bool {
        self.ordering.is_some()
    }

    /// How the session should open the backing collection.
    pub fn collection_options(&self) -> CollectionOptions {
        CollectionOptions {
            track_changes: self.track_changes,
            ignore_filters: self.ignore_filters,
            includes: self.includes.names().collect(),
        }
    }

    /// Filter and order rows loaded from the backing collection.
    pub fn evaluate(&self, rows: Vec<E>) -> Vec<E> {
        let mut rows: Vec<E> = match &self.predicate {
            Some(predicate) => rows.into_iter().filter(|e| predicate.matches(e)).collect(),
            None => rows,
        };
        if let Some(ordering) = &self.ordering {
            rows.sort_by(|a, b| ordering.compare(a, b));
        }
        rows
    }
}

/// Narrow `query` by `predicate`. Repeated application intersects.
pub fn apply_predicate<E: Entity>(query: Query<E>, predicate: Option<Predicate<E>>) -> Query<E> {
    match predicate {
        None => query,
        Some(predicate) => Query {
            predicate: Some(match query.predicate {
                Some(existing) => existing.and(predicate),
                None => predicate,
            }),
            ..query
        },
    }
}

/// Order `query` by `ordering`, replacing any earlier ordering.
pub fn apply_ordering<E: Entity>(query: Query<E>, ordering: Option<OrderBy<E>>) -> Query<E> {
    match ordering {
        None => query,
        Some(ordering) => Query {
            ordering: Some(ordering),
            ..query
        },
    }
}

/// Add relations to eager-load.
pub fn apply_includes<E: Entity>(query: Query<E>, include: Option<Include>) -> Query<E> {
    match include {
        None => query,
        Some(include) => Query {
            includes: query.includes.union(include),
            ..query
        },
    }
}

/// Terminal step: map every matched row through `selector`.
pub fn apply_projection<E: Entity, R: 'static>(
    query: Query<E>,
    selector: impl Fn(&E) -> R + Send + Sync + 'static,
) -> Projection<E, R> {
    Projection {
        query,
        selector: Arc::new(selector),
    }
}

/// Build a query from `source` and `options` in the fixed order
/// includes → predicate → ordering.
pub fn compose<E: Entity>(source: Query<E>, options: QueryOptions<E>) -> Query<E> {
    let query = apply_includes(source, options.include);
    let query = apply_predicate(query, options.predicate);
    apply_ordering(query, options.ordering)
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// A query whose rows are mapped to `R`.
pub struct Projection<E, R> {
    query: Query<E>,
    selector: Arc<dyn Fn(&E) -> R + Send + Sync>,
}

impl<E, R> Clone for Projection<E, R> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<E: Entity, R> Projection<E, R> {
    /// The entity-level query the projection runs on.
    pub fn query(&self) -> &Query<E> {
        &self.query
    }

    pub fn project(&self, entity: &E) -> R {
        (self.selector)(entity)
    }

    pub fn evaluate(&self, rows: Vec<E>) -> Vec<R> {
        self.query
            .evaluate(rows)
            .iter()
            .map(|e| self.project(e))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// QueryOptions
// ---------------------------------------------------------------------------

/// Optional arguments shared by `find`, `select` and the paged reads.
///
/// `Default` is: no predicate, no ordering, no includes, no change tracking,
/// default filters honoured.
pub struct QueryOptions<E> {
    pub predicate: Option<Predicate<E>>,
    pub ordering: Option<OrderBy<E>>,
    pub include: Option<Include>,
    pub track_changes: bool,
    pub ignore_filters: bool,
}

impl<E> Default for QueryOptions<E> {
    fn default() -> Self {
        Self {
            predicate: None,
            ordering: None,
            include: None,
            track_changes: false,
            ignore_filters: false,
        }
    }
}

impl<E> Clone for QueryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            ordering: self.ordering.clone(),
            include: self.include.clone(),
            track_changes: self.track_changes,
            ignore_filters: self.ignore_filters,
        }
    }
}

impl<E: 'static> QueryOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter closure; repeated filters are intersected.
    pub fn filter(self, test: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicate(Predicate::new(test))
    }

    pub fn predicate(mut self, predicate: Predicate<E>) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, ordering: OrderBy<E>) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = Some(match self.include.take() {
            Some(existing) => existing.union(include),
            None => include,
        });
        self
    }

    pub fn track_changes(mut self, track: bool) -> Self {
        self.track_changes = track;
        self
    }

    pub fn ignore_filters(mut self, ignore: bool) -> Self {
        self.ignore_filters = ignore;
        self
    }
}
