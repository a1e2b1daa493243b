//! `UnitOfWork`: owns one session, caches one repository per entity type
//! and commits staged changes.
//!
//! A unit of work is meant to be scoped to a single request or transaction.
//! It provides no internal locking; share it across concurrent operations
//! and the staged state is undefined.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use session::{Entity, Session};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::paging::DEFAULT_PAGE_SIZE;
use crate::{RepoError, RepoResult, Repository};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for a unit of work.
#[derive(Debug, Clone)]
pub struct UnitOfWorkConfig {
    /// Label attached to log lines, e.g. the request it serves.
    pub label: String,
    /// Page size used by [`Repository::page`].
    pub default_page_size: usize,
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            label: "unit-of-work".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// UnitOfWork
// ---------------------------------------------------------------------------

/// Repository registry plus commit boundary over one session.
pub struct UnitOfWork<S: Session + 'static> {
    id: Uuid,
    config: UnitOfWorkConfig,
    session: Arc<S>,
    repositories: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    disposed: bool,
}

impl<S: Session + 'static> UnitOfWork<S> {
    /// Take ownership of `session`.
    pub fn new(session: S) -> Self {
        Self::with_config(session, UnitOfWorkConfig::default())
    }

    pub fn with_config(session: S, config: UnitOfWorkConfig) -> Self {
        let id = Uuid::new_v4();
        info!("unit of work {} ('{}') opened", id, config.label);
        Self {
            id,
            config,
            session: Arc::new(session),
            repositories: HashMap::new(),
            disposed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owned session.
    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of repositories created so far.
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// The repository for `E`, created on first request.
    ///
    /// Every call for the same `E` returns the same instance.
    pub fn get_repository<E: Entity>(&mut self) -> RepoResult<Arc<Repository<E, S>>> {
        if self.disposed {
            return Err(RepoError::Disposed);
        }

        let type_id = TypeId::of::<E>();
        let entry = match self.repositories.get(&type_id) {
            Some(existing) => Arc::clone(existing),
            None => {
                debug!("unit of work {}: creating repository for '{}'", self.id, E::entity_name());
                let repository: Arc<dyn Any + Send + Sync> =
                    Arc::new(Repository::<E, S>::with_page_size(
                        Arc::clone(&self.session),
                        self.config.default_page_size,
                    ));
                self.repositories.insert(type_id, Arc::clone(&repository));
                repository
            }
        };

        // The TypeId key guarantees the downcast succeeds.
        entry.downcast::<Repository<E, S>>().map_err(|_| {
            RepoError::Internal(format!("repository type mismatch for '{}'", E::entity_name()))
        })
    }

    /// Persist every staged change and return the number of affected rows.
    ///
    /// Store failures are returned unchanged; nothing is retried.
    #[instrument(skip(self), fields(uow = %self.id, label = %self.config.label))]
    pub async fn commit(&self) -> RepoResult<usize> {
        if self.disposed {
            return Err(RepoError::Disposed);
        }
        match self.session.commit().await {
            Ok(affected) => {
                info!("committed {} row change(s)", affected);
                Ok(affected)
            }
            Err(err) => {
                error!("commit failed: {}", err);
                Err(RepoError::Store(err))
            }
        }
    }

    /// Clear the repository cache and release the session.
    ///
    /// Runs at most once; later calls return `Ok(())`.
    pub fn dispose(&mut self) -> RepoResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.repositories.clear();

        match self.session.dispose() {
            Ok(()) => {
                debug!("unit of work {} disposed", self.id);
                Ok(())
            }
            Err(err) => {
                warn!("unit of work {}: releasing the session failed: {}", self.id, err);
                Err(RepoError::Store(err))
            }
        }
    }

    /// Dispose and hand back `result`.
    ///
    /// A disposal failure is reported only when `result` is `Ok`; an
    /// in-flight error always wins.
    pub fn complete<T>(mut self, result: RepoResult<T>) -> RepoResult<T> {
        let disposal = self.dispose();
        match (result, disposal) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(err), Err(cleanup)) => {
                warn!("unit of work {}: disposal error suppressed: {}", self.id, cleanup);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }
}

impl<S: Session + 'static> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if !self.disposed {
            let _ = self.dispose();
        }
    }
}
