//! `uow` crate: generic repositories and the unit of work.
//!
//! A [`UnitOfWork`] owns one [`session::Session`] and hands out one
//! [`Repository`] per entity type. Repositories compose [`Query`]
//! descriptors, read through the session and stage writes on it; only
//! [`UnitOfWork::commit`] persists them.

pub mod cancel;
pub mod error;
pub mod paging;
pub mod query;
pub mod repository;
pub mod unit_of_work;

pub use cancel::CancellationSignal;
pub use error::{RepoError, RepoResult};
pub use paging::{PageRequest, PagedList, DEFAULT_PAGE_SIZE};
pub use query::{Include, OrderBy, Predicate, Projection, Query, QueryOptions};
pub use repository::{key_from_parts, Repository};
pub use unit_of_work::{UnitOfWork, UnitOfWorkConfig};

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod unit_of_work_tests;
