//! `MockSession`: a test double wrapping any [`Session`].
//!
//! Records every call it receives and can be told to fail a class of
//! operations, so tests can assert round trips, disposal counts and error
//! propagation without a real store.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{CollectionOptions, Entity, EntityState, Session, SessionError, SessionResult};

/// A call observed by `MockSession`, in the order it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Collection { entity: &'static str, options: CollectionOptions },
    FindByKey { entity: &'static str },
    ExecuteRaw { entity: &'static str, sql: String },
    SetEntityState { entity: &'static str, state: EntityState },
    Commit,
    Dispose,
}

impl SessionCall {
    /// `true` for calls that reach the store.
    pub fn is_round_trip(&self) -> bool {
        matches!(
            self,
            Self::Collection { .. }
                | Self::FindByKey { .. }
                | Self::ExecuteRaw { .. }
                | Self::Commit
        )
    }
}

/// Behaviour injected into `MockSession` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Forward everything to the inner session.
    PassThrough,
    /// Fail `collection`, `find_by_key` and `execute_raw`.
    FailReads(SessionError),
    /// Fail `commit`.
    FailCommit(SessionError),
    /// Fail `dispose` (after recording it).
    FailDispose(SessionError),
}

/// A recording wrapper around an inner session.
pub struct MockSession<S> {
    inner: S,
    /// What the session will do on the affected calls.
    pub behaviour: MockBehaviour,
    /// All calls seen by this session (in call order).
    pub calls: Arc<Mutex<Vec<SessionCall>>>,
}

impl<S: Session> MockSession<S> {
    /// Wrap `inner` without altering its behaviour.
    pub fn passthrough(inner: S) -> Self {
        Self::with_behaviour(inner, MockBehaviour::PassThrough)
    }

    /// Wrap `inner`, failing every read with `err`.
    pub fn failing_reads(inner: S, err: SessionError) -> Self {
        Self::with_behaviour(inner, MockBehaviour::FailReads(err))
    }

    /// Wrap `inner`, failing every commit with `err`.
    pub fn failing_commit(inner: S, err: SessionError) -> Self {
        Self::with_behaviour(inner, MockBehaviour::FailCommit(err))
    }

    /// Wrap `inner`, failing disposal with `err`.
    pub fn failing_dispose(inner: S, err: SessionError) -> Self {
        Self::with_behaviour(inner, MockBehaviour::FailDispose(err))
    }

    pub fn with_behaviour(inner: S, behaviour: MockBehaviour) -> Self {
        Self {
            inner,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The wrapped session.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Snapshot of the recorded calls.
    pub fn recorded(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls that reached the store.
    pub fn round_trips(&self) -> usize {
        self.recorded().iter().filter(|c| c.is_round_trip()).count()
    }

    /// Number of times `dispose` was called.
    pub fn dispose_count(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|c| matches!(c, SessionCall::Dispose))
            .count()
    }

    fn record(&self, call: SessionCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn read_fault(&self, entity: &'static str) -> SessionResult<()> {
        match &self.behaviour {
            MockBehaviour::FailReads(err) => {
                debug!("mock session: injected read failure on '{}': {}", entity, err);
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<S: Session> Session for MockSession<S> {
    async fn collection<E: Entity>(&self, options: &CollectionOptions) -> SessionResult<Vec<E>> {
        self.record(SessionCall::Collection {
            entity: E::entity_name(),
            options: options.clone(),
        });
        self.read_fault(E::entity_name())?;
        self.inner.collection::<E>(options).await
    }

    async fn find_by_key<E: Entity>(&self, key: &E::Key) -> SessionResult<Option<E>> {
        self.record(SessionCall::FindByKey { entity: E::entity_name() });
        self.read_fault(E::entity_name())?;
        self.inner.find_by_key::<E>(key).await
    }

    async fn execute_raw<E: Entity>(&self, sql: &str, params: &[Value]) -> SessionResult<Vec<E>> {
        self.record(SessionCall::ExecuteRaw {
            entity: E::entity_name(),
            sql: sql.to_owned(),
        });
        self.read_fault(E::entity_name())?;
        self.inner.execute_raw::<E>(sql, params).await
    }

    fn entity_state<E: Entity>(&self, key: &E::Key) -> EntityState {
        self.inner.entity_state::<E>(key)
    }

    fn set_entity_state<E: Entity>(&self, entity: E, state: EntityState) -> SessionResult<()> {
        self.record(SessionCall::SetEntityState {
            entity: E::entity_name(),
            state,
        });
        self.inner.set_entity_state(entity, state)
    }

    async fn commit(&self) -> SessionResult<usize> {
        self.record(SessionCall::Commit);
        if let MockBehaviour::FailCommit(err) = &self.behaviour {
            debug!("mock session: injected commit failure: {}", err);
            return Err(err.clone());
        }
        self.inner.commit().await
    }

    fn dispose(&self) -> SessionResult<()> {
        self.record(SessionCall::Dispose);
        self.inner.dispose()?;
        match &self.behaviour {
            MockBehaviour::FailDispose(err) => {
                debug!("mock session: injected dispose failure: {}", err);
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }
}
