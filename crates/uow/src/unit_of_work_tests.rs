use std::sync::Arc;

use memstore::InMemorySession;
use session::mock::{MockSession, SessionCall};
use session::{EntityState, SessionError};

use crate::fixtures::{item, live, seeded, uow, Item, Stock, TestSession};
use crate::{PageRequest, RepoError, UnitOfWork, UnitOfWorkConfig};

fn failing_commit(err: SessionError) -> UnitOfWork<TestSession> {
    UnitOfWork::new(MockSession::failing_commit(InMemorySession::new(), err))
}

fn failing_dispose(err: SessionError) -> UnitOfWork<TestSession> {
    UnitOfWork::new(MockSession::failing_dispose(InMemorySession::new(), err))
}

// ----------------------------------------------------------------
// Repository registry
// ----------------------------------------------------------------

#[tokio::test]
async fn repeated_requests_share_one_repository() {
    let mut uow = uow();
    let first = uow.get_repository::<Item>().unwrap();
    let second = uow.get_repository::<Item>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(uow.repository_count(), 1);

    first.insert(item(1, 10)).unwrap();
    assert_eq!(second.entity_state(&1), EntityState::Added);
}

#[tokio::test]
async fn each_entity_type_gets_its_own_repository() {
    let mut uow = uow();
    uow.get_repository::<Item>().unwrap();
    uow.get_repository::<Stock>().unwrap();
    uow.get_repository::<Item>().unwrap();
    assert_eq!(uow.repository_count(), 2);
}

#[tokio::test]
async fn configured_page_size_reaches_repositories() {
    let config = UnitOfWorkConfig {
        label: "paging".into(),
        default_page_size: 7,
    };
    let mut uow = UnitOfWork::with_config(MockSession::passthrough(InMemorySession::new()), config);
    let items = uow.get_repository::<Item>().unwrap();
    assert_eq!(items.page(2), PageRequest::new(2, 7));
}

// ----------------------------------------------------------------
// Commit
// ----------------------------------------------------------------

#[tokio::test]
async fn changes_across_repositories_commit_together() {
    let mut uow = seeded(vec![item(1, 10)]);
    let items = uow.get_repository::<Item>().unwrap();
    let stock = uow.get_repository::<Stock>().unwrap();

    items.update(item(1, 11)).unwrap();
    items.insert(item(2, 20)).unwrap();
    stock
        .insert(Stock { warehouse: 1, sku: "A-1".into(), qty: 3 })
        .unwrap();

    assert_eq!(uow.commit().await.unwrap(), 3);
    assert_eq!(uow.session().inner().stored::<Item>(), vec![item(1, 11), item(2, 20)]);
    assert_eq!(uow.session().inner().stored::<Stock>().len(), 1);
}

#[tokio::test]
async fn commit_with_nothing_staged_affects_nothing() {
    let uow = seeded(vec![item(1, 10)]);
    assert_eq!(uow.commit().await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_insert_fails_the_whole_commit() {
    let mut uow = seeded(vec![item(1, 10)]);
    let items = uow.get_repository::<Item>().unwrap();

    items.insert(item(2, 20)).unwrap();
    items.insert(item(1, 99)).unwrap();

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Store(SessionError::Constraint { entity: "item", .. })
    ));
    assert_eq!(uow.session().inner().stored::<Item>(), vec![item(1, 10)]);
}

#[tokio::test]
async fn commit_failure_is_returned_unchanged() {
    let refused = SessionError::Unavailable("primary is read-only".into());
    let mut uow = failing_commit(refused.clone());
    uow.get_repository::<Item>().unwrap().insert(item(1, 1)).unwrap();

    match uow.commit().await {
        Err(RepoError::Store(err)) => assert_eq!(err, refused),
        other => panic!("expected the store error, got {other:?}"),
    }
    let commits = uow
        .session()
        .recorded()
        .into_iter()
        .filter(|c| *c == SessionCall::Commit)
        .count();
    assert_eq!(commits, 1);
}

// ----------------------------------------------------------------
// Disposal
// ----------------------------------------------------------------

#[tokio::test]
async fn dispose_runs_once() {
    let mut uow = uow();
    uow.get_repository::<Item>().unwrap();

    uow.dispose().unwrap();
    uow.dispose().unwrap();

    assert!(uow.is_disposed());
    assert_eq!(uow.repository_count(), 0);
    assert_eq!(uow.session().dispose_count(), 1);
    assert!(uow.session().inner().is_disposed());
}

#[tokio::test]
async fn disposed_unit_of_work_rejects_work() {
    let mut uow = uow();
    let items = uow.get_repository::<Item>().unwrap();
    uow.dispose().unwrap();

    assert!(matches!(uow.get_repository::<Item>(), Err(RepoError::Disposed)));
    assert!(matches!(uow.commit().await, Err(RepoError::Disposed)));
    assert!(matches!(
        items.find_by_id(&1, &live()).await,
        Err(RepoError::Store(SessionError::Disposed))
    ));
}

#[tokio::test]
async fn dropping_disposes_the_session() {
    let uow = uow();
    let calls = Arc::clone(&uow.session().calls);
    drop(uow);

    let disposals = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, SessionCall::Dispose))
        .count();
    assert_eq!(disposals, 1);
}

#[tokio::test]
async fn dropping_after_dispose_does_not_dispose_again() {
    let mut uow = uow();
    let calls = Arc::clone(&uow.session().calls);
    uow.dispose().unwrap();
    drop(uow);

    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disposal_failure_is_reported() {
    let mut uow = failing_dispose(SessionError::Unavailable("socket closed".into()));
    let err = uow.dispose().unwrap_err();
    assert!(matches!(err, RepoError::Store(SessionError::Unavailable(_))));
    assert!(uow.is_disposed());
    assert!(uow.dispose().is_ok());
}

// ----------------------------------------------------------------
// Scoped completion
// ----------------------------------------------------------------

#[tokio::test]
async fn complete_returns_the_value_and_disposes() {
    let uow = uow();
    let calls = Arc::clone(&uow.session().calls);

    assert_eq!(uow.complete(Ok(5)).unwrap(), 5);
    assert_eq!(*calls.lock().unwrap(), vec![SessionCall::Dispose]);
}

#[tokio::test]
async fn complete_reports_disposal_failure_after_success() {
    let uow = failing_dispose(SessionError::Unavailable("socket closed".into()));
    let err = uow.complete(Ok(())).unwrap_err();
    assert!(matches!(err, RepoError::Store(SessionError::Unavailable(_))));
}

#[tokio::test]
async fn in_flight_error_wins_over_disposal_failure() {
    let uow = failing_dispose(SessionError::Unavailable("socket closed".into()));
    let err = uow.complete::<()>(Err(RepoError::Cancelled)).unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));

    let uow = seeded(vec![]);
    let err = uow.complete::<()>(Err(RepoError::Cancelled)).unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
}

#[tokio::test]
async fn work_inside_complete_commits_before_release() {
    let mut uow = uow();
    let store = Arc::clone(&uow.session().calls);
    let items = uow.get_repository::<Item>().unwrap();

    items.insert(item(1, 10)).unwrap();
    let result = uow.commit().await;
    let affected = uow.complete(result).unwrap();

    assert_eq!(affected, 1);
    let calls = store.lock().unwrap().clone();
    assert_eq!(calls.last(), Some(&SessionCall::Dispose));
    assert!(calls.contains(&SessionCall::Commit));
}
