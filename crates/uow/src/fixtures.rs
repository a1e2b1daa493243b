//! Shared test entities and unit-of-work builders.

use memstore::InMemorySession;
use session::mock::MockSession;
use session::Entity;

use crate::{CancellationSignal, UnitOfWork};

pub type TestSession = MockSession<InMemorySession>;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u32,
    pub val: i64,
    pub name: String,
    pub archived: bool,
}

impl Entity for Item {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }

    fn entity_name() -> &'static str {
        "item"
    }

    fn relations() -> &'static [&'static str] {
        &["owner", "tags"]
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".into());
        }
        Ok(())
    }
}

/// Stock level per warehouse and SKU (composite key).
#[derive(Debug, Clone, PartialEq)]
pub struct Stock {
    pub warehouse: u32,
    pub sku: String,
    pub qty: u32,
}

impl Entity for Stock {
    type Key = (u32, String);

    fn key(&self) -> (u32, String) {
        (self.warehouse, self.sku.clone())
    }

    fn entity_name() -> &'static str {
        "stock"
    }
}

pub fn item(id: u32, val: i64) -> Item {
    Item {
        id,
        val,
        name: format!("item-{id}"),
        archived: false,
    }
}

pub fn archived(id: u32, val: i64) -> Item {
    Item {
        archived: true,
        ..item(id, val)
    }
}

/// A unit of work over an empty store that hides archived items by default.
pub fn uow() -> UnitOfWork<TestSession> {
    let store = InMemorySession::new().with_default_filter::<Item>(|i| !i.archived);
    UnitOfWork::new(MockSession::passthrough(store))
}

/// As [`uow`], with `rows` already committed.
pub fn seeded(rows: Vec<Item>) -> UnitOfWork<TestSession> {
    let uow = uow();
    uow.session().inner().seed(rows);
    uow
}

pub fn live() -> CancellationSignal {
    CancellationSignal::new()
}
