//! `memstore` crate: an in-process store behind the [`session::Session`]
//! contract.
//!
//! Used by tests and the demo binary wherever a real database would sit.

mod memory;
mod table;

pub use memory::InMemorySession;
pub use table::{RawQuery, RowFilter};
