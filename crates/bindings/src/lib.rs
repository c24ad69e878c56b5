//! Binding graph persistence for courier.
//!
//! Sources, targets, and their many-to-many bindings, plus the persisted
//! repost step. SQLite in production, in-memory for tests.

pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {store::BindingStore, store_memory::MemoryStore, store_sqlite::SqliteStore};
