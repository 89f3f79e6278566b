//! Storage backends
//!
//! `PgStore` is the production backend. `MemoryStore` keeps the same
//! locking and atomicity contract in process and backs local runs and tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
