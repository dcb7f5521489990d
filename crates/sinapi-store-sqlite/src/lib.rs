//! SQLite backend for the SINAPI reconciliation services.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Besides the read-side store traits it
//! exposes loader methods and a JSON [`Dataset`] import, used to seed a local
//! database from an export of the managed tables.

mod encode;
mod schema;
mod store;

pub mod dataset;
pub mod error;

pub use dataset::{Dataset, ImportSummary};
pub use error::{Error, Result};
pub use store::SqliteStore;
