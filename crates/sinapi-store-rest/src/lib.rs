//! Backend for the managed Postgres, spoken through its PostgREST API.
//!
//! Every request carries the service key, has a per-request timeout, and is
//! retried with exponential backoff on connection errors, timeouts, `429`
//! and `5xx` responses.

mod client;
mod rows;
mod store;

pub mod error;

pub use client::RestConfig;
pub use error::{Error, Result};
pub use store::RestStore;

#[cfg(test)]
mod tests;
