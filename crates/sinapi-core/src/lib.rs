//! Core types, store traits and reconciliation services for SINAPI
//! reference prices.
//!
//! No HTTP or database code lives here. Backends (`sinapi-store-sqlite`,
//! `sinapi-store-rest`) implement the traits in [`store`]; the services are
//! generic over them, and the HTTP layer and the CLI only use these types.

pub mod cache;
pub mod error;
pub mod history;
pub mod maintenance;
pub mod notify;
pub mod price;
pub mod search;
pub mod stats;
pub mod store;
pub mod tenant;
pub mod validation;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
