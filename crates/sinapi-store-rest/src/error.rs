//! Error type for `sinapi-store-rest`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sinapi_core::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// PostgREST answered with a non-success status.
  #[error("{table} returned {status}: {body}")]
  Status {
    table:  String,
    status: u16,
    body:   String,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
