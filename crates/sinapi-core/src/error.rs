//! Error types for `sinapi-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid tenant id: {0:?}")]
  InvalidTenant(String),

  #[error("unknown maintenance kind: {0:?}")]
  UnknownMaintenanceKind(String),

  #[error("unknown price source: {0:?}")]
  UnknownFonte(String),

  #[error("unknown validation status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown urgency: {0:?}")]
  UnknownUrgencia(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
