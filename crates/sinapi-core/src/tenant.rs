//! Tenant identity, validated once at the boundary.
//!
//! Every tenant-scoped operation takes a [`TenantId`], never a raw string, so
//! the shape check happens exactly once per request.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// A validated tenant identifier (a non-nil UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(Uuid);

impl TenantId {
  pub fn new(id: Uuid) -> Result<Self, Error> {
    if id.is_nil() {
      return Err(Error::InvalidTenant(id.to_string()));
    }
    Ok(Self(id))
  }

  pub fn as_uuid(&self) -> Uuid { self.0 }
}

impl FromStr for TenantId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let id = Uuid::parse_str(trimmed)
      .map_err(|_| Error::InvalidTenant(trimmed.to_owned()))?;
    Self::new(id)
  }
}

impl TryFrom<String> for TenantId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<TenantId> for String {
  fn from(t: TenantId) -> Self { t.0.hyphenated().to_string() }
}

impl fmt::Display for TenantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.hyphenated())
  }
}

/// Request-scoped context built once by the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
  pub tenant_id: TenantId,
}
