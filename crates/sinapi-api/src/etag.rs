//! ETags for maintenance histories.
//!
//! The tag is a SHA-256 over the `(id, data_evento)` pairs of the timeline,
//! so it changes whenever an event is appended and never otherwise.

use chrono::Datelike as _;
use sha2::{Digest, Sha256};
use sinapi_core::maintenance::MaintenanceEvent;

/// Quoted ETag for a history. Order-independent.
pub fn history_etag(events: &[MaintenanceEvent]) -> String {
  let mut pairs: Vec<(i64, i32)> = events
    .iter()
    .map(|e| (e.id, e.data_evento.num_days_from_ce()))
    .collect();
  pairs.sort_unstable();

  let mut hasher = Sha256::new();
  for (id, day) in &pairs {
    hasher.update(id.to_le_bytes());
    hasher.update(day.to_le_bytes());
  }
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Accepts `*`, comma-separated lists, weak tags and bare (unquoted) tags.
pub fn if_none_match(header: &str, etag: &str) -> bool {
  let bare = etag.trim_matches('"');
  header.split(',').map(str::trim).any(|candidate| {
    candidate == "*"
      || candidate
        .strip_prefix("W/")
        .unwrap_or(candidate)
        .trim_matches('"')
        == bare
  })
}
