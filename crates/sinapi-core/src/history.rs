//! Maintenance timeline of a single code.

use tracing::debug;

use crate::{maintenance::MaintenanceEvent, store::PriceStore};

/// Oldest first by `(data_evento, id)`.
pub(crate) fn sort_timeline(events: &mut [MaintenanceEvent]) {
  events.sort_by(|a, b| a.data_evento.cmp(&b.data_evento).then(a.id.cmp(&b.id)));
}

/// Every event of `codigo`, oldest first by `(data_evento, id)`.
///
/// Backends may return events in any order; sorting happens here.
pub async fn history<S: PriceStore>(
  store: &S,
  codigo: &str,
) -> Result<Vec<MaintenanceEvent>, S::Error> {
  let codigo = codigo.trim();
  if codigo.is_empty() {
    return Ok(Vec::new());
  }

  let mut events = store.get_events(&[codigo.to_owned()]).await?;
  events.retain(|e| e.codigo == codigo);
  sort_timeline(&mut events);

  debug!(codigo, count = events.len(), "loaded history");
  Ok(events)
}
