//! Aggregate statistics over the maintenance log.

use std::collections::BTreeMap;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  maintenance::{MaintenanceEvent, MaintenanceKind},
  store::PriceStore,
};

/// Raw counts returned by [`PriceStore::tally_events`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTally {
  pub total:    u64,
  /// Count per `tipo_manutencao` string; kinds without events are omitted.
  pub por_tipo: BTreeMap<String, u64>,
  /// Events with `data_evento >= since`.
  pub recentes: u64,
}

impl EventTally {
  pub fn from_events<'a>(
    events: impl IntoIterator<Item = &'a MaintenanceEvent>,
    since: NaiveDate,
  ) -> Self {
    let mut tally = Self::default();
    for ev in events {
      tally.total += 1;
      *tally
        .por_tipo
        .entry(ev.tipo_manutencao.as_str().to_owned())
        .or_default() += 1;
      if ev.data_evento >= since {
        tally.recentes += 1;
      }
    }
    tally
  }
}

/// The `/stats` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceStats {
  pub total_eventos:    u64,
  /// Every kind is present, with zero when it has no events.
  pub por_tipo:         BTreeMap<String, u64>,
  /// Events in the six months up to `hoje`.
  pub eventos_recentes: u64,
  pub gerado_em:        DateTime<Utc>,
}

/// Number of months counted as "recent".
pub const JANELA_RECENTE_MESES: u32 = 6;

pub async fn maintenance_stats<S: PriceStore>(
  store: &S,
  hoje: NaiveDate,
) -> Result<MaintenanceStats, S::Error> {
  let since = hoje
    .checked_sub_months(Months::new(JANELA_RECENTE_MESES))
    .unwrap_or(NaiveDate::MIN);
  let tally = store.tally_events(since).await?;

  let mut por_tipo: BTreeMap<String, u64> = MaintenanceKind::ALL
    .iter()
    .map(|k| (k.as_str().to_owned(), 0))
    .collect();
  por_tipo.extend(tally.por_tipo);

  Ok(MaintenanceStats {
    total_eventos: tally.total,
    por_tipo,
    eventos_recentes: tally.recentes,
    gerado_em: Utc::now(),
  })
}
