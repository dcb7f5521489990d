//! Maintenance events: the append-only change log of SINAPI codes.
//!
//! Events are never updated or deleted. The current status of a code is
//! computed at read time from the single latest event for that code; see
//! [`latest_event`].

use std::{cmp::Ordering, collections::HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// What a maintenance event did to a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceKind {
  Alteracao,
  Desativacao,
  Inclusao,
  Substituicao,
}

impl MaintenanceKind {
  pub const ALL: [Self; 4] = [
    Self::Alteracao,
    Self::Desativacao,
    Self::Inclusao,
    Self::Substituicao,
  ];

  /// The string stored in the `tipo_manutencao` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Alteracao => "ALTERACAO",
      Self::Desativacao => "DESATIVACAO",
      Self::Inclusao => "INCLUSAO",
      Self::Substituicao => "SUBSTITUICAO",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "ALTERACAO" => Ok(Self::Alteracao),
      "DESATIVACAO" => Ok(Self::Desativacao),
      "INCLUSAO" => Ok(Self::Inclusao),
      "SUBSTITUICAO" => Ok(Self::Substituicao),
      other => Err(Error::UnknownMaintenanceKind(other.to_owned())),
    }
  }

  /// Order in which [`from_label`](Self::from_label) tries the stems; a
  /// label mentioning two kinds takes the first.
  pub const LABEL_PRIORITY: [Self; 4] = [
    Self::Desativacao,
    Self::Substituicao,
    Self::Alteracao,
    Self::Inclusao,
  ];

  /// Lenient reading of upstream labels such as `COMPOSIÇÃO DESATIVADA` or
  /// `Alteração de preço`. Labels that name no kind (`Normal`) give `None`.
  pub fn from_label(label: &str) -> Option<Self> {
    let label = label.trim().to_uppercase();
    Self::LABEL_PRIORITY.into_iter().find(|k| label.contains(k.stem()))
  }

  /// Accent-free stem shared by every spelling of the kind.
  pub fn stem(self) -> &'static str {
    match self {
      Self::Alteracao => "ALTERA",
      Self::Desativacao => "DESATIV",
      Self::Inclusao => "INCLU",
      Self::Substituicao => "SUBSTITU",
    }
  }

  /// Rank used to break ties between events on the same date. Higher wins:
  /// a deactivation dominates a replacement, which dominates a value change.
  fn severity(self) -> u8 {
    match self {
      Self::Inclusao => 0,
      Self::Alteracao => 1,
      Self::Substituicao => 2,
      Self::Desativacao => 3,
    }
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One row of the maintenance log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
  /// Insertion order assigned by the source table.
  pub id:                i64,
  pub codigo:            String,
  pub tipo_manutencao:   MaintenanceKind,
  pub data_evento:       NaiveDate,
  pub valor_anterior:    Option<Decimal>,
  pub valor_novo:        Option<Decimal>,
  pub codigo_substituto: Option<String>,
  pub descricao_motivo:  Option<String>,
}

impl MaintenanceEvent {
  /// Chronological order with the tie-break rules of [`latest_event`].
  pub fn chronological_cmp(&self, other: &Self) -> Ordering {
    self
      .data_evento
      .cmp(&other.data_evento)
      .then_with(|| {
        self
          .tipo_manutencao
          .severity()
          .cmp(&other.tipo_manutencao.severity())
      })
      .then_with(|| self.id.cmp(&other.id))
  }
}

/// The single most recent event among `events`.
///
/// Ordering is by `data_evento`. Events sharing a date are resolved in favour
/// of the more conservative kind (`DESATIVACAO` > `SUBSTITUICAO` >
/// `ALTERACAO` > `INCLUSAO`), then by the higher insertion `id`.
///
/// `events` are assumed to belong to one code; use [`latest_by_code`] for a
/// mixed slice.
pub fn latest_event(events: &[MaintenanceEvent]) -> Option<&MaintenanceEvent> {
  events.iter().max_by(|a, b| a.chronological_cmp(b))
}

/// Group `events` by code and reduce each group with [`latest_event`].
pub fn latest_by_code(
  events: &[MaintenanceEvent],
) -> HashMap<&str, &MaintenanceEvent> {
  let mut latest: HashMap<&str, &MaintenanceEvent> = HashMap::new();
  for ev in events {
    latest
      .entry(ev.codigo.as_str())
      .and_modify(|cur| {
        if ev.chronological_cmp(cur) == Ordering::Greater {
          *cur = ev;
        }
      })
      .or_insert(ev);
  }
  latest
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Maintenance status attached to search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceStatus {
  Ativo,
  Desativado,
  Alterado,
  Substituido,
  /// The maintenance lookup failed; the status is unknown.
  Indeterminado,
}

impl MaintenanceStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ativo => "ATIVO",
      Self::Desativado => "DESATIVADO",
      Self::Alterado => "ALTERADO",
      Self::Substituido => "SUBSTITUIDO",
      Self::Indeterminado => "INDETERMINADO",
    }
  }

  /// Status implied by the latest event of a code (`None` = no events).
  pub fn from_latest(latest: Option<&MaintenanceEvent>) -> Self {
    match latest.map(|e| e.tipo_manutencao) {
      None | Some(MaintenanceKind::Inclusao) => Self::Ativo,
      Some(MaintenanceKind::Desativacao) => Self::Desativado,
      Some(MaintenanceKind::Alteracao) => Self::Alterado,
      Some(MaintenanceKind::Substituicao) => Self::Substituido,
    }
  }
}
