//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with a fixed `Z` suffix and microsecond
//! precision, so string comparison in SQL matches chronological order.
//! Dates are `YYYY-MM-DD`. Decimals are their canonical string form.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sinapi_core::{
  maintenance::{MaintenanceEvent, MaintenanceKind},
  notify::{Notification, NotificationPreferences, StatusSnapshot, TrackedCode, Urgencia},
  price::{Fonte, PriceItem},
  tenant::TenantId,
  validation::ValidationStatus,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

fn decode_opt_decimal(s: Option<String>) -> Result<Option<Decimal>> {
  s.as_deref().map(decode_decimal).transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `precos` row.
pub struct RawPriceItem {
  pub codigo:          String,
  pub descricao:       String,
  pub unidade:         String,
  pub preco_unitario:  String,
  pub fonte:           String,
  pub estado:          String,
  pub data_referencia: String,
  pub categoria:       String,
}

impl RawPriceItem {
  pub const COLUMNS: &'static str = "codigo, descricao, unidade, preco_unitario, fonte, estado, \
                                     data_referencia, categoria";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      codigo:          row.get(0)?,
      descricao:       row.get(1)?,
      unidade:         row.get(2)?,
      preco_unitario:  row.get(3)?,
      fonte:           row.get(4)?,
      estado:          row.get(5)?,
      data_referencia: row.get(6)?,
      categoria:       row.get(7)?,
    })
  }

  pub fn into_item(self) -> Result<PriceItem> {
    Ok(PriceItem {
      preco_unitario:  decode_decimal(&self.preco_unitario)?,
      fonte:           Fonte::parse(&self.fonte)?,
      data_referencia: decode_date(&self.data_referencia)?,
      codigo:          self.codigo,
      descricao:       self.descricao,
      unidade:         self.unidade,
      estado:          self.estado,
      categoria:       self.categoria,
    })
  }
}

/// Raw values read directly from a `manutencoes` row.
pub struct RawEvent {
  pub id:                i64,
  pub codigo:            String,
  pub tipo_manutencao:   String,
  pub data_evento:       String,
  pub valor_anterior:    Option<String>,
  pub valor_novo:        Option<String>,
  pub codigo_substituto: Option<String>,
  pub descricao_motivo:  Option<String>,
}

impl RawEvent {
  pub const COLUMNS: &'static str = "id, codigo, tipo_manutencao, data_evento, valor_anterior, \
                                     valor_novo, codigo_substituto, descricao_motivo";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      codigo:            row.get(1)?,
      tipo_manutencao:   row.get(2)?,
      data_evento:       row.get(3)?,
      valor_anterior:    row.get(4)?,
      valor_novo:        row.get(5)?,
      codigo_substituto: row.get(6)?,
      descricao_motivo:  row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<MaintenanceEvent> {
    Ok(MaintenanceEvent {
      id:                self.id,
      tipo_manutencao:   MaintenanceKind::parse(&self.tipo_manutencao)?,
      data_evento:       decode_date(&self.data_evento)?,
      valor_anterior:    decode_opt_decimal(self.valor_anterior)?,
      valor_novo:        decode_opt_decimal(self.valor_novo)?,
      codigo:            self.codigo,
      codigo_substituto: self.codigo_substituto,
      descricao_motivo:  self.descricao_motivo,
    })
  }
}

/// Raw strings read directly from an `orcamento_codigos` row.
pub struct RawTrackedCode {
  pub orcamento_id:   String,
  pub tenant_id:      String,
  pub nome_orcamento: String,
  pub codigo:         String,
}

impl RawTrackedCode {
  pub fn into_tracked(self) -> Result<TrackedCode> {
    Ok(TrackedCode {
      orcamento_id:   decode_uuid(&self.orcamento_id)?,
      tenant_id:      TenantId::from_str(&self.tenant_id)?,
      nome_orcamento: self.nome_orcamento,
      codigo:         self.codigo,
    })
  }
}

/// Raw strings read directly from a `status_snapshots` row.
pub struct RawSnapshot {
  pub codigo:        String,
  pub status:        String,
  pub verificado_em: String,
}

impl RawSnapshot {
  pub fn into_snapshot(self) -> Result<StatusSnapshot> {
    Ok(StatusSnapshot {
      status:        ValidationStatus::parse(&self.status)?,
      verificado_em: decode_dt(&self.verificado_em)?,
      codigo:        self.codigo,
    })
  }
}

/// Raw values read directly from a `preferencias_notificacao` row.
pub struct RawPreferences {
  pub email_ativo:       bool,
  pub notif_desktop:     bool,
  pub codigos_favoritos: String,
  pub tipos_alteracao:   String,
}

impl RawPreferences {
  pub fn into_preferences(self) -> Result<NotificationPreferences> {
    Ok(NotificationPreferences {
      email_ativo:       self.email_ativo,
      notif_desktop:     self.notif_desktop,
      codigos_favoritos: serde_json::from_str(&self.codigos_favoritos)?,
      tipos_alteracao:   serde_json::from_str(&self.tipos_alteracao)?,
    })
  }
}

/// Raw values read directly from a `notificacoes` row.
pub struct RawNotification {
  pub id:                 String,
  pub tenant_id:          String,
  pub orcamento_id:       String,
  pub tipo:               String,
  pub titulo:             String,
  pub mensagem:           String,
  pub codigos_impactados: String,
  pub urgencia:           String,
  pub lida:               bool,
  pub criada_em:          String,
}

impl RawNotification {
  pub const COLUMNS: &'static str = "id, tenant_id, orcamento_id, tipo, titulo, mensagem, \
                                     codigos_impactados, urgencia, lida, criada_em";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      tenant_id:          row.get(1)?,
      orcamento_id:       row.get(2)?,
      tipo:               row.get(3)?,
      titulo:             row.get(4)?,
      mensagem:           row.get(5)?,
      codigos_impactados: row.get(6)?,
      urgencia:           row.get(7)?,
      lida:               row.get(8)?,
      criada_em:          row.get(9)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      id:                 decode_uuid(&self.id)?,
      tenant_id:          TenantId::from_str(&self.tenant_id)?,
      orcamento_id:       decode_uuid(&self.orcamento_id)?,
      codigos_impactados: serde_json::from_str(&self.codigos_impactados)?,
      urgencia:           Urgencia::parse(&self.urgencia)?,
      criada_em:          decode_dt(&self.criada_em)?,
      tipo:               self.tipo,
      titulo:             self.titulo,
      mensagem:           self.mensagem,
      lida:               self.lida,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
    let b = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
  }

  #[test]
  fn bad_date_is_reported() {
    assert!(matches!(decode_date("01/03/2024"), Err(Error::DateParse(_))));
  }
}
