//! Row shapes of the managed tables and their mapping to domain types.
//!
//! Column names are the ones used by the Postgres schema (`codigo_sinapi`,
//! `descricao_insumo`, `mes_referencia`, …), which differ from the domain
//! field names.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sinapi_core::{
  maintenance::{MaintenanceEvent, MaintenanceKind},
  notify::{Notification, NotificationPreferences, StatusSnapshot, TrackedCode, Urgencia},
  price::{Fonte, PriceItem},
  tenant::TenantId,
  validation::ValidationStatus,
};
use tracing::warn;
use uuid::Uuid;

use crate::Result;

pub const PRICES: &str = "sinapi_dados_oficiais";
pub const EVENTS: &str = "sinapi_manutencoes";
pub const TRACKED: &str = "orcamento_codigos_sinapi";
pub const SNAPSHOTS: &str = "sinapi_status_snapshot";
pub const NOTIFICATIONS: &str = "notificacoes";
pub const PREFERENCES: &str = "usuarios_preferencias_notificacao";

/// SINAPI codes are numeric in older tables and text in newer ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Code {
  Text(String),
  Number(i64),
}

impl Code {
  fn into_string(self) -> String {
    match self {
      Self::Text(s) => s.trim().to_owned(),
      Self::Number(n) => n.to_string(),
    }
  }
}

// ─── Prices ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PriceRow {
  codigo_sinapi:    Code,
  descricao_insumo: String,
  unidade:          String,
  preco_unitario:   Decimal,
  fonte:            String,
  estado:           String,
  mes_referencia:   NaiveDate,
  #[serde(default)]
  tipo_insumo:      Option<String>,
}

impl PriceRow {
  pub const SELECT: &'static str = "codigo_sinapi,descricao_insumo,unidade,preco_unitario,fonte,\
                                    estado,mes_referencia,tipo_insumo";

  pub fn into_item(self) -> Result<PriceItem> {
    Ok(PriceItem {
      codigo:          self.codigo_sinapi.into_string(),
      descricao:       self.descricao_insumo,
      unidade:         self.unidade,
      preco_unitario:  self.preco_unitario,
      fonte:           Fonte::parse(&self.fonte)?,
      estado:          self.estado,
      data_referencia: self.mes_referencia,
      categoria:       self.tipo_insumo.unwrap_or_default(),
    })
  }
}

// ─── Maintenance ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventRow {
  id:                i64,
  codigo_sinapi:     Code,
  tipo_manutencao:   String,
  data_referencia:   NaiveDate,
  #[serde(default)]
  valor_anterior:    Option<Decimal>,
  #[serde(default)]
  valor_novo:        Option<Decimal>,
  #[serde(default)]
  codigo_substituto: Option<Code>,
  #[serde(default)]
  descricao_motivo:  Option<String>,
}

impl EventRow {
  pub const SELECT: &'static str = "id,codigo_sinapi,tipo_manutencao,data_referencia,\
                                    valor_anterior,valor_novo,codigo_substituto,descricao_motivo";

  /// `None` for rows whose `tipo_manutencao` names no maintenance kind;
  /// the upstream table also carries bookkeeping rows such as `Normal`.
  pub fn into_event(self) -> Option<MaintenanceEvent> {
    let Some(kind) = MaintenanceKind::from_label(&self.tipo_manutencao) else {
      warn!(
        id = self.id,
        tipo_manutencao = %self.tipo_manutencao,
        "skipping maintenance row of unknown kind"
      );
      return None;
    };
    Some(MaintenanceEvent {
      id:                self.id,
      codigo:            self.codigo_sinapi.into_string(),
      tipo_manutencao:   kind,
      data_evento:       self.data_referencia,
      valor_anterior:    self.valor_anterior,
      valor_novo:        self.valor_novo,
      codigo_substituto: self.codigo_substituto.map(Code::into_string),
      descricao_motivo:  self.descricao_motivo,
    })
  }
}

// ─── Tracking ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TrackedRow {
  orcamento_id:   Uuid,
  tenant_id:      TenantId,
  nome_orcamento: String,
  codigo_sinapi:  Code,
}

impl TrackedRow {
  pub const SELECT: &'static str = "orcamento_id,tenant_id,nome_orcamento,codigo_sinapi";

  pub fn into_tracked(self) -> TrackedCode {
    TrackedCode {
      orcamento_id:   self.orcamento_id,
      tenant_id:      self.tenant_id,
      nome_orcamento: self.nome_orcamento,
      codigo:         self.codigo_sinapi.into_string(),
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotRow {
  codigo_sinapi: String,
  status:        String,
  verificado_em: DateTime<Utc>,
}

impl SnapshotRow {
  pub const SELECT: &'static str = "codigo_sinapi,status,verificado_em";

  pub fn into_snapshot(self) -> Result<StatusSnapshot> {
    Ok(StatusSnapshot {
      codigo:        self.codigo_sinapi,
      status:        ValidationStatus::parse(&self.status)?,
      verificado_em: self.verificado_em,
    })
  }
}

impl From<StatusSnapshot> for SnapshotRow {
  fn from(s: StatusSnapshot) -> Self {
    Self {
      codigo_sinapi: s.codigo,
      status:        s.status.as_str().to_owned(),
      verificado_em: s.verificado_em,
    }
  }
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationRow {
  id:                 Uuid,
  tenant_id:          TenantId,
  orcamento_id:       Uuid,
  tipo:               String,
  titulo:             String,
  mensagem:           String,
  #[serde(default)]
  codigos_impactados: Vec<String>,
  urgencia:           Urgencia,
  #[serde(default)]
  lida:               bool,
  created_at:         DateTime<Utc>,
}

impl NotificationRow {
  pub const SELECT: &'static str = "id,tenant_id,orcamento_id,tipo,titulo,mensagem,\
                                    codigos_impactados,urgencia,lida,created_at";
}

impl From<Notification> for NotificationRow {
  fn from(n: Notification) -> Self {
    Self {
      id:                 n.id,
      tenant_id:          n.tenant_id,
      orcamento_id:       n.orcamento_id,
      tipo:               n.tipo,
      titulo:             n.titulo,
      mensagem:           n.mensagem,
      codigos_impactados: n.codigos_impactados,
      urgencia:           n.urgencia,
      lida:               n.lida,
      created_at:         n.criada_em,
    }
  }
}

impl From<NotificationRow> for Notification {
  fn from(r: NotificationRow) -> Self {
    Self {
      id:                 r.id,
      tenant_id:          r.tenant_id,
      orcamento_id:       r.orcamento_id,
      tipo:               r.tipo,
      titulo:             r.titulo,
      mensagem:           r.mensagem,
      codigos_impactados: r.codigos_impactados,
      urgencia:           r.urgencia,
      lida:               r.lida,
      criada_em:          r.created_at,
    }
  }
}

// ─── Preferences ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferencesRow {
  tenant_id:         TenantId,
  #[serde(default)]
  email_ativo:       bool,
  #[serde(default)]
  notif_desktop:     bool,
  #[serde(default)]
  codigos_favoritos: Vec<Code>,
  #[serde(default)]
  tipos_alteracao:   Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  updated_at:        Option<DateTime<Utc>>,
}

impl PreferencesRow {
  pub const SELECT: &'static str =
    "tenant_id,email_ativo,notif_desktop,codigos_favoritos,tipos_alteracao";

  pub fn new(tenant_id: TenantId, p: NotificationPreferences, now: DateTime<Utc>) -> Self {
    Self {
      tenant_id,
      email_ativo: p.email_ativo,
      notif_desktop: p.notif_desktop,
      codigos_favoritos: p.codigos_favoritos.into_iter().map(Code::Text).collect(),
      tipos_alteracao: p.tipos_alteracao.iter().map(|k| k.as_str().to_owned()).collect(),
      updated_at: Some(now),
    }
  }

  /// Kinds that match no known label are dropped.
  pub fn into_preferences(self) -> NotificationPreferences {
    let tipos_alteracao = self
      .tipos_alteracao
      .iter()
      .filter_map(|label| {
        let kind = MaintenanceKind::from_label(label);
        if kind.is_none() {
          warn!(tenant = %self.tenant_id, label, "skipping unknown preferred change kind");
        }
        kind
      })
      .collect();
    NotificationPreferences {
      email_ativo: self.email_ativo,
      notif_desktop: self.notif_desktop,
      codigos_favoritos: self.codigos_favoritos.into_iter().map(Code::into_string).collect(),
      tipos_alteracao,
    }
  }
}
