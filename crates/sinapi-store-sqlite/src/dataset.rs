//! JSON dataset format accepted by [`SqliteStore::import_dataset`].
//!
//! ```json
//! {
//!   "precos":      [{ "codigo": "1379", "descricao": "...", ... }],
//!   "manutencoes": [{ "codigo": "1379", "tipo_manutencao": "ALTERACAO", ... }],
//!   "orcamentos":  [{ "orcamento_id": "...", "tenant_id": "...",
//!                     "nome_orcamento": "...", "codigos": ["1379"] }]
//! }
//! ```
//!
//! [`SqliteStore::import_dataset`]: crate::SqliteStore::import_dataset

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sinapi_core::{
  maintenance::MaintenanceKind, notify::TrackedCode, price::PriceItem, tenant::TenantId,
};
use uuid::Uuid;

use crate::Result;

/// A maintenance event before the store assigns its `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
  pub codigo:            String,
  pub tipo_manutencao:   MaintenanceKind,
  pub data_evento:       NaiveDate,
  #[serde(default)]
  pub valor_anterior:    Option<Decimal>,
  #[serde(default)]
  pub valor_novo:        Option<Decimal>,
  #[serde(default)]
  pub codigo_substituto: Option<String>,
  #[serde(default)]
  pub descricao_motivo:  Option<String>,
}

impl NewEvent {
  pub fn new(codigo: impl Into<String>, tipo: MaintenanceKind, data_evento: NaiveDate) -> Self {
    Self {
      codigo: codigo.into(),
      tipo_manutencao: tipo,
      data_evento,
      valor_anterior: None,
      valor_novo: None,
      codigo_substituto: None,
      descricao_motivo: None,
    }
  }
}

/// An active budget and the codes it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
  pub orcamento_id:   Uuid,
  pub tenant_id:      TenantId,
  pub nome_orcamento: String,
  pub codigos:        Vec<String>,
}

impl BudgetRecord {
  pub fn tracked_codes(&self) -> impl Iterator<Item = TrackedCode> + '_ {
    self.codigos.iter().map(|codigo| TrackedCode {
      orcamento_id:   self.orcamento_id,
      tenant_id:      self.tenant_id,
      nome_orcamento: self.nome_orcamento.clone(),
      codigo:         codigo.trim().to_owned(),
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  #[serde(default)]
  pub precos:      Vec<PriceItem>,
  #[serde(default)]
  pub manutencoes: Vec<NewEvent>,
  #[serde(default)]
  pub orcamentos:  Vec<BudgetRecord>,
}

impl Dataset {
  pub fn from_json(s: &str) -> Result<Self> { Ok(serde_json::from_str(s)?) }

  pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
    let raw = tokio::fs::read_to_string(path).await?;
    Self::from_json(&raw)
  }
}

/// Row counts written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
  pub precos:             usize,
  pub manutencoes:        usize,
  pub codigos_rastreados: usize,
}
