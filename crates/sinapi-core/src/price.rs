//! Canonical reference-price items and the query shape used to page through
//! them.
//!
//! A [`PriceItem`] is an immutable snapshot of a reference price for one
//! state at one competência. Several rows may share a code; the "current"
//! row for a code is chosen by [`current_item`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Source ──────────────────────────────────────────────────────────────────

/// Which SINAPI table a price item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fonte {
  DadosOficiais,
  Insumos,
  Composicoes,
}

impl Fonte {
  /// The string stored in the `fonte` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::DadosOficiais => "dados_oficiais",
      Self::Insumos => "insumos",
      Self::Composicoes => "composicoes",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "dados_oficiais" => Ok(Self::DadosOficiais),
      "insumos" => Ok(Self::Insumos),
      "composicoes" => Ok(Self::Composicoes),
      other => Err(Error::UnknownFonte(other.to_owned())),
    }
  }
}

// ─── Item ────────────────────────────────────────────────────────────────────

/// A reference price for one code, state and competência.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
  pub codigo:          String,
  pub descricao:       String,
  pub unidade:         String,
  pub preco_unitario:  Decimal,
  pub fonte:           Fonte,
  /// Two-letter state (UF) the price applies to.
  pub estado:          String,
  /// First day of the competência month.
  pub data_referencia: NaiveDate,
  pub categoria:       String,
}

/// Pick the current row for `codigo` among `items`.
///
/// The latest `data_referencia` wins; when `estado` is given, rows for that
/// state are preferred over any other state regardless of date.
pub fn current_item<'a>(
  items: &'a [PriceItem],
  codigo: &str,
  estado: Option<&str>,
) -> Option<&'a PriceItem> {
  let in_state = estado.and_then(|uf| {
    items
      .iter()
      .filter(|i| i.codigo == codigo && i.estado.eq_ignore_ascii_case(uf))
      .max_by_key(|i| i.data_referencia)
  });

  in_state.or_else(|| {
    items
      .iter()
      .filter(|i| i.codigo == codigo)
      .max_by_key(|i| i.data_referencia)
  })
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`PriceStore::search_prices`](crate::store::PriceStore::search_prices).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceQuery {
  /// Case-insensitive substring over `descricao`; also matches `codigo`
  /// exactly.
  pub texto:     Option<String>,
  pub estado:    Option<String>,
  pub fonte:     Option<Fonte>,
  pub categoria: Option<String>,
  pub limit:     usize,
  pub offset:    usize,
}

/// One page of canonical rows plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricePage {
  pub items: Vec<PriceItem>,
  pub total: u64,
}
