//! Unified search over the canonical price table, annotated with each
//! item's maintenance status.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  maintenance::{MaintenanceEvent, MaintenanceStatus, latest_by_code},
  price::{Fonte, PriceItem, PriceQuery},
  store::PriceStore,
};

/// Shortest term that triggers a lookup.
pub const MIN_TERMO: usize = 3;
pub const DEFAULT_TAMANHO_PAGINA: usize = 20;
pub const MAX_TAMANHO_PAGINA: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
  pub termo:          String,
  #[serde(default)]
  pub estado:         Option<String>,
  #[serde(default)]
  pub fonte:          Option<Fonte>,
  #[serde(default)]
  pub categoria:      Option<String>,
  /// 1-based; 0 is read as 1.
  #[serde(default)]
  pub pagina:         Option<usize>,
  #[serde(default)]
  pub tamanho_pagina: Option<usize>,
}

impl SearchFilters {
  pub fn new(termo: impl Into<String>) -> Self {
    Self { termo: termo.into(), ..Self::default() }
  }

  fn pagina(&self) -> usize { self.pagina.unwrap_or(1).max(1) }

  fn tamanho_pagina(&self) -> usize {
    self
      .tamanho_pagina
      .unwrap_or(DEFAULT_TAMANHO_PAGINA)
      .clamp(1, MAX_TAMANHO_PAGINA)
  }
}

/// A canonical row with its maintenance annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  #[serde(flatten)]
  pub item:              PriceItem,
  pub manutencao_status: MaintenanceStatus,
  pub ultimo_evento:     Option<MaintenanceEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
  pub dados:           Vec<SearchHit>,
  pub total:           u64,
  pub pagina:          usize,
  pub total_paginas:   u64,
  pub tamanho_pagina:  usize,
  /// Set when the maintenance lookup failed and every row is
  /// `INDETERMINADO`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub erro_manutencao: Option<String>,
}

/// Search canonical items and attach the status implied by each code's
/// latest maintenance event.
///
/// A failure of the canonical query is returned as `Err`. A failure of the
/// maintenance lookup degrades the page instead: rows are returned as
/// `INDETERMINADO` and the cause is reported in `erro_manutencao`.
pub async fn search<S: PriceStore>(
  store: &S,
  filters: &SearchFilters,
) -> Result<SearchPage, S::Error> {
  let pagina = filters.pagina();
  let tamanho_pagina = filters.tamanho_pagina();
  let empty = SearchPage { pagina, tamanho_pagina, ..SearchPage::default() };

  let termo = filters.termo.trim();
  if termo.chars().count() < MIN_TERMO {
    debug!(termo, "search term too short");
    return Ok(empty);
  }

  // Offsets must fit a signed 64-bit SQL integer; anything past that is
  // beyond the last page of any real table.
  let Some(offset) = (pagina - 1)
    .checked_mul(tamanho_pagina)
    .filter(|o| i64::try_from(*o).is_ok())
  else {
    debug!(pagina, tamanho_pagina, "page out of range");
    return Ok(empty);
  };

  let query = PriceQuery {
    texto: Some(termo.to_owned()),
    estado: filters.estado.clone(),
    fonte: filters.fonte,
    categoria: filters.categoria.clone(),
    limit: tamanho_pagina,
    offset,
  };
  let page = store.search_prices(&query).await?;
  let total_paginas = page.total.div_ceil(tamanho_pagina as u64);

  if page.items.is_empty() {
    return Ok(SearchPage { total: page.total, total_paginas, ..empty });
  }

  let mut codigos: Vec<String> = page.items.iter().map(|i| i.codigo.clone()).collect();
  codigos.sort();
  codigos.dedup();

  let (dados, erro_manutencao) = match store.get_events(&codigos).await {
    Ok(events) => {
      let latest = latest_by_code(&events);
      let dados = page
        .items
        .into_iter()
        .map(|item| {
          let ev = latest.get(item.codigo.as_str()).copied();
          SearchHit {
            manutencao_status: MaintenanceStatus::from_latest(ev),
            ultimo_evento: ev.cloned(),
            item,
          }
        })
        .collect();
      (dados, None)
    }
    Err(e) => {
      warn!(error = %e, codes = codigos.len(), "maintenance lookup failed during search");
      let dados = page
        .items
        .into_iter()
        .map(|item| SearchHit {
          item,
          manutencao_status: MaintenanceStatus::Indeterminado,
          ultimo_evento: None,
        })
        .collect();
      (dados, Some(e.to_string()))
    }
  };

  debug!(termo, total = page.total, pagina, "search finished");
  Ok(SearchPage {
    dados,
    total: page.total,
    pagina,
    total_paginas,
    tamanho_pagina,
    erro_manutencao,
  })
}
