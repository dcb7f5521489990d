//! Code validation: is a SINAPI code referenced by a budget still usable?
//!
//! [`classify`] is the pure decision over a code's current item and latest
//! maintenance event. [`validate`] and [`validate_batch`] do the lookups;
//! their `_with` variants also take [`ValidationOptions`] for the optional
//! history and alternative suggestions.

use std::collections::HashMap;

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error,
  history::sort_timeline,
  maintenance::{MaintenanceEvent, MaintenanceKind, MaintenanceStatus, latest_event},
  price::{PriceItem, current_item},
  search::{MAX_TAMANHO_PAGINA, SearchFilters, search},
  store::PriceStore,
};

/// Days back from today within which the latest event counts as recent.
pub const DEFAULT_JANELA_RECENTE_DIAS: u32 = 30;
/// Most alternatives suggested for one code.
pub const MAX_ALTERNATIVAS: usize = 3;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Outcome of validating one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
  Valido,
  Desativado,
  Alterado,
  NaoEncontrado,
  /// The lookup for this code failed; see [`ValidationResult::erro`].
  Indeterminado,
}

impl ValidationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Valido => "VALIDO",
      Self::Desativado => "DESATIVADO",
      Self::Alterado => "ALTERADO",
      Self::NaoEncontrado => "NAO_ENCONTRADO",
      Self::Indeterminado => "INDETERMINADO",
    }
  }

  pub fn parse(s: &str) -> Result<Self, Error> {
    match s {
      "VALIDO" => Ok(Self::Valido),
      "DESATIVADO" => Ok(Self::Desativado),
      "ALTERADO" => Ok(Self::Alterado),
      "NAO_ENCONTRADO" => Ok(Self::NaoEncontrado),
      "INDETERMINADO" => Ok(Self::Indeterminado),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// Derived, never stored. Computed fresh on every validation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
  pub codigo:              String,
  pub status:              ValidationStatus,
  pub item_atual:          Option<PriceItem>,
  pub ultimo_evento:       Option<MaintenanceEvent>,
  /// Price variation in percent (e.g. `20.00` for +20%).
  pub variacao_percentual: Option<Decimal>,
  pub codigo_alternativo:  Option<String>,
  /// The latest event falls inside the recent window.
  #[serde(default)]
  pub alteracoes_recentes: bool,
  /// Usable codes with a similar description, offered when the code was
  /// deactivated without a substitute.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub alternativas_sugeridas: Vec<String>,
  /// Every event of the code, oldest first, when asked for.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub historico:           Option<Vec<MaintenanceEvent>>,
  /// Lookup failure message when `status` is `INDETERMINADO`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub erro:                Option<String>,
}

impl ValidationResult {
  /// A result with `status` and nothing else filled in.
  pub fn bare(codigo: &str, status: ValidationStatus) -> Self {
    Self {
      codigo: codigo.to_owned(),
      status,
      item_atual: None,
      ultimo_evento: None,
      variacao_percentual: None,
      codigo_alternativo: None,
      alteracoes_recentes: false,
      alternativas_sugeridas: Vec::new(),
      historico: None,
      erro: None,
    }
  }

  fn wants_alternatives(&self) -> bool {
    self.status == ValidationStatus::Desativado && self.codigo_alternativo.is_none()
  }

  /// A result reporting that the lookup for `codigo` failed.
  pub fn indeterminate(codigo: &str, erro: impl Into<String>) -> Self {
    Self {
      erro: Some(erro.into()),
      ..Self::bare(codigo, ValidationStatus::Indeterminado)
    }
  }
}

/// One code to validate, as referenced by a budget line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeCheck {
  pub codigo:       String,
  /// Unit price the budget was built with.
  #[serde(default)]
  pub preco_orcado: Option<Decimal>,
  /// Preferred state for the current item.
  #[serde(default)]
  pub estado:       Option<String>,
}

impl CodeCheck {
  pub fn new(codigo: impl Into<String>) -> Self {
    Self { codigo: codigo.into(), ..Self::default() }
  }
}

/// Server-wide validation tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
  /// Relative variation above which an `ALTERACAO` flags the code, as a
  /// fraction (`0.10` = 10%).
  pub limiar_variacao:     Decimal,
  /// Width of the window behind `alteracoes_recentes`, in days.
  pub janela_recente_dias: u32,
}

impl Default for ValidationConfig {
  fn default() -> Self {
    Self {
      limiar_variacao:     Decimal::new(10, 2),
      janela_recente_dias: DEFAULT_JANELA_RECENTE_DIAS,
    }
  }
}

/// Per-request extras.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
  /// Attach the code's whole timeline as `historico`.
  #[serde(default)]
  pub incluir_historico:    bool,
  /// Search for `alternativas_sugeridas` when a deactivated code has no
  /// substitute.
  #[serde(default)]
  pub incluir_alternativas: bool,
}

/// Per-status counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
  pub total:           usize,
  pub validos:         usize,
  pub desativados:     usize,
  pub alterados:       usize,
  pub nao_encontrados: usize,
  pub indeterminados:  usize,
}

pub fn summarize(results: &[ValidationResult]) -> ValidationSummary {
  let mut s = ValidationSummary { total: results.len(), ..Default::default() };
  for r in results {
    match r.status {
      ValidationStatus::Valido => s.validos += 1,
      ValidationStatus::Desativado => s.desativados += 1,
      ValidationStatus::Alterado => s.alterados += 1,
      ValidationStatus::NaoEncontrado => s.nao_encontrados += 1,
      ValidationStatus::Indeterminado => s.indeterminados += 1,
    }
  }
  s
}

// ─── Pure classification ─────────────────────────────────────────────────────

/// `|valor_novo - baseline| / valor_anterior`, `None` when not computable.
fn variation_ratio(
  event: &MaintenanceEvent,
  preco_orcado: Option<Decimal>,
) -> Option<Decimal> {
  let anterior = event.valor_anterior.filter(|v| !v.is_zero())?;
  let novo = event.valor_novo?;
  let baseline = preco_orcado.unwrap_or(anterior);
  Some((novo - baseline).abs() / anterior)
}

fn as_percent(ratio: Decimal) -> Decimal {
  (ratio * Decimal::ONE_HUNDRED)
    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Decide the status of `check` from its current item and its latest event.
pub fn classify(
  check: &CodeCheck,
  item_atual: Option<&PriceItem>,
  latest: Option<&MaintenanceEvent>,
  config: &ValidationConfig,
) -> ValidationResult {
  let mut result = ValidationResult {
    item_atual: item_atual.cloned(),
    ultimo_evento: latest.cloned(),
    ..ValidationResult::bare(&check.codigo, ValidationStatus::Valido)
  };

  let Some(event) = latest else {
    if item_atual.is_none() {
      result.status = ValidationStatus::NaoEncontrado;
    }
    return result;
  };

  match event.tipo_manutencao {
    // Deactivated codes usually leave the canonical table, so these two do
    // not require a current item.
    MaintenanceKind::Desativacao | MaintenanceKind::Substituicao => {
      result.status = ValidationStatus::Desativado;
      result.codigo_alternativo = event.codigo_substituto.clone();
    }
    _ if item_atual.is_none() => {
      result.status = ValidationStatus::NaoEncontrado;
    }
    MaintenanceKind::Alteracao => {
      match variation_ratio(event, check.preco_orcado) {
        Some(ratio) => {
          result.variacao_percentual = Some(as_percent(ratio));
          if ratio > config.limiar_variacao {
            result.status = ValidationStatus::Alterado;
          }
        }
        None => result.status = ValidationStatus::Alterado,
      }
    }
    MaintenanceKind::Inclusao => {}
  }

  result
}

/// Whether `latest` happened within `janela_dias` days before `hoje`.
pub fn is_recent(latest: Option<&MaintenanceEvent>, hoje: NaiveDate, janela_dias: u32) -> bool {
  let since = hoje
    .checked_sub_days(Days::new(u64::from(janela_dias)))
    .unwrap_or(NaiveDate::MIN);
  latest.is_some_and(|e| e.data_evento >= since)
}

/// [`classify`] plus the recent-change flag and the requested timeline.
fn evaluate(
  check: &CodeCheck,
  items: &[PriceItem],
  events: &[MaintenanceEvent],
  config: &ValidationConfig,
  options: &ValidationOptions,
  hoje: NaiveDate,
) -> ValidationResult {
  let latest = latest_event(events);
  let mut result = classify(
    check,
    current_item(items, &check.codigo, check.estado.as_deref()),
    latest,
    config,
  );
  result.alteracoes_recentes = is_recent(latest, hoje, config.janela_recente_dias);
  if options.incluir_historico {
    let mut timeline = events.to_vec();
    sort_timeline(&mut timeline);
    result.historico = Some(timeline);
  }
  result
}

/// Search term for alternatives: the first three words of the description.
fn alternative_term(descricao: &str) -> String {
  descricao.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// Up to [`MAX_ALTERNATIVAS`] active or altered codes other than `codigo`
/// whose description shares the first words of `descricao`.
///
/// Suggestions are best effort: a failed search yields none.
pub async fn suggest_alternatives<S: PriceStore>(
  store: &S,
  codigo: &str,
  descricao: &str,
) -> Vec<String> {
  let filters = SearchFilters {
    tamanho_pagina: Some(MAX_TAMANHO_PAGINA),
    ..SearchFilters::new(alternative_term(descricao))
  };
  let page = match search(store, &filters).await {
    Ok(page) => page,
    Err(e) => {
      warn!(codigo, error = %e, "alternative search failed");
      return Vec::new();
    }
  };

  let mut out: Vec<String> = Vec::new();
  for hit in page.dados {
    let usable = matches!(
      hit.manutencao_status,
      MaintenanceStatus::Ativo | MaintenanceStatus::Alterado
    );
    if usable && hit.item.codigo != codigo && !out.contains(&hit.item.codigo) {
      out.push(hit.item.codigo);
      if out.len() == MAX_ALTERNATIVAS {
        break;
      }
    }
  }
  debug!(codigo, count = out.len(), "suggested alternatives");
  out
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

/// Validate a single code.
pub async fn validate<S: PriceStore>(
  store: &S,
  config: &ValidationConfig,
  check: &CodeCheck,
) -> Result<ValidationResult, S::Error> {
  validate_with(store, config, &ValidationOptions::default(), check).await
}

/// [`validate`] with per-request extras.
pub async fn validate_with<S: PriceStore>(
  store: &S,
  config: &ValidationConfig,
  options: &ValidationOptions,
  check: &CodeCheck,
) -> Result<ValidationResult, S::Error> {
  let codigo = check.codigo.trim();
  if codigo.is_empty() {
    return Ok(ValidationResult::bare(codigo, ValidationStatus::NaoEncontrado));
  }

  let codes = [codigo.to_owned()];
  let items = store.get_prices(&codes).await?;
  let events = store.get_events(&codes).await?;

  let check = CodeCheck { codigo: codigo.to_owned(), ..check.clone() };
  let mut result = evaluate(&check, &items, &events, config, options, Utc::now().date_naive());

  if options.incluir_alternativas && result.wants_alternatives() {
    if let Some(descricao) = result.item_atual.as_ref().map(|i| i.descricao.clone()) {
      result.alternativas_sugeridas = suggest_alternatives(store, codigo, &descricao).await;
    }
  }

  debug!(codigo, status = result.status.as_str(), "validated code");
  Ok(result)
}

/// Rows fetched for one distinct code, or the error that prevented it.
type Lookup = Result<(Vec<PriceItem>, Vec<MaintenanceEvent>), String>;

/// Fetch prices and events for every code in `distinct`.
///
/// Tries one bulk call for each table first. When a bulk call fails, each
/// code is fetched on its own so a single bad code cannot sink the batch.
async fn lookup_all<S: PriceStore>(
  store: &S,
  distinct: &[String],
) -> HashMap<String, Lookup> {
  let bulk = async {
    let items = store.get_prices(distinct).await?;
    let events = store.get_events(distinct).await?;
    Ok::<_, S::Error>((items, events))
  };

  match bulk.await {
    Ok((items, events)) => {
      let mut by_code: HashMap<String, Lookup> = distinct
        .iter()
        .map(|c| (c.clone(), Ok((Vec::new(), Vec::new()))))
        .collect();
      for item in items {
        if let Some(Ok((its, _))) = by_code.get_mut(&item.codigo) {
          its.push(item);
        }
      }
      for ev in events {
        if let Some(Ok((_, evs))) = by_code.get_mut(&ev.codigo) {
          evs.push(ev);
        }
      }
      by_code
    }
    Err(e) => {
      warn!(error = %e, codes = distinct.len(), "bulk lookup failed, retrying per code");
      let mut by_code = HashMap::with_capacity(distinct.len());
      for codigo in distinct {
        let one = std::slice::from_ref(codigo);
        let lookup = async {
          let items = store.get_prices(one).await?;
          let events = store.get_events(one).await?;
          Ok::<_, S::Error>((items, events))
        }
        .await
        .map_err(|e| e.to_string());
        by_code.insert(codigo.clone(), lookup);
      }
      by_code
    }
  }
}

/// Validate many codes at once.
///
/// Codes are trimmed and deduplicated before querying. The output has the
/// same length and order as `checks`; a lookup failure only affects the
/// codes it concerns, which come back as `INDETERMINADO`.
pub async fn validate_batch<S: PriceStore>(
  store: &S,
  config: &ValidationConfig,
  checks: &[CodeCheck],
) -> Vec<ValidationResult> {
  validate_batch_with(store, config, &ValidationOptions::default(), checks).await
}

/// [`validate_batch`] with per-request extras. Alternatives are searched
/// once per distinct code.
pub async fn validate_batch_with<S: PriceStore>(
  store: &S,
  config: &ValidationConfig,
  options: &ValidationOptions,
  checks: &[CodeCheck],
) -> Vec<ValidationResult> {
  let mut distinct: Vec<String> = Vec::new();
  for check in checks {
    let codigo = check.codigo.trim();
    if !codigo.is_empty() && !distinct.iter().any(|c| c == codigo) {
      distinct.push(codigo.to_owned());
    }
  }

  let lookups = if distinct.is_empty() {
    HashMap::new()
  } else {
    lookup_all(store, &distinct).await
  };

  let hoje = Utc::now().date_naive();
  let mut results: Vec<ValidationResult> = checks
    .iter()
    .map(|check| {
      let codigo = check.codigo.trim();
      match lookups.get(codigo) {
        None => ValidationResult::bare(codigo, ValidationStatus::NaoEncontrado),
        Some(Err(e)) => ValidationResult::indeterminate(codigo, e.clone()),
        Some(Ok((items, events))) => {
          let check = CodeCheck { codigo: codigo.to_owned(), ..check.clone() };
          evaluate(&check, items, events, config, options, hoje)
        }
      }
    })
    .collect();

  if options.incluir_alternativas {
    let mut suggested: HashMap<String, Vec<String>> = HashMap::new();
    for result in results.iter_mut().filter(|r| r.wants_alternatives()) {
      let Some(descricao) = result.item_atual.as_ref().map(|i| i.descricao.clone()) else {
        continue;
      };
      if !suggested.contains_key(&result.codigo) {
        let found = suggest_alternatives(store, &result.codigo, &descricao).await;
        suggested.insert(result.codigo.clone(), found);
      }
      if let Some(found) = suggested.get(&result.codigo) {
        result.alternativas_sugeridas = found.clone();
      }
    }
  }

  let summary = summarize(&results);
  info!(
    total = summary.total,
    distinct = distinct.len(),
    desativados = summary.desativados,
    alterados = summary.alterados,
    nao_encontrados = summary.nao_encontrados,
    indeterminados = summary.indeterminados,
    "batch validation finished"
  );
  results
}
