//! Validation endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sinapi/codes/{codigo}/validate` | `?preco_orcado=&estado=&incluir_historico=&incluir_alternativas=` |
//! | `POST` | `/functions/v1/validate-sinapi-batch` | Body: [`BatchRequest`]; 1 to 100 codes |

use std::time::Instant;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, HeaderValue},
  response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sinapi_core::{
  store::TrackingStore,
  validation::{
    CodeCheck, ValidationOptions, ValidationResult, ValidationSummary, summarize,
    validate_batch_with, validate_with,
  },
};
use tracing::info;

use super::CodeParam;
use crate::{AppState, auth::Authenticated, error::ApiError};

/// Most codes accepted by one batch request.
pub const MAX_BATCH: usize = 100;

// ─── Single ───────────────────────────────────────────────────────────────────

fn yes() -> bool { true }

#[derive(Debug, Deserialize)]
pub struct SingleParams {
  pub preco_orcado:         Option<Decimal>,
  pub estado:               Option<String>,
  #[serde(default)]
  pub incluir_historico:    bool,
  /// On by default for single lookups.
  #[serde(default = "yes")]
  pub incluir_alternativas: bool,
}

/// `GET /sinapi/codes/{codigo}/validate[?preco_orcado=...][&estado=...]`
pub async fn single<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(codigo): Path<String>,
  Query(params): Query<SingleParams>,
) -> Result<Json<ValidationResult>, ApiError>
where
  S: TrackingStore + 'static,
{
  let options = ValidationOptions {
    incluir_historico:    params.incluir_historico,
    incluir_alternativas: params.incluir_alternativas,
  };
  let check = CodeCheck {
    codigo,
    preco_orcado: params.preco_orcado,
    estado: params.estado,
  };
  let result = validate_with(&state.store, &state.validation, &options, &check)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(result))
}

// ─── Batch ────────────────────────────────────────────────────────────────────

/// Either bare codes or full checks; `itens` wins when both are present.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchRequest {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub codigos:              Option<Vec<CodeParam>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub itens:                Option<Vec<CodeCheck>>,
  #[serde(default)]
  pub incluir_historico:    bool,
  #[serde(default)]
  pub incluir_alternativas: bool,
}

impl BatchRequest {
  fn into_checks(self) -> Result<(Vec<CodeCheck>, ValidationOptions), ApiError> {
    let checks: Vec<CodeCheck> = match (self.itens, self.codigos) {
      (Some(itens), _) => itens,
      (None, Some(codigos)) => codigos
        .into_iter()
        .map(|c| CodeCheck::new(String::from(c)))
        .collect(),
      (None, None) => {
        return Err(ApiError::BadRequest("`codigos` or `itens` is required".into()));
      }
    };
    if checks.is_empty() {
      return Err(ApiError::BadRequest("at least one code must be given".into()));
    }
    if checks.len() > MAX_BATCH {
      return Err(ApiError::BadRequest(format!(
        "at most {MAX_BATCH} codes per request, got {}",
        checks.len()
      )));
    }
    let options = ValidationOptions {
      incluir_historico:    self.incluir_historico,
      incluir_alternativas: self.incluir_alternativas,
    };
    Ok((checks, options))
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
  /// One entry per requested code, in request order.
  pub resultados:       Vec<ValidationResult>,
  pub resumo:           ValidationSummary,
  pub processado_em_ms: u64,
}

/// `POST /functions/v1/validate-sinapi-batch`
///
/// Per-code lookup failures come back as `INDETERMINADO` entries; the request
/// itself only fails on malformed input.
pub async fn batch<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: TrackingStore + 'static,
{
  let started = Instant::now();
  let (checks, options) = body.into_checks()?;

  let resultados = validate_batch_with(&state.store, &state.validation, &options, &checks).await;
  let resumo = summarize(&resultados);
  let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

  info!(
    codigos = checks.len(),
    validos = resumo.validos,
    desativados = resumo.desativados,
    alterados = resumo.alterados,
    elapsed_ms = elapsed,
    "batch validation"
  );

  let mut headers = HeaderMap::new();
  headers.insert("x-processing-time", HeaderValue::from(elapsed));
  headers.insert("x-total-codes", HeaderValue::from(checks.len()));

  Ok((
    headers,
    Json(BatchResponse { resultados, resumo, processado_em_ms: elapsed }),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numeric_codes_are_accepted() {
    let req: BatchRequest =
      serde_json::from_str(r#"{"codigos": [1379, "74209/001"]}"#).unwrap();
    let (checks, options) = req.into_checks().unwrap();
    assert_eq!(checks[0].codigo, "1379");
    assert_eq!(options, ValidationOptions::default());
    assert_eq!(checks[1].codigo, "74209/001");
  }

  #[test]
  fn itens_take_precedence() {
    let req: BatchRequest = serde_json::from_str(
      r#"{"codigos": ["A"], "itens": [{"codigo": "B", "preco_orcado": "10.5"}]}"#,
    )
    .unwrap();
    let (checks, _) = req.into_checks().unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].codigo, "B");
    assert_eq!(checks[0].preco_orcado, Some(Decimal::new(105, 1)));
  }

  #[test]
  fn rejects_empty_missing_and_oversized() {
    assert!(BatchRequest::default().into_checks().is_err());
    assert!(
      BatchRequest { codigos: Some(vec![]), ..Default::default() }
        .into_checks()
        .is_err()
    );
    let many = (0..=MAX_BATCH as i64).map(CodeParam::Number).collect();
    assert!(
      BatchRequest { codigos: Some(many), ..Default::default() }
        .into_checks()
        .is_err()
    );
  }

  #[test]
  fn batch_options_sit_beside_the_codes() {
    let req: BatchRequest = serde_json::from_str(
      r#"{"codigos": ["A"], "incluir_historico": true, "incluir_alternativas": true}"#,
    )
    .unwrap();
    let (_, options) = req.into_checks().unwrap();
    assert!(options.incluir_historico);
    assert!(options.incluir_alternativas);
  }
}
