//! Handler for `GET /sinapi/codes/{codigo}/history`.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sinapi_core::{maintenance::MaintenanceEvent, store::{PriceStore, TrackingStore}};

use crate::{
  AppState,
  auth::Authenticated,
  error::ApiError,
  etag::{history_etag, if_none_match},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
  pub codigo:  String,
  /// Oldest first.
  pub eventos: Vec<MaintenanceEvent>,
}

/// Timeline of one code, with an ETag; `If-None-Match` yields 304.
///
/// A code with no events is 404 only when it is also absent from the price
/// table; a known code with a clean record has an empty timeline.
pub async fn history<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(codigo): Path<String>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: TrackingStore + 'static,
{
  let codigo = codigo.trim().to_owned();
  let eventos = sinapi_core::history::history(&state.store, &codigo)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  if eventos.is_empty() {
    let known = state
      .store
      .get_prices(std::slice::from_ref(&codigo))
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?;
    if known.is_empty() {
      return Err(ApiError::NotFound(format!("unknown SINAPI code {codigo:?}")));
    }
  }

  let etag = history_etag(&eventos);
  let not_modified = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| if_none_match(v, &etag));

  if not_modified {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }
  Ok(
    (
      [(header::ETAG, etag)],
      Json(HistoryResponse { codigo, eventos }),
    )
      .into_response(),
  )
}
