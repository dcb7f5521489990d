//! Handler for `GET /sinapi/search`.
//!
//! Query params map directly to [`SearchFilters`]:
//! `termo` (required), `estado`, `fonte`, `categoria`, `pagina`,
//! `tamanho_pagina`.

use axum::{
  Json,
  extract::{Query, State},
};
use sinapi_core::{
  search::{SearchFilters, SearchPage},
  store::TrackingStore,
};

use crate::{AppState, auth::Authenticated, error::ApiError};

pub async fn search<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(filters): Query<SearchFilters>,
) -> Result<Json<SearchPage>, ApiError>
where
  S: TrackingStore + 'static,
{
  let page = sinapi_core::search::search(&state.store, &filters)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(page))
}
