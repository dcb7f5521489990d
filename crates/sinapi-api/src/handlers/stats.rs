//! Handler for `GET /sinapi/stats`.

use axum::{Json, extract::State};
use chrono::Utc;
use sinapi_core::{
  stats::{MaintenanceStats, maintenance_stats},
  store::TrackingStore,
};

use crate::{AppState, auth::Authenticated, error::ApiError};

pub async fn stats<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
) -> Result<Json<MaintenanceStats>, ApiError>
where
  S: TrackingStore + 'static,
{
  let stats = maintenance_stats(&state.store, Utc::now().date_naive())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(stats))
}
