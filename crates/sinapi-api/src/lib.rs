//! JSON HTTP surface for SINAPI reconciliation.
//!
//! Exposes an axum [`Router`] backed by any [`TrackingStore`]. Read
//! endpoints go through a [`CachedStore`]; notification jobs use the store
//! underneath it so they always see fresh data.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET`  | `/health` | `handlers::health` |
//! | `GET`  | `/sinapi/search` | `handlers::search` |
//! | `GET`  | `/sinapi/codes/{codigo}/validate` | `handlers::validate::single` |
//! | `POST` | `/functions/v1/validate-sinapi-batch` | `handlers::validate::batch` |
//! | `GET`  | `/sinapi/codes/{codigo}/history` | `handlers::history` |
//! | `GET`  | `/sinapi/stats` | `handlers::stats` |
//! | `POST` | `/functions/v1/sinapi-notifications` | `handlers::notifications` |
//!
//! Codes containing `/` must be percent-encoded in the path
//! (`74209%2F001`).

pub mod auth;
pub mod error;
pub mod etag;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sinapi_core::{cache::CachedStore, store::TrackingStore, validation::ValidationConfig};
use sinapi_store_rest::RestConfig;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Where the price tables live.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
  /// Embedded database file.
  Sqlite { path: PathBuf },
  /// PostgREST endpoint of the managed database.
  Rest(RestConfig),
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_limiar_variacao() -> Decimal { ValidationConfig::default().limiar_variacao }

fn default_janela_recente_dias() -> u32 { ValidationConfig::default().janela_recente_dias }

fn default_cache_ttl_secs() -> u64 { sinapi_core::cache::DEFAULT_TTL.as_secs() }

fn default_cache_capacity() -> u64 { sinapi_core::cache::DEFAULT_CAPACITY }

/// Runtime server configuration, deserialised from `config.toml` and
/// `SINAPI_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  pub backend:             BackendConfig,
  pub auth_username:       String,
  pub auth_password_hash:  String,
  /// Fraction above which an `ALTERACAO` flags a code (`0.10` = 10%).
  #[serde(default = "default_limiar_variacao")]
  pub limiar_variacao:     Decimal,
  /// Days behind `alteracoes_recentes`.
  #[serde(default = "default_janela_recente_dias")]
  pub janela_recente_dias: u32,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs:      u64,
  #[serde(default = "default_cache_capacity")]
  pub cache_capacity:      u64,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:      CachedStore<S>,
  pub validation: ValidationConfig,
  pub auth:       Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      validation: self.validation,
      auth:       self.auth.clone(),
    }
  }
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
    Self {
      store:      CachedStore::new(
        store,
        Duration::from_secs(config.cache_ttl_secs),
        config.cache_capacity,
      ),
      validation: ValidationConfig {
        limiar_variacao:     config.limiar_variacao,
        janela_recente_dias: config.janela_recente_dias,
      },
      auth:       Arc::new(AuthConfig {
        username:      config.auth_username.clone(),
        password_hash: config.auth_password_hash.clone(),
      }),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: TrackingStore + 'static,
{
  Router::new()
    .route("/health", get(handlers::health))
    .route("/sinapi/search", get(handlers::search::<S>))
    .route("/sinapi/stats", get(handlers::stats::<S>))
    .route("/sinapi/codes/{codigo}/validate", get(handlers::validate::single::<S>))
    .route("/sinapi/codes/{codigo}/history", get(handlers::history::<S>))
    .route("/functions/v1/validate-sinapi-batch", post(handlers::validate::batch::<S>))
    .route("/functions/v1/sinapi-notifications", post(handlers::notifications::<S>))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
