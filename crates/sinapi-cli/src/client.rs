//! Async HTTP client wrapping the SINAPI JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Client, RequestBuilder, Response, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sinapi_core::{
  maintenance::MaintenanceEvent,
  notify::{BudgetImpact, Notification, NotificationPreferences, SweepReport},
  search::{SearchFilters, SearchPage},
  stats::MaintenanceStats,
  validation::{CodeCheck, ValidationResult, ValidationSummary},
};
use tracing::debug;

/// Connection settings for the SINAPI API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
  /// Sent as `x-tenant-id` on tenant-scoped calls.
  pub tenant:   Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResult {
  pub resultados:       Vec<ValidationResult>,
  pub resumo:           ValidationSummary,
  pub processado_em_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResult {
  pub codigo:  String,
  pub eventos: Vec<MaintenanceEvent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotificationDados {
  #[serde(default)]
  pub varredura:             Option<SweepReport>,
  #[serde(default)]
  pub impactos_encontrados:  Option<Vec<BudgetImpact>>,
  #[serde(default)]
  pub notificacoes_enviadas: Option<usize>,
  #[serde(default)]
  pub notificacoes:          Option<Vec<Notification>>,
  #[serde(default)]
  pub preferencias:          Option<NotificationPreferences>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResult {
  pub tipo_resposta: String,
  #[serde(default)]
  pub dados:         NotificationDados,
}

/// Async HTTP client for the SINAPI JSON API.
///
/// Cloning shares the inner [`reqwest::Client`].
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base:   Url,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    let base = Url::parse(&config.base_url)
      .with_context(|| format!("invalid server URL {:?}", config.base_url))?;
    Ok(Self { client, base, config })
  }

  /// `base` joined with `segments`, each percent-encoded (so `74209/001`
  /// stays one segment).
  pub fn url(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| anyhow!("server URL cannot take a path: {}", self.base))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  fn tenant(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.tenant {
      Some(t) => req.header("x-tenant-id", t),
      None => req,
    }
  }

  async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    let resp = self
      .auth(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    decode(resp, what).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `GET /sinapi/search`
  pub async fn search(&self, filters: &SearchFilters) -> Result<SearchPage> {
    let url = self.url(&["sinapi", "search"])?;
    self
      .send(self.client.get(url).query(filters), "GET /sinapi/search")
      .await
  }

  /// `GET /sinapi/codes/{codigo}/validate`
  pub async fn validate(
    &self,
    codigo: &str,
    preco_orcado: Option<Decimal>,
    estado: Option<&str>,
    alternativas: bool,
  ) -> Result<ValidationResult> {
    let url = self.url(&["sinapi", "codes", codigo, "validate"])?;
    let mut query: Vec<(&str, String)> =
      vec![("incluir_alternativas", alternativas.to_string())];
    if let Some(p) = preco_orcado {
      query.push(("preco_orcado", p.to_string()));
    }
    if let Some(e) = estado {
      query.push(("estado", e.to_owned()));
    }
    self
      .send(self.client.get(url).query(&query), "GET /sinapi/codes/{codigo}/validate")
      .await
  }

  /// `POST /functions/v1/validate-sinapi-batch`
  pub async fn validate_batch(
    &self,
    itens: &[CodeCheck],
    alternativas: bool,
  ) -> Result<BatchResult> {
    let url = self.url(&["functions", "v1", "validate-sinapi-batch"])?;
    let body = serde_json::json!({ "itens": itens, "incluir_alternativas": alternativas });
    self
      .send(self.client.post(url).json(&body), "POST validate-sinapi-batch")
      .await
  }

  /// `GET /sinapi/codes/{codigo}/history`
  pub async fn history(&self, codigo: &str) -> Result<HistoryResult> {
    let url = self.url(&["sinapi", "codes", codigo, "history"])?;
    self
      .send(self.client.get(url), "GET /sinapi/codes/{codigo}/history")
      .await
  }

  /// `GET /sinapi/stats`
  pub async fn stats(&self) -> Result<MaintenanceStats> {
    let url = self.url(&["sinapi", "stats"])?;
    self.send(self.client.get(url), "GET /sinapi/stats").await
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  /// `POST /functions/v1/sinapi-notifications` with a `{tipo, dados}` body.
  pub async fn notifications(&self, body: &Value) -> Result<NotificationResult> {
    let url = self.url(&["functions", "v1", "sinapi-notifications"])?;
    debug!(%body, "notification request");
    self
      .send(self.tenant(self.client.post(url).json(body)), "POST sinapi-notifications")
      .await
  }
}

/// Decode a success body, or turn the API's `{"error": ...}` into an error.
async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
  let status = resp.status();
  if !status.is_success() {
    let message = resp
      .json::<Value>()
      .await
      .ok()
      .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
      .unwrap_or_default();
    bail!("{what} → {status} {message}");
  }
  resp
    .json()
    .await
    .with_context(|| format!("deserialising {what} response"))
}
