//! Thin PostgREST client: authentication headers, retries and filter
//! encoding.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{Error, Result};

fn default_max_retries() -> u32 { 3 }

fn default_timeout_secs() -> u64 { 10 }

/// Connection settings for the PostgREST endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestConfig {
  /// Project URL, e.g. `https://xyz.supabase.co`. `/rest/v1` is appended.
  pub url:          String,
  pub api_key:      String,
  #[serde(default = "default_max_retries")]
  pub max_retries:  u32,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl RestConfig {
  pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      url:          url.into(),
      api_key:      api_key.into(),
      max_retries:  default_max_retries(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

/// Which failures a request may be retried after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
  /// Reads and merging upserts: connect errors, timeouts, 429 and 5xx.
  Transient,
  /// Plain inserts: only a failed connect. A 5xx or a timeout may come after
  /// the rows were committed.
  ConnectOnly,
}

/// Query string pairs of one request.
pub type Query = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct PostgrestClient {
  http:         Client,
  base:         String,
  api_key:      String,
  max_retries:  u32,
  base_backoff: Duration,
}

impl PostgrestClient {
  pub fn new(config: &RestConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      http,
      base: format!("{}/rest/v1", config.url.trim_end_matches('/')),
      api_key: config.api_key.clone(),
      max_retries: config.max_retries,
      base_backoff: Duration::from_millis(200),
    })
  }

  #[cfg(test)]
  pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
    self.base_backoff = backoff;
    self
  }

  fn request(&self, method: Method, table: &str) -> RequestBuilder {
    self
      .http
      .request(method, format!("{}/{table}", self.base))
      .header("apikey", &self.api_key)
      .bearer_auth(&self.api_key)
  }

  fn backoff(&self, attempt: u32) -> Duration {
    self.base_backoff * 2u32.saturating_pow(attempt.min(10))
  }

  /// Send the request produced by `build`, retrying failures allowed by
  /// `retry`.
  ///
  /// `build` is called once per attempt since a sent request cannot be
  /// reused. Non-success responses that are not retried become
  /// [`Error::Status`].
  async fn send(
    &self,
    table: &str,
    retry: Retry,
    build: impl Fn() -> RequestBuilder,
  ) -> Result<Response> {
    let mut attempt = 0;
    loop {
      let left = attempt < self.max_retries;
      match build().send().await {
        Ok(resp) if resp.status().is_success() => return Ok(resp),
        Ok(resp) => {
          let status = resp.status();
          let transient =
            status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
          if transient && retry == Retry::Transient && left {
            warn!(table, %status, attempt, "transient PostgREST response, retrying");
          } else {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
              table: table.to_owned(),
              status: status.as_u16(),
              body,
            });
          }
        }
        Err(e) if left && (e.is_connect() || (e.is_timeout() && retry == Retry::Transient)) => {
          warn!(table, error = %e, attempt, "PostgREST unreachable, retrying");
        }
        Err(e) => return Err(e.into()),
      }
      tokio::time::sleep(self.backoff(attempt)).await;
      attempt += 1;
    }
  }

  /// `GET /{table}?{query}`
  pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>> {
    debug!(table, ?query, "select");
    let resp = self
      .send(table, Retry::Transient, || self.request(Method::GET, table).query(query))
      .await?;
    Ok(resp.json().await?)
  }

  /// Like [`select`](Self::select) but also returns the exact total from
  /// `Content-Range`.
  pub async fn select_counted<T: DeserializeOwned>(
    &self,
    table: &str,
    query: &Query,
  ) -> Result<(Vec<T>, Option<u64>)> {
    debug!(table, ?query, "select with count");
    let resp = self
      .send(table, Retry::Transient, || {
        self
          .request(Method::GET, table)
          .query(query)
          .header("Prefer", "count=exact")
      })
      .await?;
    let total = content_range_total(&resp);
    Ok((resp.json().await?, total))
  }

  /// Number of rows matching `query`, without fetching them.
  pub async fn count(&self, table: &str, query: &Query) -> Result<u64> {
    let resp = self
      .send(table, Retry::Transient, || {
        self
          .request(Method::HEAD, table)
          .query(query)
          .header("Prefer", "count=exact")
      })
      .await?;
    Ok(content_range_total(&resp).unwrap_or(0))
  }

  /// Insert `rows`, merging on `on_conflict`.
  pub async fn upsert<B: Serialize + ?Sized>(
    &self,
    table: &str,
    on_conflict: &str,
    rows: &B,
  ) -> Result<()> {
    self
      .send(table, Retry::Transient, || {
        self
          .request(Method::POST, table)
          .query(&[("on_conflict", on_conflict)])
          .header("Prefer", "resolution=merge-duplicates,return=minimal")
          .json(rows)
      })
      .await?;
    Ok(())
  }

  /// Insert `rows` and return the stored representation. Only retried when
  /// the connection could not be made.
  pub async fn insert<B, T>(&self, table: &str, rows: &B) -> Result<Vec<T>>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let resp = self
      .send(table, Retry::ConnectOnly, || {
        self
          .request(Method::POST, table)
          .header("Prefer", "return=representation")
          .json(rows)
      })
      .await?;
    Ok(resp.json().await?)
  }
}

fn content_range_total(resp: &Response) -> Option<u64> {
  resp
    .headers()
    .get("content-range")
    .and_then(|v| v.to_str().ok())
    .and_then(parse_content_range)
}

/// Total from a `Content-Range` value such as `0-19/523` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
  value.rsplit_once('/')?.1.trim().parse().ok()
}

// ─── Filter encoding ─────────────────────────────────────────────────────────

/// A value quoted for use inside `in.(…)` and `or=(…)`.
pub fn quote(value: &str) -> String {
  let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
  format!("\"{escaped}\"")
}

/// `in.("a","b")`
pub fn in_list(values: &[String]) -> String {
  let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
  format!("in.({})", quoted.join(","))
}
