//! A read-through cache in front of a [`PriceStore`].
//!
//! Per-code price rows and maintenance events are kept in `moka` caches with
//! a time-to-live. Anything not keyed by code (search pages, windowed event
//! queries, tallies) and the whole tracking side pass straight through.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
  sync::Arc,
  time::Duration,
};

use chrono::NaiveDate;
use moka::future::Cache;
use tracing::debug;

use crate::{
  maintenance::MaintenanceEvent,
  notify::{
    NewNotification, Notification, NotificationFilter, NotificationPreferences, StatusSnapshot,
    TrackedCode,
  },
  price::{PriceItem, PricePage, PriceQuery},
  stats::EventTally,
  store::{PriceStore, TrackingStore},
  tenant::TenantId,
};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CAPACITY: u64 = 10_000;

type RowCache<T> = Cache<String, Arc<Vec<T>>>;

/// Wraps a store with per-code caches. Cloning shares the caches.
pub struct CachedStore<S> {
  inner:  Arc<S>,
  prices: RowCache<PriceItem>,
  events: RowCache<MaintenanceEvent>,
}

impl<S> Clone for CachedStore<S> {
  fn clone(&self) -> Self {
    Self {
      inner:  self.inner.clone(),
      prices: self.prices.clone(),
      events: self.events.clone(),
    }
  }
}

impl<S> CachedStore<S> {
  pub fn new(inner: Arc<S>, ttl: Duration, capacity: u64) -> Self {
    Self {
      inner,
      prices: row_cache(ttl, capacity),
      events: row_cache(ttl, capacity),
    }
  }

  pub fn with_defaults(inner: Arc<S>) -> Self {
    Self::new(inner, DEFAULT_TTL, DEFAULT_CAPACITY)
  }

  /// The undecorated store, for jobs that must see fresh data.
  pub fn inner(&self) -> &Arc<S> { &self.inner }

  pub fn invalidate_all(&self) {
    self.prices.invalidate_all();
    self.events.invalidate_all();
  }
}

fn row_cache<T: Send + Sync + 'static>(ttl: Duration, capacity: u64) -> RowCache<T> {
  Cache::builder().max_capacity(capacity).time_to_live(ttl).build()
}

/// Serve `codigos` from `cache`, fetching all misses with one `fetch` call.
///
/// Codes absent from the fetched rows are cached as empty so repeated
/// lookups of unknown codes stay cheap until the entry expires.
async fn read_through<T, E, F, Fut>(
  cache: &RowCache<T>,
  codigos: &[String],
  codigo_of: fn(&T) -> &str,
  fetch: F,
) -> Result<Vec<T>, E>
where
  T: Clone + Send + Sync + 'static,
  F: FnOnce(Vec<String>) -> Fut,
  Fut: Future<Output = Result<Vec<T>, E>>,
{
  let mut out = Vec::new();
  let mut seen: HashSet<&str> = HashSet::new();
  let mut misses: Vec<String> = Vec::new();
  for codigo in codigos {
    if !seen.insert(codigo.as_str()) {
      continue;
    }
    match cache.get(codigo).await {
      Some(rows) => out.extend(rows.iter().cloned()),
      None => misses.push(codigo.clone()),
    }
  }

  debug!(
    hits = seen.len() - misses.len(),
    misses = misses.len(),
    "row cache lookup"
  );
  if misses.is_empty() {
    return Ok(out);
  }

  let fetched = fetch(misses.clone()).await?;
  let mut grouped: HashMap<String, Vec<T>> =
    misses.into_iter().map(|c| (c, Vec::new())).collect();
  for row in &fetched {
    if let Some(rows) = grouped.get_mut(codigo_of(row)) {
      rows.push(row.clone());
    }
  }
  for (codigo, rows) in grouped {
    cache.insert(codigo, Arc::new(rows)).await;
  }

  out.extend(fetched);
  Ok(out)
}

impl<S: PriceStore> PriceStore for CachedStore<S> {
  type Error = S::Error;

  async fn search_prices(&self, query: &PriceQuery) -> Result<PricePage, S::Error> {
    self.inner.search_prices(query).await
  }

  async fn get_prices(&self, codigos: &[String]) -> Result<Vec<PriceItem>, S::Error> {
    let fetch = move |misses: Vec<String>| async move { self.inner.get_prices(&misses).await };
    read_through(&self.prices, codigos, |i: &PriceItem| i.codigo.as_str(), fetch).await
  }

  async fn get_events(&self, codigos: &[String]) -> Result<Vec<MaintenanceEvent>, S::Error> {
    let fetch = move |misses: Vec<String>| async move { self.inner.get_events(&misses).await };
    read_through(&self.events, codigos, |e: &MaintenanceEvent| e.codigo.as_str(), fetch).await
  }

  async fn events_since(&self, since: NaiveDate) -> Result<Vec<MaintenanceEvent>, S::Error> {
    self.inner.events_since(since).await
  }

  async fn tally_events(&self, since: NaiveDate) -> Result<EventTally, S::Error> {
    self.inner.tally_events(since).await
  }
}

impl<S: TrackingStore> TrackingStore for CachedStore<S> {
  async fn tracked_codes(&self) -> Result<Vec<TrackedCode>, S::Error> {
    self.inner.tracked_codes().await
  }

  async fn snapshots(&self, codigos: &[String]) -> Result<Vec<StatusSnapshot>, S::Error> {
    self.inner.snapshots(codigos).await
  }

  async fn save_snapshots(&self, snapshots: Vec<StatusSnapshot>) -> Result<(), S::Error> {
    self.inner.save_snapshots(snapshots).await
  }

  async fn create_notifications(
    &self,
    notifications: Vec<NewNotification>,
  ) -> Result<Vec<Notification>, S::Error> {
    self.inner.create_notifications(notifications).await
  }

  async fn list_notifications(
    &self,
    tenant: TenantId,
    filter: &NotificationFilter,
  ) -> Result<Vec<Notification>, S::Error> {
    self.inner.list_notifications(tenant, filter).await
  }

  async fn save_preferences(
    &self,
    tenant: TenantId,
    preferencias: NotificationPreferences,
  ) -> Result<(), S::Error> {
    self.inner.save_preferences(tenant, preferencias).await
  }

  async fn preferences(
    &self,
    tenant: TenantId,
  ) -> Result<Option<NotificationPreferences>, S::Error> {
    self.inner.preferences(tenant).await
  }
}
