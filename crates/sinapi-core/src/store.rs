//! The `PriceStore` / `TrackingStore` traits.
//!
//! The traits are implemented by storage backends (`sinapi-store-sqlite`,
//! `sinapi-store-rest`) and by [`CachedStore`](crate::cache::CachedStore).
//! Services in this crate are generic over them and never name a concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;

use crate::{
  maintenance::MaintenanceEvent,
  notify::{
    NewNotification, Notification, NotificationFilter, NotificationPreferences, StatusSnapshot,
    TrackedCode,
  },
  price::{PricePage, PriceItem, PriceQuery},
  stats::EventTally,
  tenant::TenantId,
};

// ─── Read side ───────────────────────────────────────────────────────────────

/// Read access to the canonical price table and the maintenance log.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PriceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// One page of canonical rows matching `query`, ordered by `codigo`.
  fn search_prices<'a>(
    &'a self,
    query: &'a PriceQuery,
  ) -> impl Future<Output = Result<PricePage, Self::Error>> + Send + 'a;

  /// Every canonical row (all states and competências) for `codigos`.
  /// Unknown codes are simply absent from the result.
  fn get_prices<'a>(
    &'a self,
    codigos: &'a [String],
  ) -> impl Future<Output = Result<Vec<PriceItem>, Self::Error>> + Send + 'a;

  /// Every maintenance event for `codigos`, in no particular order.
  fn get_events<'a>(
    &'a self,
    codigos: &'a [String],
  ) -> impl Future<Output = Result<Vec<MaintenanceEvent>, Self::Error>> + Send + 'a;

  /// Every maintenance event with `data_evento >= since`.
  fn events_since(
    &self,
    since: NaiveDate,
  ) -> impl Future<Output = Result<Vec<MaintenanceEvent>, Self::Error>> + Send + '_;

  /// Aggregate counts over the maintenance log; `recentes` counts events
  /// with `data_evento >= since`.
  fn tally_events(
    &self,
    since: NaiveDate,
  ) -> impl Future<Output = Result<EventTally, Self::Error>> + Send + '_;
}

// ─── Tracking side ───────────────────────────────────────────────────────────

/// Budget tracking state used by the notification job.
pub trait TrackingStore: PriceStore {
  /// Codes referenced by active budgets, one row per (budget, code).
  fn tracked_codes(
    &self,
  ) -> impl Future<Output = Result<Vec<TrackedCode>, Self::Error>> + Send + '_;

  /// Snapshots recorded by the previous sweep for `codigos`.
  fn snapshots<'a>(
    &'a self,
    codigos: &'a [String],
  ) -> impl Future<Output = Result<Vec<StatusSnapshot>, Self::Error>> + Send + 'a;

  /// Insert or replace the snapshot of each code.
  fn save_snapshots(
    &self,
    snapshots: Vec<StatusSnapshot>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Persist notifications; the store assigns ids and timestamps.
  fn create_notifications(
    &self,
    notifications: Vec<NewNotification>,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Notifications of `tenant`, newest first.
  fn list_notifications<'a>(
    &'a self,
    tenant: TenantId,
    filter: &'a NotificationFilter,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + 'a;

  /// Insert or replace the preferences of `tenant`.
  fn save_preferences(
    &self,
    tenant: TenantId,
    preferencias: NotificationPreferences,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Stored preferences of `tenant`, if it ever saved any.
  fn preferences(
    &self,
    tenant: TenantId,
  ) -> impl Future<Output = Result<Option<NotificationPreferences>, Self::Error>> + Send + '_;
}
