//! In-memory store and fixtures shared by the unit tests of this crate.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  maintenance::{MaintenanceEvent, MaintenanceKind},
  notify::{
    NewNotification, Notification, NotificationFilter, NotificationPreferences, StatusSnapshot,
    TrackedCode,
  },
  price::{Fonte, PriceItem, PricePage, PriceQuery},
  stats::EventTally,
  store::{PriceStore, TrackingStore},
  tenant::TenantId,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn event(id: i64, codigo: &str, kind: MaintenanceKind, on: NaiveDate) -> MaintenanceEvent {
  MaintenanceEvent {
    id,
    codigo: codigo.into(),
    tipo_manutencao: kind,
    data_evento: on,
    valor_anterior: None,
    valor_novo: None,
    codigo_substituto: None,
    descricao_motivo: None,
  }
}

pub fn item(codigo: &str, preco: Decimal) -> PriceItem {
  PriceItem {
    codigo:          codigo.into(),
    descricao:       format!("ITEM {codigo}"),
    unidade:         "UN".into(),
    preco_unitario:  preco,
    fonte:           Fonte::DadosOficiais,
    estado:          "SP".into(),
    data_referencia: date(2024, 1, 1),
    categoria:       "MATERIAIS".into(),
  }
}

pub fn tenant(n: u8) -> TenantId {
  TenantId::new(Uuid::from_bytes([n; 16])).unwrap()
}

#[derive(Debug, thiserror::Error)]
#[error("memory store failure: {0}")]
pub struct MemoryError(pub String);

/// A store backed by vectors, with call counting and failure injection.
#[derive(Default)]
pub struct MemoryStore {
  items:         Mutex<Vec<PriceItem>>,
  events:        Mutex<Vec<MaintenanceEvent>>,
  tracked:       Mutex<Vec<TrackedCode>>,
  snapshots:     Mutex<Vec<StatusSnapshot>>,
  notifications: Mutex<Vec<Notification>>,
  preferences:   Mutex<HashMap<TenantId, NotificationPreferences>>,
  failing_codes: Mutex<HashSet<String>>,
  last_codes:    Mutex<Vec<String>>,
  fail_all:      AtomicBool,
  fail_events:   AtomicBool,
  calls:         AtomicUsize,
}

impl MemoryStore {
  pub fn add_item(&self, item: PriceItem) { self.items.lock().unwrap().push(item); }

  pub fn add_event(&self, ev: MaintenanceEvent) { self.events.lock().unwrap().push(ev); }

  pub fn track(&self, tracked: TrackedCode) { self.tracked.lock().unwrap().push(tracked); }

  pub fn fail_all(&self, on: bool) { self.fail_all.store(on, Ordering::SeqCst); }

  pub fn fail_events(&self, on: bool) { self.fail_events.store(on, Ordering::SeqCst); }

  /// Any call whose code list contains `codigo` fails.
  pub fn fail_code(&self, codigo: &str) {
    self.failing_codes.lock().unwrap().insert(codigo.to_owned());
  }

  /// Number of read calls made against the price/event tables.
  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn last_codes(&self) -> Vec<String> { self.last_codes.lock().unwrap().clone() }

  pub fn saved_snapshots(&self) -> Vec<StatusSnapshot> {
    self.snapshots.lock().unwrap().clone()
  }

  pub fn saved_notifications(&self) -> Vec<Notification> {
    self.notifications.lock().unwrap().clone()
  }

  fn check(&self, codigos: &[String]) -> Result<(), MemoryError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last_codes.lock().unwrap() = codigos.to_vec();
    if self.fail_all.load(Ordering::SeqCst) {
      return Err(MemoryError("offline".into()));
    }
    let failing = self.failing_codes.lock().unwrap();
    if let Some(bad) = codigos.iter().find(|c| failing.contains(*c)) {
      return Err(MemoryError(format!("lookup of {bad} failed")));
    }
    Ok(())
  }
}

impl PriceStore for MemoryStore {
  type Error = MemoryError;

  async fn search_prices(&self, query: &PriceQuery) -> Result<PricePage, MemoryError> {
    self.check(&[])?;
    let needle = query.texto.as_deref().map(str::to_lowercase);
    let mut matched: Vec<PriceItem> = self
      .items
      .lock()
      .unwrap()
      .iter()
      .filter(|i| {
        needle.as_deref().is_none_or(|n| {
          i.descricao.to_lowercase().contains(n) || i.codigo.to_lowercase() == n
        })
      })
      .filter(|i| query.estado.as_deref().is_none_or(|e| i.estado == e))
      .filter(|i| query.fonte.is_none_or(|f| i.fonte == f))
      .filter(|i| query.categoria.as_deref().is_none_or(|c| i.categoria == c))
      .cloned()
      .collect();
    matched.sort_by(|a, b| a.codigo.cmp(&b.codigo));
    let total = matched.len() as u64;
    let items = matched.into_iter().skip(query.offset).take(query.limit).collect();
    Ok(PricePage { items, total })
  }

  async fn get_prices(&self, codigos: &[String]) -> Result<Vec<PriceItem>, MemoryError> {
    self.check(codigos)?;
    Ok(
      self
        .items
        .lock()
        .unwrap()
        .iter()
        .filter(|i| codigos.contains(&i.codigo))
        .cloned()
        .collect(),
    )
  }

  async fn get_events(&self, codigos: &[String]) -> Result<Vec<MaintenanceEvent>, MemoryError> {
    self.check(codigos)?;
    if self.fail_events.load(Ordering::SeqCst) {
      return Err(MemoryError("maintenance table unavailable".into()));
    }
    Ok(
      self
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| codigos.contains(&e.codigo))
        .cloned()
        .collect(),
    )
  }

  async fn events_since(&self, since: NaiveDate) -> Result<Vec<MaintenanceEvent>, MemoryError> {
    self.check(&[])?;
    Ok(
      self
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.data_evento >= since)
        .cloned()
        .collect(),
    )
  }

  async fn tally_events(&self, since: NaiveDate) -> Result<EventTally, MemoryError> {
    self.check(&[])?;
    let events = self.events.lock().unwrap();
    Ok(EventTally::from_events(events.iter(), since))
  }
}

impl TrackingStore for MemoryStore {
  async fn tracked_codes(&self) -> Result<Vec<TrackedCode>, MemoryError> {
    Ok(self.tracked.lock().unwrap().clone())
  }

  async fn snapshots(&self, codigos: &[String]) -> Result<Vec<StatusSnapshot>, MemoryError> {
    Ok(
      self
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .filter(|s| codigos.contains(&s.codigo))
        .cloned()
        .collect(),
    )
  }

  async fn save_snapshots(&self, snapshots: Vec<StatusSnapshot>) -> Result<(), MemoryError> {
    let mut stored = self.snapshots.lock().unwrap();
    for snap in snapshots {
      stored.retain(|s| s.codigo != snap.codigo);
      stored.push(snap);
    }
    Ok(())
  }

  async fn create_notifications(
    &self,
    notifications: Vec<NewNotification>,
  ) -> Result<Vec<Notification>, MemoryError> {
    let created: Vec<Notification> = notifications
      .into_iter()
      .map(|n| n.into_notification(Uuid::new_v4(), Utc::now()))
      .collect();
    self.notifications.lock().unwrap().extend(created.iter().cloned());
    Ok(created)
  }

  async fn list_notifications(
    &self,
    tenant: TenantId,
    filter: &NotificationFilter,
  ) -> Result<Vec<Notification>, MemoryError> {
    let mut out: Vec<Notification> = self
      .notifications
      .lock()
      .unwrap()
      .iter()
      .filter(|n| n.tenant_id == tenant && filter.matches(n))
      .cloned()
      .collect();
    out.sort_by(|a, b| b.criada_em.cmp(&a.criada_em));
    out.truncate(filter.limite());
    Ok(out)
  }

  async fn save_preferences(
    &self,
    tenant: TenantId,
    preferencias: NotificationPreferences,
  ) -> Result<(), MemoryError> {
    self.check(&[])?;
    self.preferences.lock().unwrap().insert(tenant, preferencias);
    Ok(())
  }

  async fn preferences(
    &self,
    tenant: TenantId,
  ) -> Result<Option<NotificationPreferences>, MemoryError> {
    Ok(self.preferences.lock().unwrap().get(&tenant).cloned())
  }
}
