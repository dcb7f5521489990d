//! [`RestStore`]: the PostgREST implementation of [`PriceStore`] and
//! [`TrackingStore`].

use chrono::{NaiveDate, SecondsFormat, Utc};
use sinapi_core::{
  maintenance::{MaintenanceEvent, MaintenanceKind},
  notify::{
    NewNotification, Notification, NotificationFilter, NotificationPreferences, StatusSnapshot,
    TrackedCode,
  },
  price::{PriceItem, PricePage, PriceQuery},
  stats::EventTally,
  store::{PriceStore, TrackingStore},
  tenant::TenantId,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  client::{PostgrestClient, Query, RestConfig, in_list, quote},
  rows::{
    EVENTS, EventRow, NOTIFICATIONS, NotificationRow, PREFERENCES, PRICES, PreferencesRow,
    PriceRow, SNAPSHOTS, SnapshotRow, TRACKED, TrackedRow,
  },
};

/// SINAPI tables behind a PostgREST endpoint.
///
/// Cloning is cheap; the HTTP client is reference-counted.
#[derive(Clone)]
pub struct RestStore {
  client: PostgrestClient,
}

impl RestStore {
  pub fn new(config: &RestConfig) -> Result<Self> {
    Ok(Self { client: PostgrestClient::new(config)? })
  }

  #[cfg(test)]
  pub(crate) fn from_client(client: PostgrestClient) -> Self { Self { client } }

  async fn events_where(&self, filter: (&'static str, String)) -> Result<Vec<MaintenanceEvent>> {
    let query: Query = vec![
      ("select", EventRow::SELECT.to_owned()),
      filter,
      ("order", "data_referencia.asc,id.asc".to_owned()),
    ];
    let rows: Vec<EventRow> = self.client.select(EVENTS, &query).await?;
    Ok(rows.into_iter().filter_map(EventRow::into_event).collect())
  }
}

impl PriceStore for RestStore {
  type Error = crate::Error;

  async fn search_prices(&self, query: &PriceQuery) -> Result<PricePage> {
    let mut q: Query = vec![("select", PriceRow::SELECT.to_owned())];
    if let Some(texto) = query.texto.as_deref().map(str::trim) {
      q.push((
        "or",
        format!(
          "(descricao_insumo.ilike.{},codigo_sinapi.eq.{})",
          quote(&format!("*{texto}*")),
          quote(texto)
        ),
      ));
    }
    if let Some(estado) = &query.estado {
      q.push(("estado", format!("eq.{}", estado.to_uppercase())));
    }
    if let Some(fonte) = query.fonte {
      q.push(("fonte", format!("eq.{}", fonte.as_str())));
    }
    if let Some(categoria) = &query.categoria {
      q.push(("tipo_insumo", format!("eq.{categoria}")));
    }
    q.push(("order", "codigo_sinapi.asc,estado.asc,mes_referencia.desc".to_owned()));
    q.push(("limit", query.limit.to_string()));
    q.push(("offset", query.offset.to_string()));

    let (rows, total): (Vec<PriceRow>, _) = self.client.select_counted(PRICES, &q).await?;
    let items: Vec<PriceItem> = rows.into_iter().map(PriceRow::into_item).collect::<Result<_>>()?;
    // Without a Content-Range total, count what is known to exist.
    let total = total.unwrap_or(query.offset.saturating_add(items.len()) as u64);

    debug!(total, rows = items.len(), "price search");
    Ok(PricePage { items, total })
  }

  async fn get_prices(&self, codigos: &[String]) -> Result<Vec<PriceItem>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    let query: Query = vec![
      ("select", PriceRow::SELECT.to_owned()),
      ("codigo_sinapi", in_list(codigos)),
    ];
    let rows: Vec<PriceRow> = self.client.select(PRICES, &query).await?;
    rows.into_iter().map(PriceRow::into_item).collect()
  }

  async fn get_events(&self, codigos: &[String]) -> Result<Vec<MaintenanceEvent>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    self.events_where(("codigo_sinapi", in_list(codigos))).await
  }

  async fn events_since(&self, since: NaiveDate) -> Result<Vec<MaintenanceEvent>> {
    self
      .events_where(("data_referencia", format!("gte.{}", since.format("%Y-%m-%d"))))
      .await
  }

  async fn tally_events(&self, since: NaiveDate) -> Result<EventTally> {
    let mut tally = EventTally::default();
    for kind in MaintenanceKind::ALL {
      // Same reading as `MaintenanceKind::from_label`: the kind's stem and
      // none of the stems that take priority over it.
      let mut query: Query = vec![
        ("select", "id".to_owned()),
        ("tipo_manutencao", format!("ilike.*{}*", kind.stem())),
      ];
      for before in MaintenanceKind::LABEL_PRIORITY
        .into_iter()
        .take_while(|k| *k != kind)
      {
        query.push(("tipo_manutencao", format!("not.ilike.*{}*", before.stem())));
      }
      let n = self.client.count(EVENTS, &query).await?;
      if n > 0 {
        tally.total += n;
        tally.por_tipo.insert(kind.as_str().to_owned(), n);
      }
    }

    let recent: Query = vec![
      ("select", "id".to_owned()),
      ("data_referencia", format!("gte.{}", since.format("%Y-%m-%d"))),
    ];
    tally.recentes = self.client.count(EVENTS, &recent).await?;
    Ok(tally)
  }
}

impl TrackingStore for RestStore {
  async fn tracked_codes(&self) -> Result<Vec<TrackedCode>> {
    let query: Query = vec![("select", TrackedRow::SELECT.to_owned())];
    let rows: Vec<TrackedRow> = self.client.select(TRACKED, &query).await?;
    Ok(rows.into_iter().map(TrackedRow::into_tracked).collect())
  }

  async fn snapshots(&self, codigos: &[String]) -> Result<Vec<StatusSnapshot>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    let query: Query = vec![
      ("select", SnapshotRow::SELECT.to_owned()),
      ("codigo_sinapi", in_list(codigos)),
    ];
    let rows: Vec<SnapshotRow> = self.client.select(SNAPSHOTS, &query).await?;
    rows.into_iter().map(SnapshotRow::into_snapshot).collect()
  }

  async fn save_snapshots(&self, snapshots: Vec<StatusSnapshot>) -> Result<()> {
    if snapshots.is_empty() {
      return Ok(());
    }
    let rows: Vec<SnapshotRow> = snapshots.into_iter().map(SnapshotRow::from).collect();
    self.client.upsert(SNAPSHOTS, "codigo_sinapi", &rows).await
  }

  async fn create_notifications(
    &self,
    notifications: Vec<NewNotification>,
  ) -> Result<Vec<Notification>> {
    if notifications.is_empty() {
      return Ok(Vec::new());
    }
    let now = Utc::now();
    let rows: Vec<NotificationRow> = notifications
      .into_iter()
      .map(|n| n.into_notification(Uuid::new_v4(), now).into())
      .collect();
    let stored: Vec<NotificationRow> = self.client.insert(NOTIFICATIONS, &rows).await?;
    Ok(stored.into_iter().map(Notification::from).collect())
  }

  async fn list_notifications(
    &self,
    tenant: TenantId,
    filter: &NotificationFilter,
  ) -> Result<Vec<Notification>> {
    let mut query: Query = vec![
      ("select", NotificationRow::SELECT.to_owned()),
      ("tenant_id", format!("eq.{tenant}")),
    ];
    if filter.apenas_nao_lidas {
      query.push(("lida", "eq.false".to_owned()));
    }
    if let Some(desde) = filter.desde {
      query.push((
        "created_at",
        format!("gte.{}", desde.to_rfc3339_opts(SecondsFormat::Micros, true)),
      ));
    }
    if let Some(ate) = filter.ate {
      query.push((
        "created_at",
        format!("lte.{}", ate.to_rfc3339_opts(SecondsFormat::Micros, true)),
      ));
    }
    query.push(("order", "created_at.desc".to_owned()));
    query.push(("limit", filter.limite().to_string()));

    let rows: Vec<NotificationRow> = self.client.select(NOTIFICATIONS, &query).await?;
    Ok(rows.into_iter().map(Notification::from).collect())
  }

  async fn save_preferences(
    &self,
    tenant: TenantId,
    preferencias: NotificationPreferences,
  ) -> Result<()> {
    let row = PreferencesRow::new(tenant, preferencias, Utc::now());
    self.client.upsert(PREFERENCES, "tenant_id", &[row]).await
  }

  async fn preferences(&self, tenant: TenantId) -> Result<Option<NotificationPreferences>> {
    let query: Query = vec![
      ("select", PreferencesRow::SELECT.to_owned()),
      ("tenant_id", format!("eq.{tenant}")),
      ("limit", "1".to_owned()),
    ];
    let rows: Vec<PreferencesRow> = self.client.select(PREFERENCES, &query).await?;
    Ok(rows.into_iter().next().map(PreferencesRow::into_preferences))
  }
}
