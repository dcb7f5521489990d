//! [`SqliteStore`]: the SQLite implementation of [`PriceStore`] and
//! [`TrackingStore`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::functions::FunctionFlags;
use sinapi_core::{
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
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Result,
  dataset::{Dataset, ImportSummary, NewEvent},
  encode::{
    RawEvent, RawNotification, RawPreferences, RawPriceItem, RawSnapshot, RawTrackedCode,
    encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// `?1, ?2, …, ?n`
fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE … ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// SQLite's `LOWER` only folds ASCII. Description matching goes through
/// `unicode_lower` so that `AÇO` and `aço` meet.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "unicode_lower",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let s: String = ctx.get(0)?;
      Ok(s.to_lowercase())
    },
  )
}

/// Positional values of one `precos` insert.
type PriceRow = [String; 8];

fn price_row(item: &PriceItem) -> PriceRow {
  [
    item.codigo.trim().to_owned(),
    item.descricao.clone(),
    item.unidade.clone(),
    item.preco_unitario.to_string(),
    item.fonte.as_str().to_owned(),
    item.estado.to_uppercase(),
    encode_date(item.data_referencia),
    item.categoria.clone(),
  ]
}

/// Positional values of one `manutencoes` insert (without `id`).
type EventRow = (String, String, String, Option<String>, Option<String>, Option<String>, Option<String>);

fn event_row(ev: &NewEvent) -> EventRow {
  (
    ev.codigo.trim().to_owned(),
    ev.tipo_manutencao.as_str().to_owned(),
    encode_date(ev.data_evento),
    ev.valor_anterior.map(|d| d.to_string()),
    ev.valor_novo.map(|d| d.to_string()),
    ev.codigo_substituto.clone(),
    ev.descricao_motivo.clone(),
  )
}

/// Positional values of one `orcamento_codigos` insert.
type TrackedRow = [String; 4];

fn tracked_row(t: &TrackedCode) -> TrackedRow {
  [
    encode_uuid(t.orcamento_id),
    t.tenant_id.to_string(),
    t.nome_orcamento.clone(),
    t.codigo.trim().to_owned(),
  ]
}

const INSERT_PRICE: &str = "INSERT OR REPLACE INTO precos (
    codigo, descricao, unidade, preco_unitario, fonte, estado, data_referencia, categoria
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_EVENT: &str = "INSERT INTO manutencoes (
    codigo, tipo_manutencao, data_evento, valor_anterior, valor_novo,
    codigo_substituto, descricao_motivo
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const INSERT_TRACKED: &str = "INSERT OR REPLACE INTO orcamento_codigos (
    orcamento_id, tenant_id, nome_orcamento, codigo
  ) VALUES (?1, ?2, ?3, ?4)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// SINAPI tables backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Loaders ─────────────────────────────────────────────────────────────

  /// Insert a price row, replacing the row with the same code, source, state
  /// and competência.
  pub async fn upsert_price(&self, item: &PriceItem) -> Result<()> {
    let row = price_row(item);
    self
      .conn
      .call(move |conn| {
        conn.execute(INSERT_PRICE, rusqlite::params_from_iter(row.iter()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Append an event to the maintenance log and return it with its id.
  pub async fn append_event(&self, ev: &NewEvent) -> Result<MaintenanceEvent> {
    let (codigo, tipo, data, anterior, novo, substituto, motivo) = event_row(ev);
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          INSERT_EVENT,
          rusqlite::params![codigo, tipo, data, anterior, novo, substituto, motivo],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(MaintenanceEvent {
      id,
      codigo: ev.codigo.trim().to_owned(),
      tipo_manutencao: ev.tipo_manutencao,
      data_evento: ev.data_evento,
      valor_anterior: ev.valor_anterior,
      valor_novo: ev.valor_novo,
      codigo_substituto: ev.codigo_substituto.clone(),
      descricao_motivo: ev.descricao_motivo.clone(),
    })
  }

  /// Record that a budget references a code.
  pub async fn track_code(&self, tracked: &TrackedCode) -> Result<()> {
    let row = tracked_row(tracked);
    self
      .conn
      .call(move |conn| {
        conn.execute(INSERT_TRACKED, rusqlite::params_from_iter(row.iter()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load a whole dataset in one transaction.
  pub async fn import_dataset(&self, dataset: &Dataset) -> Result<ImportSummary> {
    let prices: Vec<PriceRow> = dataset.precos.iter().map(price_row).collect();
    let events: Vec<EventRow> = dataset.manutencoes.iter().map(event_row).collect();
    let tracked: Vec<TrackedRow> = dataset
      .orcamentos
      .iter()
      .flat_map(|b| b.tracked_codes())
      .map(|t| tracked_row(&t))
      .collect();

    let summary = ImportSummary {
      precos:             prices.len(),
      manutencoes:        events.len(),
      codigos_rastreados: tracked.len(),
    };

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(INSERT_PRICE)?;
          for row in &prices {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
          }
          let mut stmt = tx.prepare(INSERT_EVENT)?;
          for (codigo, tipo, data, anterior, novo, substituto, motivo) in &events {
            stmt.execute(rusqlite::params![
              codigo, tipo, data, anterior, novo, substituto, motivo
            ])?;
          }
          let mut stmt = tx.prepare(INSERT_TRACKED)?;
          for row in &tracked {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    info!(
      precos = summary.precos,
      manutencoes = summary.manutencoes,
      codigos_rastreados = summary.codigos_rastreados,
      "dataset imported"
    );
    Ok(summary)
  }
}

// ─── PriceStore impl ─────────────────────────────────────────────────────────

impl PriceStore for SqliteStore {
  type Error = crate::Error;

  async fn search_prices(&self, query: &PriceQuery) -> Result<PricePage> {
    let texto = query.texto.as_deref().map(|t| t.trim().to_lowercase());
    let pattern = texto.as_deref().map(|t| format!("%{}%", escape_like(t)));
    let estado = query.estado.clone();
    let fonte = query.fonte.map(|f| f.as_str().to_owned());
    let categoria = query.categoria.clone();
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

    let (total, raws): (i64, Vec<RawPriceItem>) = self
      .conn
      .call(move |conn| {
        let filter = "WHERE (?1 IS NULL OR unicode_lower(descricao) LIKE ?1 ESCAPE '\\' OR LOWER(codigo) = ?2)
             AND (?3 IS NULL OR UPPER(estado) = UPPER(?3))
             AND (?4 IS NULL OR fonte = ?4)
             AND (?5 IS NULL OR categoria = ?5)";

        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM precos {filter}"),
          rusqlite::params![pattern, texto, estado, fonte, categoria],
          |r| r.get(0),
        )?;

        let sql = format!(
          "SELECT {} FROM precos {filter}
           ORDER BY codigo, estado, data_referencia DESC
           LIMIT ?6 OFFSET ?7",
          RawPriceItem::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![pattern, texto, estado, fonte, categoria, limit, offset],
            RawPriceItem::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((total, rows))
      })
      .await?;

    debug!(total, rows = raws.len(), "price search");
    Ok(PricePage {
      items: raws.into_iter().map(RawPriceItem::into_item).collect::<Result<_>>()?,
      total: total.max(0) as u64,
    })
  }

  async fn get_prices(&self, codigos: &[String]) -> Result<Vec<PriceItem>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    let codigos = codigos.to_vec();

    let raws: Vec<RawPriceItem> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM precos WHERE codigo IN ({}) ORDER BY codigo, data_referencia",
          RawPriceItem::COLUMNS,
          placeholders(codigos.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(codigos.iter()), RawPriceItem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPriceItem::into_item).collect()
  }

  async fn get_events(&self, codigos: &[String]) -> Result<Vec<MaintenanceEvent>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    let codigos = codigos.to_vec();

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM manutencoes WHERE codigo IN ({}) ORDER BY data_evento, id",
          RawEvent::COLUMNS,
          placeholders(codigos.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(codigos.iter()), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn events_since(&self, since: NaiveDate) -> Result<Vec<MaintenanceEvent>> {
    let since = encode_date(since);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM manutencoes WHERE data_evento >= ?1 ORDER BY data_evento, id",
          RawEvent::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![since], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn tally_events(&self, since: NaiveDate) -> Result<EventTally> {
    let since = encode_date(since);

    let rows: Vec<(String, i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT tipo_manutencao, COUNT(*), COALESCE(SUM(data_evento >= ?1), 0)
           FROM manutencoes
           GROUP BY tipo_manutencao",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![since], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut tally = EventTally::default();
    for (tipo, count, recent) in rows {
      tally.total += count as u64;
      tally.recentes += recent as u64;
      tally.por_tipo.insert(tipo, count as u64);
    }
    Ok(tally)
  }
}

// ─── TrackingStore impl ──────────────────────────────────────────────────────

impl TrackingStore for SqliteStore {
  async fn tracked_codes(&self) -> Result<Vec<TrackedCode>> {
    let raws: Vec<RawTrackedCode> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT orcamento_id, tenant_id, nome_orcamento, codigo
           FROM orcamento_codigos ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawTrackedCode {
              orcamento_id:   row.get(0)?,
              tenant_id:      row.get(1)?,
              nome_orcamento: row.get(2)?,
              codigo:         row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTrackedCode::into_tracked).collect()
  }

  async fn snapshots(&self, codigos: &[String]) -> Result<Vec<StatusSnapshot>> {
    if codigos.is_empty() {
      return Ok(Vec::new());
    }
    let codigos = codigos.to_vec();

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT codigo, status, verificado_em FROM status_snapshots WHERE codigo IN ({})",
          placeholders(codigos.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(codigos.iter()), |row| {
            Ok(RawSnapshot {
              codigo:        row.get(0)?,
              status:        row.get(1)?,
              verificado_em: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn save_snapshots(&self, snapshots: Vec<StatusSnapshot>) -> Result<()> {
    if snapshots.is_empty() {
      return Ok(());
    }
    let rows: Vec<[String; 3]> = snapshots
      .into_iter()
      .map(|s| [s.codigo, s.status.as_str().to_owned(), encode_dt(s.verificado_em)])
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO status_snapshots (codigo, status, verificado_em)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(codigo) DO UPDATE SET
               status = excluded.status,
               verificado_em = excluded.verificado_em",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn create_notifications(
    &self,
    notifications: Vec<NewNotification>,
  ) -> Result<Vec<Notification>> {
    let now = Utc::now();
    let created: Vec<Notification> = notifications
      .into_iter()
      .map(|n| n.into_notification(Uuid::new_v4(), now))
      .collect();

    let mut rows = Vec::with_capacity(created.len());
    for n in &created {
      rows.push((
        encode_uuid(n.id),
        n.tenant_id.to_string(),
        encode_uuid(n.orcamento_id),
        n.tipo.clone(),
        n.titulo.clone(),
        n.mensagem.clone(),
        serde_json::to_string(&n.codigos_impactados)?,
        n.urgencia.as_str(),
        encode_dt(n.criada_em),
      ));
    }

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO notificacoes (
               id, tenant_id, orcamento_id, tipo, titulo, mensagem,
               codigos_impactados, urgencia, lida, criada_em
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
          )?;
          for (id, tenant, orcamento, tipo, titulo, mensagem, codigos, urgencia, criada) in
            &rows
          {
            stmt.execute(rusqlite::params![
              id, tenant, orcamento, tipo, titulo, mensagem, codigos, urgencia, criada
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(created)
  }

  async fn list_notifications(
    &self,
    tenant: TenantId,
    filter: &NotificationFilter,
  ) -> Result<Vec<Notification>> {
    let tenant = tenant.to_string();
    let apenas_nao_lidas = filter.apenas_nao_lidas;
    let desde = filter.desde.map(encode_dt);
    let ate = filter.ate.map(encode_dt);
    let limite = filter.limite() as i64;

    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM notificacoes
           WHERE tenant_id = ?1
             AND (?2 = 0 OR lida = 0)
             AND (?3 IS NULL OR criada_em >= ?3)
             AND (?4 IS NULL OR criada_em <= ?4)
           ORDER BY criada_em DESC, rowid DESC
           LIMIT ?5",
          RawNotification::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant, apenas_nao_lidas, desde, ate, limite],
            RawNotification::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  async fn save_preferences(
    &self,
    tenant: TenantId,
    preferencias: NotificationPreferences,
  ) -> Result<()> {
    let tenant = tenant.to_string();
    let codigos = serde_json::to_string(&preferencias.codigos_favoritos)?;
    let tipos = serde_json::to_string(&preferencias.tipos_alteracao)?;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO preferencias_notificacao (
             tenant_id, email_ativo, notif_desktop, codigos_favoritos, tipos_alteracao,
             atualizado_em
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(tenant_id) DO UPDATE SET
             email_ativo = excluded.email_ativo,
             notif_desktop = excluded.notif_desktop,
             codigos_favoritos = excluded.codigos_favoritos,
             tipos_alteracao = excluded.tipos_alteracao,
             atualizado_em = excluded.atualizado_em",
          rusqlite::params![
            tenant,
            preferencias.email_ativo,
            preferencias.notif_desktop,
            codigos,
            tipos,
            now
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn preferences(&self, tenant: TenantId) -> Result<Option<NotificationPreferences>> {
    let tenant = tenant.to_string();
    let raw: Option<RawPreferences> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT email_ativo, notif_desktop, codigos_favoritos, tipos_alteracao
           FROM preferencias_notificacao WHERE tenant_id = ?1",
        )?;
        let mut rows = stmt.query_map([tenant], |row| {
          Ok(RawPreferences {
            email_ativo:       row.get(0)?,
            notif_desktop:     row.get(1)?,
            codigos_favoritos: row.get(2)?,
            tipos_alteracao:   row.get(3)?,
          })
        })?;
        let first = rows.next().transpose()?;
        Ok(first)
      })
      .await?;

    raw.map(RawPreferences::into_preferences).transpose()
  }
}
