//! Budget notifications: which tracked budgets are affected by SINAPI
//! maintenance, and the job that records it.
//!
//! Three entry points mirror the ways the job is triggered:
//!
//! | Function | Trigger |
//! |----------|---------|
//! | [`run_status_sweep`] | schedule / on demand; compares against the previous run |
//! | [`process_changed_codes`] | ingestion webhook with an explicit code list |
//! | [`impacts_for_tenant`] | read-only report for one tenant over a recent window |
//!
//! Tenants keep their delivery settings with [`configure_preferences`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error,
  maintenance::MaintenanceKind,
  store::TrackingStore,
  tenant::TenantId,
  validation::{CodeCheck, ValidationConfig, ValidationStatus, validate_batch},
};

/// Notification `tipo` written by the sweep.
pub const TIPO_STATUS_ALTERADO: &str = "sinapi_status_alterado";
/// Notification `tipo` written by the webhook.
pub const TIPO_ALTERACAO: &str = "sinapi_alteracao";

const DEFAULT_LIMITE: usize = 50;
const MAX_LIMITE: usize = 200;

// ─── Tracking types ──────────────────────────────────────────────────────────

/// One code referenced by one active budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCode {
  pub orcamento_id:   Uuid,
  pub tenant_id:      TenantId,
  pub nome_orcamento: String,
  pub codigo:         String,
}

/// The status a code had when the previous sweep ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
  pub codigo:        String,
  pub status:        ValidationStatus,
  pub verificado_em: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgencia {
  Baixa,
  Media,
  Alta,
}

impl Urgencia {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Baixa => "baixa",
      Self::Media => "media",
      Self::Alta => "alta",
    }
  }

  pub fn parse(s: &str) -> Result<Self, Error> {
    match s {
      "baixa" => Ok(Self::Baixa),
      "media" => Ok(Self::Media),
      "alta" => Ok(Self::Alta),
      other => Err(Error::UnknownUrgencia(other.to_owned())),
    }
  }

  /// `Alta` when more than `limite` codes are affected, otherwise `Media`.
  fn by_count(count: usize, limite: usize) -> Self {
    if count > limite { Self::Alta } else { Self::Media }
  }
}

/// A persisted notification addressed to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub id:                 Uuid,
  pub tenant_id:          TenantId,
  pub orcamento_id:       Uuid,
  pub tipo:               String,
  pub titulo:             String,
  pub mensagem:           String,
  pub codigos_impactados: Vec<String>,
  pub urgencia:           Urgencia,
  pub lida:               bool,
  pub criada_em:          DateTime<Utc>,
}

/// Input to [`TrackingStore::create_notifications`]. `id` and `criada_em`
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
  pub tenant_id:          TenantId,
  pub orcamento_id:       Uuid,
  pub tipo:               String,
  pub titulo:             String,
  pub mensagem:           String,
  pub codigos_impactados: Vec<String>,
  pub urgencia:           Urgencia,
}

impl NewNotification {
  pub fn into_notification(self, id: Uuid, criada_em: DateTime<Utc>) -> Notification {
    Notification {
      id,
      tenant_id: self.tenant_id,
      orcamento_id: self.orcamento_id,
      tipo: self.tipo,
      titulo: self.titulo,
      mensagem: self.mensagem,
      codigos_impactados: self.codigos_impactados,
      urgencia: self.urgencia,
      lida: false,
      criada_em,
    }
  }
}

/// Filter for [`list_notifications`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationFilter {
  #[serde(default)]
  pub apenas_nao_lidas: bool,
  #[serde(default, alias = "data_inicio")]
  pub desde:            Option<DateTime<Utc>>,
  #[serde(default, alias = "data_fim")]
  pub ate:              Option<DateTime<Utc>>,
  #[serde(default)]
  pub limite:           Option<usize>,
}

impl NotificationFilter {
  /// Effective page size: 50 by default, at most 200.
  pub fn limite(&self) -> usize {
    self.limite.unwrap_or(DEFAULT_LIMITE).clamp(1, MAX_LIMITE)
  }

  /// Whether `n` passes every filter except the tenant and the limit.
  pub fn matches(&self, n: &Notification) -> bool {
    (!self.apenas_nao_lidas || !n.lida)
      && self.desde.is_none_or(|d| n.criada_em >= d)
      && self.ate.is_none_or(|a| n.criada_em <= a)
  }
}

/// Delivery settings of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
  #[serde(default)]
  pub email_ativo:       bool,
  #[serde(default)]
  pub notif_desktop:     bool,
  #[serde(default)]
  pub codigos_favoritos: Vec<String>,
  /// Kinds of change worth a notification. Empty means every kind.
  #[serde(default)]
  pub tipos_alteracao:   Vec<MaintenanceKind>,
}

impl NotificationPreferences {
  /// Codes trimmed with blanks dropped; codes and kinds deduplicated,
  /// keeping first-seen order.
  pub fn normalized(self) -> Self {
    let mut seen = HashSet::new();
    let codigos_favoritos = self
      .codigos_favoritos
      .iter()
      .map(|c| c.trim())
      .filter(|c| !c.is_empty() && seen.insert(*c))
      .map(str::to_owned)
      .collect();
    let mut tipos_alteracao: Vec<MaintenanceKind> = Vec::new();
    for kind in self.tipos_alteracao {
      if !tipos_alteracao.contains(&kind) {
        tipos_alteracao.push(kind);
      }
    }
    Self { codigos_favoritos, tipos_alteracao, ..self }
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoImpacto {
  Desativacao,
  Alteracao,
}

/// A budget affected by maintenance of some of its codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetImpact {
  pub orcamento_id:       Uuid,
  pub nome_orcamento:     String,
  pub codigos_impactados: Vec<String>,
  pub tipo_impacto:       TipoImpacto,
  pub urgencia:           Urgencia,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
  pub codigos_verificados:  usize,
  pub codigos_alterados:    Vec<String>,
  pub notificacoes_criadas: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReport {
  pub impactos:             Vec<BudgetImpact>,
  pub notificacoes_criadas: usize,
}

// ─── Grouping ────────────────────────────────────────────────────────────────

struct BudgetCodes<'a> {
  first:   &'a TrackedCode,
  codigos: Vec<String>,
}

/// Group tracked rows by budget, keeping only codes accepted by `affected`.
/// Budgets without affected codes are dropped; first-seen order is kept.
fn affected_budgets<'a>(
  tracked: &'a [TrackedCode],
  mut affected: impl FnMut(&str) -> bool,
) -> Vec<BudgetCodes<'a>> {
  let mut order: Vec<Uuid> = Vec::new();
  let mut groups: HashMap<Uuid, BudgetCodes<'a>> = HashMap::new();

  for row in tracked {
    if !affected(&row.codigo) {
      continue;
    }
    let group = groups.entry(row.orcamento_id).or_insert_with(|| {
      order.push(row.orcamento_id);
      BudgetCodes { first: row, codigos: Vec::new() }
    });
    if !group.codigos.contains(&row.codigo) {
      group.codigos.push(row.codigo.clone());
    }
  }

  order
    .into_iter()
    .filter_map(|id| groups.remove(&id))
    .collect()
}

fn distinct_codes(tracked: &[TrackedCode]) -> Vec<String> {
  let mut seen = HashSet::new();
  tracked
    .iter()
    .filter(|t| seen.insert(t.codigo.as_str()))
    .map(|t| t.codigo.clone())
    .collect()
}

// ─── Sweep ───────────────────────────────────────────────────────────────────

/// Re-validate every tracked code and notify budgets whose codes changed
/// status since the previous sweep.
///
/// A code without a snapshot is compared against `VALIDO`. `INDETERMINADO`
/// results are neither notified nor snapshotted, so the next run retries
/// them. Notifications are written before snapshots; a failed write leaves
/// the previous snapshots in place.
pub async fn run_status_sweep<S: TrackingStore>(
  store: &S,
  config: &ValidationConfig,
) -> Result<SweepReport, S::Error> {
  let tracked = store.tracked_codes().await?;
  let codigos = distinct_codes(&tracked);
  if codigos.is_empty() {
    info!("status sweep: no tracked codes");
    return Ok(SweepReport::default());
  }

  let checks: Vec<CodeCheck> = codigos.iter().map(CodeCheck::new).collect();
  let results = validate_batch(store, config, &checks).await;

  let previous: HashMap<String, ValidationStatus> = store
    .snapshots(&codigos)
    .await?
    .into_iter()
    .map(|s| (s.codigo, s.status))
    .collect();

  let now = Utc::now();
  let mut changed: HashMap<String, ValidationStatus> = HashMap::new();
  let mut snapshots = Vec::new();
  for r in &results {
    if r.status == ValidationStatus::Indeterminado {
      continue;
    }
    let before = previous
      .get(&r.codigo)
      .copied()
      .unwrap_or(ValidationStatus::Valido);
    if before != r.status {
      changed.insert(r.codigo.clone(), r.status);
    }
    snapshots.push(StatusSnapshot {
      codigo:        r.codigo.clone(),
      status:        r.status,
      verificado_em: now,
    });
  }

  let notifications: Vec<NewNotification> =
    affected_budgets(&tracked, |c| changed.contains_key(c))
      .into_iter()
      .map(|b| {
        let deactivated = b
          .codigos
          .iter()
          .any(|c| changed.get(c) == Some(&ValidationStatus::Desativado));
        let urgencia = if deactivated {
          Urgencia::Alta
        } else {
          Urgencia::by_count(b.codigos.len(), 5)
        };
        let detalhes: Vec<String> = b
          .codigos
          .iter()
          .filter_map(|c| changed.get(c).map(|s| format!("{c} → {}", s.as_str())))
          .collect();
        NewNotification {
          tenant_id:          b.first.tenant_id,
          orcamento_id:       b.first.orcamento_id,
          tipo:               TIPO_STATUS_ALTERADO.to_owned(),
          titulo:             format!(
            "Códigos SINAPI com status alterado no orçamento \"{}\"",
            b.first.nome_orcamento
          ),
          mensagem:           format!(
            "{} código(s) mudaram de status: {}",
            b.codigos.len(),
            detalhes.join(", ")
          ),
          codigos_impactados: b.codigos,
          urgencia,
        }
      })
      .collect();

  let created = if notifications.is_empty() {
    0
  } else {
    store.create_notifications(notifications).await?.len()
  };
  store.save_snapshots(snapshots).await?;

  let mut codigos_alterados: Vec<String> = changed.into_keys().collect();
  codigos_alterados.sort();

  info!(
    verificados = codigos.len(),
    alterados = codigos_alterados.len(),
    notificacoes = created,
    "status sweep finished"
  );

  Ok(SweepReport {
    codigos_verificados: codigos.len(),
    codigos_alterados,
    notificacoes_criadas: created,
  })
}

// ─── Webhook ─────────────────────────────────────────────────────────────────

/// Notify every budget that references any of `codigos`.
pub async fn process_changed_codes<S: TrackingStore>(
  store: &S,
  codigos: &[String],
) -> Result<WebhookReport, S::Error> {
  let wanted: HashSet<&str> = codigos
    .iter()
    .map(|c| c.trim())
    .filter(|c| !c.is_empty())
    .collect();
  if wanted.is_empty() {
    return Ok(WebhookReport::default());
  }

  let tracked = store.tracked_codes().await?;
  let budgets = affected_budgets(&tracked, |c| wanted.contains(c));

  let mut impactos = Vec::with_capacity(budgets.len());
  let mut notifications = Vec::with_capacity(budgets.len());
  for b in budgets {
    let urgencia = Urgencia::by_count(b.codigos.len(), 5);
    notifications.push(NewNotification {
      tenant_id:          b.first.tenant_id,
      orcamento_id:       b.first.orcamento_id,
      tipo:               TIPO_ALTERACAO.to_owned(),
      titulo:             format!(
        "Códigos SINAPI alterados no orçamento \"{}\"",
        b.first.nome_orcamento
      ),
      mensagem:           format!("{} código(s) SINAPI foram alterados", b.codigos.len()),
      codigos_impactados: b.codigos.clone(),
      urgencia,
    });
    impactos.push(BudgetImpact {
      orcamento_id: b.first.orcamento_id,
      nome_orcamento: b.first.nome_orcamento.clone(),
      codigos_impactados: b.codigos,
      tipo_impacto: TipoImpacto::Alteracao,
      urgencia,
    });
  }

  let created = if notifications.is_empty() {
    0
  } else {
    store.create_notifications(notifications).await?.len()
  };

  info!(
    codigos = wanted.len(),
    orcamentos = impactos.len(),
    notificacoes = created,
    "change webhook processed"
  );
  Ok(WebhookReport { impactos, notificacoes_criadas: created })
}

// ─── Tenant impact report ────────────────────────────────────────────────────

/// Budgets of `tenant` referencing codes with maintenance (other than
/// `INCLUSAO`) during the last `janela_dias` days up to `hoje`.
pub async fn impacts_for_tenant<S: TrackingStore>(
  store: &S,
  tenant: TenantId,
  hoje: NaiveDate,
  janela_dias: u32,
) -> Result<Vec<BudgetImpact>, S::Error> {
  let since = hoje
    .checked_sub_days(Days::new(u64::from(janela_dias)))
    .unwrap_or(NaiveDate::MIN);
  let mut kinds: HashMap<String, HashSet<MaintenanceKind>> = HashMap::new();
  for ev in store.events_since(since).await? {
    if ev.tipo_manutencao != MaintenanceKind::Inclusao {
      kinds.entry(ev.codigo).or_default().insert(ev.tipo_manutencao);
    }
  }

  let tracked: Vec<TrackedCode> = store
    .tracked_codes()
    .await?
    .into_iter()
    .filter(|t| t.tenant_id == tenant)
    .collect();

  let impacts = affected_budgets(&tracked, |c| kinds.contains_key(c))
    .into_iter()
    .map(|b| {
      let deactivated = b.codigos.iter().any(|c| {
        kinds.get(c).is_some_and(|k| {
          k.contains(&MaintenanceKind::Desativacao) || k.contains(&MaintenanceKind::Substituicao)
        })
      });
      BudgetImpact {
        orcamento_id:       b.first.orcamento_id,
        nome_orcamento:     b.first.nome_orcamento.clone(),
        urgencia:           Urgencia::by_count(b.codigos.len(), 3),
        tipo_impacto:       if deactivated {
          TipoImpacto::Desativacao
        } else {
          TipoImpacto::Alteracao
        },
        codigos_impactados: b.codigos,
      }
    })
    .collect();

  Ok(impacts)
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Normalize and store `tenant`'s preferences, replacing earlier ones.
pub async fn configure_preferences<S: TrackingStore>(
  store: &S,
  tenant: TenantId,
  preferencias: NotificationPreferences,
) -> Result<NotificationPreferences, S::Error> {
  let preferencias = preferencias.normalized();
  store.save_preferences(tenant, preferencias.clone()).await?;
  info!(
    %tenant,
    favoritos = preferencias.codigos_favoritos.len(),
    tipos = preferencias.tipos_alteracao.len(),
    "notification preferences saved"
  );
  Ok(preferencias)
}

/// Notifications of `tenant`, newest first, at most `filter.limite()`.
pub async fn list_notifications<S: TrackingStore>(
  store: &S,
  tenant: TenantId,
  filter: &NotificationFilter,
) -> Result<Vec<Notification>, S::Error> {
  let mut out = store.list_notifications(tenant, filter).await?;
  out.truncate(filter.limite());
  Ok(out)
}
