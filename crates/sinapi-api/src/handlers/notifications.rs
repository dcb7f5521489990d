//! Handler for `POST /functions/v1/sinapi-notifications`.
//!
//! The body is tagged by `tipo`:
//!
//! | `tipo` | Tenant | Effect |
//! |--------|--------|--------|
//! | `sweep` | no | re-validate tracked codes, notify changed budgets |
//! | `webhook` | no | notify budgets referencing `dados.codigos_alterados` |
//! | `verificar_impactos` | yes | budgets hit by recent maintenance |
//! | `listar_notificacoes` | yes | `dados.filtros` over the tenant's notifications |
//! | `configurar_preferencias` | yes | store `dados.preferencias` for the tenant |
//!
//! Jobs run against the undecorated store; the webhook also drops the read
//! cache since it announces upstream changes.

use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sinapi_core::{
  maintenance::MaintenanceKind,
  notify::{
    BudgetImpact, Notification, NotificationFilter, NotificationPreferences, SweepReport,
    configure_preferences, impacts_for_tenant, list_notifications, process_changed_codes,
    run_status_sweep,
  },
  store::TrackingStore,
};
use tracing::info;

use super::CodeParam;
use crate::{AppState, auth::{Authenticated, request_context}, error::ApiError};

/// Default window of `verificar_impactos`, in days.
pub const DEFAULT_JANELA_DIAS: u32 = 7;
/// Widest accepted window, ten years.
pub const MAX_JANELA_DIAS: u32 = 3650;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookDados {
  #[serde(default)]
  pub codigos_alterados: Vec<CodeParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactosDados {
  #[serde(default)]
  pub janela_dias: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListarDados {
  #[serde(default)]
  pub filtros: NotificationFilter,
}

/// Preferences as clients send them: codes may be numbers and kinds may be
/// descriptive labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenciasInput {
  #[serde(default)]
  pub email_ativo:       bool,
  #[serde(default)]
  pub notif_desktop:     bool,
  #[serde(default)]
  pub codigos_favoritos: Vec<CodeParam>,
  #[serde(default)]
  pub tipos_alteracao:   Vec<String>,
}

impl TryFrom<PreferenciasInput> for NotificationPreferences {
  type Error = ApiError;

  fn try_from(input: PreferenciasInput) -> Result<Self, ApiError> {
    let tipos_alteracao = input
      .tipos_alteracao
      .iter()
      .map(|label| {
        MaintenanceKind::from_label(label)
          .ok_or_else(|| ApiError::BadRequest(format!("unknown tipo_alteracao `{label}`")))
      })
      .collect::<Result<_, _>>()?;
    Ok(Self {
      email_ativo: input.email_ativo,
      notif_desktop: input.notif_desktop,
      codigos_favoritos: input.codigos_favoritos.into_iter().map(String::from).collect(),
      tipos_alteracao,
    })
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenciasDados {
  #[serde(default)]
  pub preferencias: Option<PreferenciasInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum NotificationRequest {
  Sweep,
  Webhook {
    #[serde(default)]
    dados: WebhookDados,
  },
  VerificarImpactos {
    #[serde(default)]
    dados: ImpactosDados,
  },
  ListarNotificacoes {
    #[serde(default)]
    dados: ListarDados,
  },
  ConfigurarPreferencias {
    #[serde(default)]
    dados: PreferenciasDados,
  },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationDados {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub varredura:             Option<SweepReport>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub impactos_encontrados:  Option<Vec<BudgetImpact>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notificacoes_enviadas: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notificacoes:          Option<Vec<Notification>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preferencias_salvas:   Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preferencias:          Option<NotificationPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
  pub sucesso:       bool,
  pub tipo_resposta: String,
  pub dados:         NotificationDados,
}

impl NotificationResponse {
  fn ok(tipo_resposta: &str, dados: NotificationDados) -> Json<Self> {
    Json(Self { sucesso: true, tipo_resposta: tipo_resposta.to_owned(), dados })
  }
}

pub async fn notifications<S>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Json(body): Json<NotificationRequest>,
) -> Result<Json<NotificationResponse>, ApiError>
where
  S: TrackingStore + 'static,
{
  let store = state.store.inner().as_ref();
  match body {
    NotificationRequest::Sweep => {
      let report = run_status_sweep(store, &state.validation)
        .await
        .map_err(|e| ApiError::Store(Box::new(e)))?;
      Ok(NotificationResponse::ok("varredura_concluida", NotificationDados {
        notificacoes_enviadas: Some(report.notificacoes_criadas),
        varredura: Some(report),
        ..Default::default()
      }))
    }
    NotificationRequest::Webhook { dados } => {
      let codigos: Vec<String> = dados.codigos_alterados.into_iter().map(String::from).collect();
      state.store.invalidate_all();
      let report = process_changed_codes(store, &codigos)
        .await
        .map_err(|e| ApiError::Store(Box::new(e)))?;
      Ok(NotificationResponse::ok("webhook_processado", NotificationDados {
        impactos_encontrados: Some(report.impactos),
        notificacoes_enviadas: Some(report.notificacoes_criadas),
        ..Default::default()
      }))
    }
    NotificationRequest::VerificarImpactos { dados } => {
      let ctx = request_context(&headers)?;
      let janela = dados.janela_dias.unwrap_or(DEFAULT_JANELA_DIAS);
      if janela > MAX_JANELA_DIAS {
        return Err(ApiError::BadRequest(format!(
          "janela_dias must be at most {MAX_JANELA_DIAS}"
        )));
      }
      let impactos = impacts_for_tenant(store, ctx.tenant_id, Utc::now().date_naive(), janela)
        .await
        .map_err(|e| ApiError::Store(Box::new(e)))?;
      info!(tenant = %ctx.tenant_id, orcamentos = impactos.len(), "impacts checked");
      Ok(NotificationResponse::ok("impactos_verificados", NotificationDados {
        impactos_encontrados: Some(impactos),
        ..Default::default()
      }))
    }
    NotificationRequest::ListarNotificacoes { dados } => {
      let ctx = request_context(&headers)?;
      let notificacoes = list_notifications(store, ctx.tenant_id, &dados.filtros)
        .await
        .map_err(|e| ApiError::Store(Box::new(e)))?;
      Ok(NotificationResponse::ok("notificacoes_listadas", NotificationDados {
        notificacoes: Some(notificacoes),
        ..Default::default()
      }))
    }
    NotificationRequest::ConfigurarPreferencias { dados } => {
      let ctx = request_context(&headers)?;
      let input = dados
        .preferencias
        .ok_or_else(|| ApiError::BadRequest("`dados.preferencias` is required".into()))?;
      let preferencias = configure_preferences(store, ctx.tenant_id, input.try_into()?)
        .await
        .map_err(|e| ApiError::Store(Box::new(e)))?;
      Ok(NotificationResponse::ok("preferencias_configuradas", NotificationDados {
        preferencias_salvas: Some(true),
        preferencias: Some(preferencias),
        ..Default::default()
      }))
    }
  }
}
