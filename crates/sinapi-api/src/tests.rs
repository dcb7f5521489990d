//! Router tests over a seeded in-memory SQLite store.

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use chrono::Utc;
use serde_json::{Value, json};
use sinapi_core::{maintenance::MaintenanceKind, store::TrackingStore as _};
use sinapi_store_sqlite::{SqliteStore, dataset::NewEvent};
use tower::ServiceExt as _;

use crate::{
  AppState, ApiError,
  auth::TENANT_HEADER,
  router,
  testing::{TENANT, basic, price, state},
};

async fn send(
  state: AppState<SqliteStore>,
  method: &str,
  uri: &str,
  headers: Vec<(header::HeaderName, &str)>,
  body: Option<Value>,
) -> Response {
  let auth = basic("user", "secret");
  let mut builder = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::AUTHORIZATION, auth.as_str());
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let req = match body {
    Some(b) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  router(state).oneshot(req).await.unwrap()
}

async fn get(state: AppState<SqliteStore>, uri: &str) -> Response {
  send(state, "GET", uri, vec![], None).await
}

async fn post(state: AppState<SqliteStore>, uri: &str, body: Value) -> Response {
  send(state, "POST", uri, vec![], Some(body)).await
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn tenant_header() -> Vec<(header::HeaderName, &'static str)> {
  vec![(header::HeaderName::from_static(TENANT_HEADER), TENANT)]
}

// ── Health and auth ──────────────────────────────────────────────────────────

#[tokio::test]
async fn health_needs_no_credentials() {
  let (state, _) = state().await;
  let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
  let resp = router(state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_requests_return_401() {
  let (state, _) = state().await;
  let req = Request::builder()
    .uri("/sinapi/search?termo=cimento")
    .body(Body::empty())
    .unwrap();
  let resp = router(state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  assert_eq!(json_body(resp).await["error"], "unauthorized");
}

#[test]
fn store_errors_render_as_502() {
  use axum::response::IntoResponse as _;
  let err = ApiError::Store(Box::new(std::io::Error::other("upstream down")));
  assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
}

// ── Search ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_annotates_maintenance_status() {
  let (state, _) = state().await;
  let resp = get(state, "/sinapi/search?termo=porta").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let page = json_body(resp).await;
  assert_eq!(page["total"], 2);
  let dados = page["dados"].as_array().unwrap();
  assert_eq!(dados[0]["codigo"], "74209/001");
  assert_eq!(dados[0]["manutencao_status"], "DESATIVADO");
  assert_eq!(dados[1]["manutencao_status"], "ATIVO");
}

#[tokio::test]
async fn short_terms_return_an_empty_page() {
  let (state, _) = state().await;
  let page = json_body(get(state, "/sinapi/search?termo=po").await).await;
  assert_eq!(page["total"], 0);
  assert!(page["dados"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn page_numbers_past_any_table_return_an_empty_page() {
  let (state, _) = state().await;
  let resp = get(state, "/sinapi/search?termo=porta&pagina=18446744073709551615").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let page = json_body(resp).await;
  assert!(page["dados"].as_array().unwrap().is_empty());
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn validates_percent_encoded_code() {
  let (state, _) = state().await;
  let resp = get(state, "/sinapi/codes/74209%2F001/validate").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let result = json_body(resp).await;
  assert_eq!(result["codigo"], "74209/001");
  assert_eq!(result["status"], "DESATIVADO");
  assert_eq!(result["codigo_alternativo"], "74209/002");
}

#[tokio::test]
async fn batch_keeps_order_and_duplicates() {
  let (state, _) = state().await;
  let resp = post(
    state,
    "/functions/v1/validate-sinapi-batch",
    json!({ "codigos": ["1379", 1379, "9999"] }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()["x-total-codes"], "3");

  let body = json_body(resp).await;
  let statuses: Vec<&str> = body["resultados"]
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["status"].as_str().unwrap())
    .collect();
  assert_eq!(statuses, ["VALIDO", "VALIDO", "NAO_ENCONTRADO"]);
  assert_eq!(body["resumo"]["total"], 3);
  assert_eq!(body["resumo"]["nao_encontrados"], 1);
  assert!(body["processado_em_ms"].is_u64());
}

#[tokio::test]
async fn batch_rejects_empty_and_oversized_requests() {
  let (state, _) = state().await;
  let resp = post(state.clone(), "/functions/v1/validate-sinapi-batch", json!({ "codigos": [] })).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error"].is_string());

  let many: Vec<String> = (0..101).map(|n| n.to_string()).collect();
  let resp = post(state, "/functions/v1/validate-sinapi-batch", json!({ "codigos": many })).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_validation_can_carry_history() {
  let (state, _) = state().await;
  let resp = get(state, "/sinapi/codes/74209%2F001/validate?incluir_historico=true").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let result = json_body(resp).await;
  let tipos: Vec<&str> = result["historico"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["tipo_manutencao"].as_str().unwrap())
    .collect();
  assert_eq!(tipos, ["ALTERACAO", "DESATIVACAO"]);
  assert_eq!(result["alteracoes_recentes"], false);
  // Deactivated with a substitute: nothing else to suggest.
  assert!(result.get("alternativas_sugeridas").is_none());
}

#[tokio::test]
async fn deactivation_without_substitute_suggests_alternatives() {
  let (state, store) = state().await;
  store
    .upsert_price(&price("74210/001", "PORTA DE MADEIRA LISA", rust_decimal::Decimal::ONE))
    .await
    .unwrap();
  store
    .append_event(&NewEvent::new(
      "74210/001",
      MaintenanceKind::Desativacao,
      Utc::now().date_naive(),
    ))
    .await
    .unwrap();

  let resp = get(state.clone(), "/sinapi/codes/74210%2F001/validate").await;
  let result = json_body(resp).await;
  assert_eq!(result["status"], "DESATIVADO");
  assert_eq!(result["alteracoes_recentes"], true);
  assert_eq!(result["alternativas_sugeridas"], json!(["74209/002"]));

  let resp = post(
    state.clone(),
    "/functions/v1/validate-sinapi-batch",
    json!({ "codigos": ["74210/001"] }),
  )
  .await;
  assert!(json_body(resp).await["resultados"][0].get("alternativas_sugeridas").is_none());

  let resp = post(
    state,
    "/functions/v1/validate-sinapi-batch",
    json!({ "codigos": ["74210/001"], "incluir_alternativas": true, "incluir_historico": true }),
  )
  .await;
  let body = json_body(resp).await;
  let first = &body["resultados"][0];
  assert_eq!(first["alternativas_sugeridas"], json!(["74209/002"]));
  assert_eq!(first["historico"].as_array().map(Vec::len), Some(1));
}

// ── History ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_is_ascending_with_etag() {
  let (state, _) = state().await;
  let resp = get(state.clone(), "/sinapi/codes/74209%2F001/history").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let etag = resp.headers()[header::ETAG].to_str().unwrap().to_owned();

  let body = json_body(resp).await;
  let kinds: Vec<&str> = body["eventos"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["tipo_manutencao"].as_str().unwrap())
    .collect();
  assert_eq!(kinds, ["ALTERACAO", "DESATIVACAO"]);

  let resp = send(
    state,
    "GET",
    "/sinapi/codes/74209%2F001/history",
    vec![(header::IF_NONE_MATCH, etag.as_str())],
    None,
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn history_of_clean_and_unknown_codes() {
  let (state, _) = state().await;
  let resp = get(state.clone(), "/sinapi/codes/1379/history").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert!(json_body(resp).await["eventos"].as_array().unwrap().is_empty());

  let resp = get(state, "/sinapi/codes/0000/history").await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Stats ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_every_kind() {
  let (state, _) = state().await;
  let stats = json_body(get(state, "/sinapi/stats").await).await;
  assert_eq!(stats["total_eventos"], 2);
  assert_eq!(stats["por_tipo"]["ALTERACAO"], 1);
  assert_eq!(stats["por_tipo"]["DESATIVACAO"], 1);
  assert_eq!(stats["por_tipo"]["INCLUSAO"], 0);
  assert_eq!(stats["por_tipo"]["SUBSTITUICAO"], 0);
}

// ── Notifications ────────────────────────────────────────────────────────────

const NOTIFICATIONS: &str = "/functions/v1/sinapi-notifications";

#[tokio::test]
async fn sweep_notifies_once_per_change() {
  let (state, _) = state().await;

  let body = json_body(post(state.clone(), NOTIFICATIONS, json!({ "tipo": "sweep" })).await).await;
  assert_eq!(body["sucesso"], true);
  assert_eq!(body["tipo_resposta"], "varredura_concluida");
  assert_eq!(body["dados"]["varredura"]["codigos_alterados"], json!(["74209/001"]));
  assert_eq!(body["dados"]["notificacoes_enviadas"], 1);

  // Snapshots now match; nothing new to report.
  let body = json_body(post(state.clone(), NOTIFICATIONS, json!({ "tipo": "sweep" })).await).await;
  assert_eq!(body["dados"]["notificacoes_enviadas"], 0);

  let resp = send(
    state,
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({ "tipo": "listar_notificacoes", "dados": { "filtros": { "apenas_nao_lidas": true } } })),
  )
  .await;
  let body = json_body(resp).await;
  let listed = body["dados"]["notificacoes"].as_array().unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0]["codigos_impactados"], json!(["74209/001"]));
}

#[tokio::test]
async fn tenant_scoped_modes_require_the_header() {
  let (state, _) = state().await;
  let resp = post(state, NOTIFICATIONS, json!({ "tipo": "listar_notificacoes" })).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_accepts_numeric_codes() {
  let (state, _) = state().await;
  let body = json_body(
    post(
      state,
      NOTIFICATIONS,
      json!({ "tipo": "webhook", "dados": { "codigos_alterados": [1379] } }),
    )
    .await,
  )
  .await;
  assert_eq!(body["tipo_resposta"], "webhook_processado");
  assert_eq!(body["dados"]["notificacoes_enviadas"], 1);
  let impactos = body["dados"]["impactos_encontrados"].as_array().unwrap();
  assert_eq!(impactos[0]["nome_orcamento"], "Residencial Aurora");
  assert_eq!(impactos[0]["codigos_impactados"], json!(["1379"]));
}

#[tokio::test]
async fn recent_maintenance_shows_up_as_impact() {
  let (state, store) = state().await;
  let mut ev = NewEvent::new("1379", MaintenanceKind::Alteracao, Utc::now().date_naive());
  ev.valor_anterior = Some(rust_decimal_macros::dec!(0.85));
  ev.valor_novo = Some(rust_decimal_macros::dec!(0.99));
  store.append_event(&ev).await.unwrap();

  let resp = send(
    state,
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({ "tipo": "verificar_impactos" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  let impactos = body["dados"]["impactos_encontrados"].as_array().unwrap();
  assert_eq!(impactos.len(), 1);
  assert_eq!(impactos[0]["tipo_impacto"], "alteracao");
  assert_eq!(impactos[0]["urgencia"], "media");
}

#[tokio::test]
async fn impact_window_is_bounded() {
  let (state, _) = state().await;
  let resp = send(
    state,
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({ "tipo": "verificar_impactos", "dados": { "janela_dias": 200_000_000 } })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("janela_dias"));
}

#[tokio::test]
async fn preferences_are_saved_for_the_tenant() {
  let (state, store) = state().await;
  let resp = send(
    state,
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({
      "tipo": "configurar_preferencias",
      "dados": { "preferencias": {
        "email_ativo": true,
        "notif_desktop": false,
        "codigos_favoritos": [1379, "74209/001", 1379],
        "tipos_alteracao": ["DESATIVACAO", "Alteração de preço"]
      } }
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["tipo_resposta"], "preferencias_configuradas");
  assert_eq!(body["dados"]["preferencias_salvas"], true);
  assert_eq!(body["dados"]["preferencias"]["codigos_favoritos"], json!(["1379", "74209/001"]));

  let saved = store.preferences(crate::testing::tenant()).await.unwrap().unwrap();
  assert!(saved.email_ativo);
  assert_eq!(saved.tipos_alteracao, vec![
    MaintenanceKind::Desativacao,
    MaintenanceKind::Alteracao
  ]);
}

#[tokio::test]
async fn preferences_need_a_body_and_known_kinds() {
  let (state, _) = state().await;
  let resp = send(
    state.clone(),
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({ "tipo": "configurar_preferencias" })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = send(
    state,
    "POST",
    NOTIFICATIONS,
    tenant_header(),
    Some(json!({
      "tipo": "configurar_preferencias",
      "dados": { "preferencias": { "tipos_alteracao": ["RENOMEACAO"] } }
    })),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error"].as_str().unwrap().contains("RENOMEACAO"));
}
