//! `RestStore` against an in-process PostgREST stub.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::Duration,
};

use axum::{
  Router,
  extract::{Path, RawQuery, State},
  http::{HeaderMap, Method, StatusCode, header},
  response::{IntoResponse, Response},
  routing::any,
};
use rust_decimal_macros::dec;
use sinapi_core::{
  maintenance::MaintenanceKind,
  notify::{NewNotification, NotificationFilter, NotificationPreferences, Urgencia},
  price::PriceQuery,
  store::{PriceStore, TrackingStore},
  tenant::TenantId,
  validation::{CodeCheck, ValidationConfig, ValidationStatus, validate_batch},
};
use uuid::Uuid;

use crate::{
  Error, RestStore,
  client::{PostgrestClient, RestConfig},
};

/// A canned reply: status, optional `Content-Range`, JSON body.
type Reply = (StatusCode, Option<&'static str>, String);

/// What the stub saw: method, table, raw query, `Prefer` header, body.
#[derive(Debug, Clone)]
struct Seen {
  method: Method,
  table:  String,
  query:  String,
  prefer: Option<String>,
  body:   String,
}

#[derive(Default)]
struct Stub {
  replies: Mutex<VecDeque<Reply>>,
  seen:    Mutex<Vec<Seen>>,
}

impl Stub {
  fn reply(&self, status: StatusCode, range: Option<&'static str>, body: serde_json::Value) {
    self.replies.lock().unwrap().push_back((status, range, body.to_string()));
  }

  fn seen(&self) -> Vec<Seen> { self.seen.lock().unwrap().clone() }
}

async fn handle(
  State(stub): State<Arc<Stub>>,
  Path(table): Path<String>,
  method: Method,
  headers: HeaderMap,
  RawQuery(query): RawQuery,
  body: String,
) -> Response {
  stub.seen.lock().unwrap().push(Seen {
    method,
    table,
    query: query.unwrap_or_default(),
    prefer: headers
      .get("prefer")
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned),
    body,
  });
  let (status, range, body) = stub
    .replies
    .lock()
    .unwrap()
    .pop_front()
    .unwrap_or((StatusCode::OK, None, "[]".to_owned()));
  let mut resp = (status, [(header::CONTENT_TYPE, "application/json")], body).into_response();
  if let Some(range) = range {
    resp
      .headers_mut()
      .insert(header::CONTENT_RANGE, range.parse().unwrap());
  }
  resp
}

async fn spawn(max_retries: u32) -> (RestStore, Arc<Stub>) {
  let stub = Arc::new(Stub::default());
  let app = Router::new()
    .route("/rest/v1/{table}", any(handle))
    .with_state(stub.clone());
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

  let config = RestConfig {
    max_retries,
    timeout_secs: 5,
    ..RestConfig::new(format!("http://{addr}/"), "service-key")
  };
  let client = PostgrestClient::new(&config)
    .unwrap()
    .with_base_backoff(Duration::from_millis(1));
  (RestStore::from_client(client), stub)
}

fn decoded(query: &str) -> String {
  // Enough percent-decoding for assertions on filter syntax.
  query
    .replace("%22", "\"")
    .replace("%28", "(")
    .replace("%29", ")")
    .replace("%2C", ",")
    .replace("%2F", "/")
    .replace("%2A", "*")
}

fn codes(cs: &[&str]) -> Vec<String> { cs.iter().map(|c| c.to_string()).collect() }

fn tenant(n: u8) -> TenantId { TenantId::new(Uuid::from_bytes([n; 16])).unwrap() }

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_prices_uses_in_filter() {
  let (store, stub) = spawn(0).await;
  stub.reply(
    StatusCode::OK,
    None,
    serde_json::json!([{
      "codigo_sinapi": "74209/001",
      "descricao_insumo": "PORTA DE MADEIRA",
      "unidade": "UN",
      "preco_unitario": "512.30",
      "fonte": "composicoes",
      "estado": "SP",
      "mes_referencia": "2024-01-01",
      "tipo_insumo": "ESQUADRIAS"
    }]),
  );

  let items = store.get_prices(&codes(&["74209/001", "1379"])).await.unwrap();

  assert_eq!(items.len(), 1);
  assert_eq!(items[0].preco_unitario, dec!(512.30));
  let seen = stub.seen();
  assert_eq!(seen[0].method, Method::GET);
  assert_eq!(seen[0].table, "sinapi_dados_oficiais");
  assert!(decoded(&seen[0].query).contains(r#"codigo_sinapi=in.("74209/001","1379")"#));
}

#[tokio::test]
async fn empty_code_list_makes_no_request() {
  let (store, stub) = spawn(0).await;
  assert!(store.get_events(&[]).await.unwrap().is_empty());
  assert!(stub.seen().is_empty());
}

#[tokio::test]
async fn search_reads_total_from_content_range() {
  let (store, stub) = spawn(0).await;
  stub.reply(StatusCode::OK, Some("20-20/21"), serde_json::json!([{
    "codigo_sinapi": 1379,
    "descricao_insumo": "CIMENTO PORTLAND",
    "unidade": "KG",
    "preco_unitario": 0.85,
    "fonte": "insumos",
    "estado": "SP",
    "mes_referencia": "2024-01-01"
  }]));

  let q = PriceQuery { texto: Some("cimento".into()), limit: 20, offset: 20, ..Default::default() };
  let page = store.search_prices(&q).await.unwrap();

  assert_eq!(page.total, 21);
  assert_eq!(page.items[0].codigo, "1379");
  let seen = &stub.seen()[0];
  assert_eq!(seen.prefer.as_deref(), Some("count=exact"));
  let query = decoded(&seen.query);
  assert!(query.contains(r#"or=(descricao_insumo.ilike."*cimento*",codigo_sinapi.eq."cimento")"#));
  assert!(query.contains("offset=20"));
}

#[tokio::test]
async fn events_are_decoded_and_ordered_by_backend() {
  let (store, stub) = spawn(0).await;
  stub.reply(StatusCode::OK, None, serde_json::json!([
    { "id": 1, "codigo_sinapi": "74209/001", "tipo_manutencao": "ALTERACAO",
      "data_referencia": "2023-01-01", "valor_anterior": 10, "valor_novo": 12 },
    { "id": 2, "codigo_sinapi": "74209/001", "tipo_manutencao": "DESATIVACAO",
      "data_referencia": "2023-06-01", "codigo_substituto": "74209/002" }
  ]));

  let events = store.get_events(&codes(&["74209/001"])).await.unwrap();

  assert_eq!(events.len(), 2);
  assert_eq!(events[1].tipo_manutencao, MaintenanceKind::Desativacao);
  assert_eq!(events[1].codigo_substituto.as_deref(), Some("74209/002"));
  assert_eq!(events[0].valor_novo, Some(dec!(12)));
  assert!(decoded(&stub.seen()[0].query).contains("order=data_referencia.asc,id.asc"));
}

#[tokio::test]
async fn tally_uses_head_counts() {
  let (store, stub) = spawn(0).await;
  // ALTERACAO, DESATIVACAO, INCLUSAO, SUBSTITUICAO, then recent.
  for range in ["*/4", "*/1", "*/0", "*/0", "*/2"] {
    stub.reply(StatusCode::OK, Some(range), serde_json::json!([]));
  }

  let tally = store
    .tally_events(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    .await
    .unwrap();

  assert_eq!(tally.total, 5);
  assert_eq!(tally.recentes, 2);
  assert_eq!(tally.por_tipo.len(), 2);
  let seen = stub.seen();
  assert!(seen.iter().all(|s| s.method == Method::HEAD));
  let substituicao = decoded(&seen[3].query);
  assert!(substituicao.contains("tipo_manutencao=ilike.*SUBSTITU*"));
  assert!(substituicao.contains("tipo_manutencao=not.ilike.*DESATIV*"));
}

#[tokio::test]
async fn rows_of_unknown_kind_are_skipped() {
  let (store, stub) = spawn(0).await;
  stub.reply(StatusCode::OK, None, serde_json::json!([
    { "id": 1, "codigo_sinapi": "74209/001", "tipo_manutencao": "Normal",
      "data_referencia": "2023-01-01" },
    { "id": 2, "codigo_sinapi": "74209/001", "tipo_manutencao": "COMPOSIÇÃO DESATIVADA",
      "data_referencia": "2023-06-01", "codigo_substituto": "74209/002" }
  ]));

  let events = store.get_events(&codes(&["74209/001"])).await.unwrap();

  assert_eq!(events.len(), 1);
  assert_eq!(events[0].id, 2);
  assert_eq!(events[0].tipo_manutencao, MaintenanceKind::Desativacao);
}

// ─── Retries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn retries_transient_failures() {
  let (store, stub) = spawn(2).await;
  stub.reply(StatusCode::SERVICE_UNAVAILABLE, None, serde_json::json!({}));
  stub.reply(StatusCode::TOO_MANY_REQUESTS, None, serde_json::json!({}));

  assert!(store.get_prices(&codes(&["1379"])).await.unwrap().is_empty());
  assert_eq!(stub.seen().len(), 3);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
  let (store, stub) = spawn(1).await;
  for _ in 0..3 {
    stub.reply(StatusCode::BAD_GATEWAY, None, serde_json::json!({"message": "down"}));
  }

  let err = store.get_prices(&codes(&["1379"])).await.unwrap_err();
  assert!(matches!(err, Error::Status { status: 502, .. }));
  assert_eq!(stub.seen().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
  let (store, stub) = spawn(3).await;
  stub.reply(StatusCode::BAD_REQUEST, None, serde_json::json!({"message": "bad filter"}));

  let err = store.get_prices(&codes(&["1379"])).await.unwrap_err();
  match err {
    Error::Status { status, body, table } => {
      assert_eq!(status, 400);
      assert!(body.contains("bad filter"));
      assert_eq!(table, "sinapi_dados_oficiais");
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(stub.seen().len(), 1);
}

#[tokio::test]
async fn unreachable_backend_degrades_batch_to_indeterminate() {
  let config = RestConfig {
    max_retries: 0,
    timeout_secs: 1,
    ..RestConfig::new("http://127.0.0.1:1", "k")
  };
  let store = RestStore::new(&config).unwrap();

  let out = validate_batch(&store, &ValidationConfig::default(), &[CodeCheck::new("1379")]).await;
  assert_eq!(out[0].status, ValidationStatus::Indeterminado);
  assert!(out[0].erro.is_some());
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshots_are_upserted() {
  let (store, stub) = spawn(0).await;
  store
    .save_snapshots(vec![sinapi_core::notify::StatusSnapshot {
      codigo:        "1379".into(),
      status:        ValidationStatus::Desativado,
      verificado_em: chrono::Utc::now(),
    }])
    .await
    .unwrap();

  let seen = &stub.seen()[0];
  assert_eq!(seen.method, Method::POST);
  assert_eq!(seen.table, "sinapi_status_snapshot");
  assert!(seen.query.contains("on_conflict=codigo_sinapi"));
  assert!(seen.prefer.as_deref().unwrap().contains("merge-duplicates"));
  assert!(seen.body.contains("\"status\":\"DESATIVADO\""));
}

#[tokio::test]
async fn notifications_round_trip_through_representation() {
  let (store, stub) = spawn(0).await;
  let id = Uuid::from_bytes([3; 16]);
  stub.reply(StatusCode::CREATED, None, serde_json::json!([{
    "id": id,
    "tenant_id": tenant(1),
    "orcamento_id": Uuid::from_bytes([9; 16]),
    "tipo": "sinapi_alteracao",
    "titulo": "Códigos alterados",
    "mensagem": "1 código",
    "codigos_impactados": ["1379"],
    "urgencia": "media",
    "lida": false,
    "created_at": "2024-03-10T12:00:00Z"
  }]));

  let created = store
    .create_notifications(vec![NewNotification {
      tenant_id:          tenant(1),
      orcamento_id:       Uuid::from_bytes([9; 16]),
      tipo:               "sinapi_alteracao".into(),
      titulo:             "Códigos alterados".into(),
      mensagem:           "1 código".into(),
      codigos_impactados: codes(&["1379"]),
      urgencia:           Urgencia::Media,
    }])
    .await
    .unwrap();

  assert_eq!(created[0].id, id);
  let seen = &stub.seen()[0];
  assert_eq!(seen.prefer.as_deref(), Some("return=representation"));
  assert!(seen.body.contains("\"urgencia\":\"media\""));
}

#[tokio::test]
async fn inserts_are_not_retried_after_a_response() {
  let (store, stub) = spawn(3).await;
  stub.reply(StatusCode::BAD_GATEWAY, None, serde_json::json!({"message": "gateway"}));

  let err = store
    .create_notifications(vec![NewNotification {
      tenant_id:          tenant(1),
      orcamento_id:       Uuid::from_bytes([9; 16]),
      tipo:               "sinapi_alteracao".into(),
      titulo:             "Códigos alterados".into(),
      mensagem:           "1 código".into(),
      codigos_impactados: codes(&["1379"]),
      urgencia:           Urgencia::Media,
    }])
    .await
    .unwrap_err();

  assert!(matches!(err, Error::Status { status: 502, .. }));
  assert_eq!(stub.seen().len(), 1);
}

#[tokio::test]
async fn listing_filters_by_tenant() {
  let (store, stub) = spawn(0).await;
  let filter = NotificationFilter { apenas_nao_lidas: true, limite: Some(5), ..Default::default() };

  store.list_notifications(tenant(1), &filter).await.unwrap();

  let query = decoded(&stub.seen()[0].query);
  assert!(query.contains(&format!("tenant_id=eq.{}", tenant(1))));
  assert!(query.contains("lida=eq.false"));
  assert!(query.contains("order=created_at.desc"));
  assert!(query.contains("limit=5"));
}

#[tokio::test]
async fn preferences_are_upserted_per_tenant() {
  let (store, stub) = spawn(0).await;
  let prefs = NotificationPreferences {
    email_ativo:       true,
    notif_desktop:     false,
    codigos_favoritos: codes(&["1379"]),
    tipos_alteracao:   vec![MaintenanceKind::Desativacao],
  };
  store.save_preferences(tenant(1), prefs).await.unwrap();

  let seen = &stub.seen()[0];
  assert_eq!(seen.method, Method::POST);
  assert_eq!(seen.table, "usuarios_preferencias_notificacao");
  assert!(seen.query.contains("on_conflict=tenant_id"));
  assert!(seen.prefer.as_deref().unwrap().contains("merge-duplicates"));
  let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
  assert_eq!(body[0]["tenant_id"], tenant(1).to_string());
  assert_eq!(body[0]["codigos_favoritos"], serde_json::json!(["1379"]));
  assert_eq!(body[0]["tipos_alteracao"], serde_json::json!(["DESATIVACAO"]));
  assert!(body[0]["updated_at"].is_string());
}

#[tokio::test]
async fn preferences_are_read_back_by_tenant() {
  let (store, stub) = spawn(0).await;
  stub.reply(
    StatusCode::OK,
    None,
    serde_json::json!([{
      "tenant_id": tenant(2).to_string(),
      "email_ativo": false,
      "notif_desktop": true,
      "codigos_favoritos": [1379],
      "tipos_alteracao": ["INCLUSAO"]
    }]),
  );

  let prefs = store.preferences(tenant(2)).await.unwrap().unwrap();
  assert!(prefs.notif_desktop);
  assert_eq!(prefs.codigos_favoritos, codes(&["1379"]));
  assert_eq!(prefs.tipos_alteracao, vec![MaintenanceKind::Inclusao]);
  assert!(decoded(&stub.seen()[0].query).contains(&format!("tenant_id=eq.{}", tenant(2))));

  assert_eq!(store.preferences(tenant(3)).await.unwrap(), None);
}
