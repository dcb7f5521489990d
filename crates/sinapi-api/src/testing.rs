//! Fixtures shared by the API tests.

use std::{path::PathBuf, sync::Arc};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::NaiveDate;
use rand_core::OsRng;
use rust_decimal_macros::dec;
use sinapi_core::{
  maintenance::MaintenanceKind,
  price::{Fonte, PriceItem},
  tenant::TenantId,
};
use sinapi_store_sqlite::{
  SqliteStore,
  dataset::{BudgetRecord, Dataset, NewEvent},
};
use uuid::Uuid;

use crate::{AppState, BackendConfig, ServerConfig};

pub const TENANT: &str = "0a0a0a0a-0a0a-0a0a-0a0a-0a0a0a0a0a0a";

pub fn tenant() -> TenantId { TENANT.parse().unwrap() }

pub fn budget_id() -> Uuid { Uuid::from_bytes([7; 16]) }

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

pub fn basic(user: &str, pass: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

pub fn price(codigo: &str, descricao: &str, preco: rust_decimal::Decimal) -> PriceItem {
  PriceItem {
    codigo:          codigo.into(),
    descricao:       descricao.into(),
    unidade:         "UN".into(),
    preco_unitario:  preco,
    fonte:           Fonte::Insumos,
    estado:          "SP".into(),
    data_referencia: date(2024, 1, 1),
    categoria:       "MATERIAIS".into(),
  }
}

/// Three codes: `1379` clean, `74209/001` altered then deactivated in
/// favour of `74209/002`. One budget of [`TENANT`] tracks the first two.
pub fn dataset() -> Dataset {
  let mut alteracao = NewEvent::new("74209/001", MaintenanceKind::Alteracao, date(2023, 1, 1));
  alteracao.valor_anterior = Some(dec!(10));
  alteracao.valor_novo = Some(dec!(12));
  let mut desativacao =
    NewEvent::new("74209/001", MaintenanceKind::Desativacao, date(2023, 6, 1));
  desativacao.codigo_substituto = Some("74209/002".into());

  Dataset {
    precos:      vec![
      price("1379", "CIMENTO PORTLAND CP II-32", dec!(0.85)),
      price("74209/001", "PORTA DE MADEIRA", dec!(512.30)),
      price("74209/002", "PORTA DE MADEIRA SEMI-OCA", dec!(530.00)),
    ],
    manutencoes: vec![alteracao, desativacao],
    orcamentos:  vec![BudgetRecord {
      orcamento_id:   budget_id(),
      tenant_id:      tenant(),
      nome_orcamento: "Residencial Aurora".into(),
      codigos:        vec!["1379".into(), "74209/001".into()],
    }],
  }
}

pub fn config(password_hash: String) -> ServerConfig {
  ServerConfig {
    host:                "127.0.0.1".into(),
    port:                8080,
    backend:             BackendConfig::Sqlite { path: PathBuf::from(":memory:") },
    auth_username:       "user".into(),
    auth_password_hash:  password_hash,
    limiar_variacao:     dec!(0.10),
    janela_recente_dias: 30,
    cache_ttl_secs:      300,
    cache_capacity:      1_000,
  }
}

/// State over a seeded in-memory store accepting `user:secret`. The store
/// is returned too so tests can add rows behind the cache.
pub async fn state() -> (AppState<SqliteStore>, Arc<SqliteStore>) {
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(b"secret", &salt)
    .unwrap()
    .to_string();

  let store = SqliteStore::open_in_memory().await.unwrap();
  store.import_dataset(&dataset()).await.unwrap();
  let store = Arc::new(store);
  (AppState::new(store.clone(), &config(hash)), store)
}
