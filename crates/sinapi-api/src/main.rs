//! sinapi-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `SINAPI_*` environment variables, opens the configured backend and serves
//! the JSON API over HTTP.
//!
//! # Helper modes
//!
//! ```text
//! sinapi-server --hash-password            # argon2 PHC string for auth_password_hash
//! sinapi-server --import dataset.json      # load a dataset into the sqlite backend
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use sinapi_api::{AppState, BackendConfig, ServerConfig};
use sinapi_core::store::TrackingStore;
use sinapi_store_rest::RestStore;
use sinapi_store_sqlite::{Dataset, SqliteStore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SINAPI reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Import a JSON dataset into the sqlite backend and exit.
  #[arg(long, value_name = "DATASET")]
  import: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SINAPI").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  match &server_cfg.backend {
    BackendConfig::Sqlite { path } => {
      let path = expand_tilde(path);
      let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?;

      if let Some(dataset_path) = &cli.import {
        let dataset = Dataset::load(dataset_path)
          .await
          .with_context(|| format!("failed to read dataset {dataset_path:?}"))?;
        let summary = store
          .import_dataset(&dataset)
          .await
          .context("dataset import failed")?;
        tracing::info!(
          precos = summary.precos,
          manutencoes = summary.manutencoes,
          codigos_rastreados = summary.codigos_rastreados,
          "dataset imported"
        );
        return Ok(());
      }

      serve(store, &server_cfg).await
    }
    BackendConfig::Rest(rest) => {
      if cli.import.is_some() {
        bail!("--import needs the sqlite backend; the REST tables are loaded upstream");
      }
      let store = RestStore::new(rest).context("failed to build REST client")?;
      serve(store, &server_cfg).await
    }
  }
}

async fn serve<S>(store: S, config: &ServerConfig) -> anyhow::Result<()>
where
  S: TrackingStore + 'static,
{
  let state = AppState::new(Arc::new(store), config);
  let app = sinapi_api::router(state);
  let address = format!("{}:{}", config.host, config.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
