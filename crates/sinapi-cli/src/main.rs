//! `sinapi`: command-line client for the SINAPI reconciliation API.
//!
//! # Usage
//!
//! ```text
//! sinapi --url http://localhost:8080 --user alice --password secret search cimento
//! sinapi validate 74209/001 1379 --preco-orcado 10.50
//! sinapi validate 92915 --alternativas
//! sinapi history 74209/001
//! sinapi --tenant 6f1c2d8e-93a4-4b7e-9a51-0c7d3e5f2a10 notify list --unread
//! sinapi --tenant 6f1c2d8e-93a4-4b7e-9a51-0c7d3e5f2a10 notify prefs --email --tipo DESATIVACAO
//! sinapi --config ~/.config/sinapi/config.toml stats
//! ```

mod client;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sinapi_core::{price::Fonte, search::SearchFilters, validation::CodeCheck};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sinapi", about = "Query and reconcile SINAPI reference prices")]
struct Args {
  /// Path to a TOML config file (url, username, password, tenant).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the server (default: http://localhost:8080).
  #[arg(long, env = "SINAPI_URL")]
  url: Option<String>,

  /// API username.
  #[arg(long, env = "SINAPI_USER")]
  user: Option<String>,

  /// API password (plaintext).
  #[arg(long, env = "SINAPI_PASSWORD")]
  password: Option<String>,

  /// Tenant id for tenant-scoped notification calls.
  #[arg(long, env = "SINAPI_TENANT")]
  tenant: Option<String>,

  /// Print raw JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search canonical items by description or exact code.
  Search {
    termo:          String,
    #[arg(long)]
    estado:         Option<String>,
    #[arg(long, value_parser = parse_fonte)]
    fonte:          Option<Fonte>,
    #[arg(long)]
    categoria:      Option<String>,
    #[arg(long)]
    pagina:         Option<usize>,
    #[arg(long)]
    tamanho_pagina: Option<usize>,
  },
  /// Validate one or more codes.
  Validate {
    #[arg(required = true)]
    codigos:      Vec<String>,
    /// Budgeted unit price, compared against the latest change.
    #[arg(long)]
    preco_orcado: Option<Decimal>,
    /// Preferred state (UF) for the current item.
    #[arg(long)]
    estado:       Option<String>,
    /// Suggest similar codes for deactivated ones without a substitute.
    #[arg(long)]
    alternativas: bool,
  },
  /// Maintenance timeline of a code.
  History { codigo: String },
  /// Maintenance log statistics.
  Stats,
  /// Notification jobs and listings.
  Notify {
    #[command(subcommand)]
    action: NotifyCommand,
  },
}

#[derive(Subcommand, Debug)]
enum NotifyCommand {
  /// Re-validate tracked codes and notify budgets whose codes changed.
  Sweep,
  /// Notify budgets referencing the given changed codes.
  Webhook {
    #[arg(required = true)]
    codigos: Vec<String>,
  },
  /// Budgets of the tenant hit by recent maintenance.
  Impacts {
    #[arg(long)]
    janela_dias: Option<u32>,
  },
  /// The tenant's notifications, newest first.
  List {
    #[arg(long)]
    unread: bool,
    #[arg(long)]
    limite: Option<usize>,
  },
  /// Replace the tenant's notification preferences.
  Prefs {
    #[arg(long)]
    email:     bool,
    #[arg(long)]
    desktop:   bool,
    /// Code to follow; repeatable.
    #[arg(long = "favorito")]
    favoritos: Vec<String>,
    /// Change kind worth notifying (e.g. DESATIVACAO); repeatable.
    #[arg(long = "tipo")]
    tipos:     Vec<String>,
  },
}

fn parse_fonte(s: &str) -> Result<Fonte, String> { Fonte::parse(s).map_err(|e| e.to_string()) }

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:      String,
  #[serde(default)]
  username: String,
  #[serde(default)]
  password: String,
  #[serde(default)]
  tenant:   String,
}

fn non_empty(s: &str) -> Option<String> { (!s.is_empty()).then(|| s.to_owned()) }

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags and env override the config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| non_empty(&file_cfg.url))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    username: args
      .user
      .or_else(|| non_empty(&file_cfg.username))
      .unwrap_or_default(),
    password: args
      .password
      .or_else(|| non_empty(&file_cfg.password))
      .unwrap_or_default(),
    tenant:   args.tenant.or_else(|| non_empty(&file_cfg.tenant)),
  };

  let client = ApiClient::new(api_config)?;
  let json = args.json;
  let out = run(&client, args.command, json).await?;
  print!("{out}");
  Ok(())
}

/// Render `value` as pretty JSON or through `text`.
fn show<T: serde::Serialize>(value: &T, json: bool, text: impl FnOnce(&T) -> String) -> Result<String> {
  if json {
    Ok(serde_json::to_string_pretty(value)? + "\n")
  } else {
    Ok(text(value))
  }
}

async fn run(client: &ApiClient, command: Command, json: bool) -> Result<String> {
  match command {
    Command::Search { termo, estado, fonte, categoria, pagina, tamanho_pagina } => {
      let filters = SearchFilters { termo, estado, fonte, categoria, pagina, tamanho_pagina };
      let page = client.search(&filters).await?;
      show(&page, json, render::search_page)
    }
    Command::Validate { codigos, preco_orcado, estado, alternativas } => {
      if let [codigo] = codigos.as_slice() {
        let result = client
          .validate(codigo, preco_orcado, estado.as_deref(), alternativas)
          .await?;
        return show(&result, json, render::validation);
      }
      let itens: Vec<CodeCheck> = codigos
        .into_iter()
        .map(|codigo| CodeCheck { codigo, preco_orcado, estado: estado.clone() })
        .collect();
      let batch = client.validate_batch(&itens, alternativas).await?;
      show(&batch, json, render::batch)
    }
    Command::History { codigo } => {
      let history = client.history(&codigo).await?;
      show(&history, json, render::history)
    }
    Command::Stats => {
      let stats = client.stats().await?;
      show(&stats, json, render::stats)
    }
    Command::Notify { action } => {
      let body = match action {
        NotifyCommand::Sweep => json!({ "tipo": "sweep" }),
        NotifyCommand::Webhook { codigos } => {
          json!({ "tipo": "webhook", "dados": { "codigos_alterados": codigos } })
        }
        NotifyCommand::Impacts { janela_dias } => {
          json!({ "tipo": "verificar_impactos", "dados": { "janela_dias": janela_dias } })
        }
        NotifyCommand::List { unread, limite } => json!({
          "tipo": "listar_notificacoes",
          "dados": { "filtros": { "apenas_nao_lidas": unread, "limite": limite } }
        }),
        NotifyCommand::Prefs { email, desktop, favoritos, tipos } => json!({
          "tipo": "configurar_preferencias",
          "dados": { "preferencias": {
            "email_ativo": email,
            "notif_desktop": desktop,
            "codigos_favoritos": favoritos,
            "tipos_alteracao": tipos
          } }
        }),
      };
      let result = client.notifications(&body).await?;
      show(&result, json, render::notifications)
    }
  }
}
