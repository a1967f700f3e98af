//! tappass-server binary.
//!
//! Loads [`ServerConfig`] from a TOML file layered under `TAPPASS_*`
//! environment variables, opens the SQLite store, starts one scan controller
//! per `[[readers]]` entry, and serves the JSON API.
//!
//! # Operator password
//!
//! `auth_password_hash` is an argon2 PHC string. Produce one with:
//!
//! ```text
//! tappass-server --hash-password
//! ```

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tappass_api::ApiState;
use tappass_server::ServerConfig;
use tappass_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "TapPass access-control server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Hash an operator password read from stdin, print it, and exit.
  #[arg(long)]
  hash_password: bool,
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
    println!("{}", hash_operator_password()?);
    return Ok(());
  }

  let server_cfg = load_config(&cli.config)?;

  let db_path = resolve_home(&server_cfg.store_path);
  let store = Arc::new(
    SqliteStore::open(&db_path)
      .await
      .with_context(|| format!("failed to open store at {}", db_path.display()))?,
  );

  let readers = server_cfg
    .build_readers(&store)
    .context("invalid [[readers]] configuration")?;
  if readers.is_empty() {
    tracing::warn!("no readers configured; scan endpoints will return 404");
  }
  for reader in &readers {
    let ctx = reader.reader();
    tracing::info!(reader = %ctx.reader_id, location = %ctx.location, "reader ready");
  }

  let app = tappass_server::router(ApiState::new(store, readers), Arc::new(server_cfg.auth()));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(%address, "tappass-server listening");

  axum::serve(listener, app).await.context("server error")
}

/// `config.toml` (optional) with `TAPPASS_*` variables on top.
fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("TAPPASS"))
    .build()
    .with_context(|| format!("failed to read {}", path.display()))?
    .try_deserialize()
    .context("invalid server configuration")
}

/// Prompt for a password on stdin and return its argon2 PHC string.
fn hash_operator_password() -> anyhow::Result<String> {
  print!("Operator password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  let password = line.trim_end_matches(['\r', '\n']);

  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
  Ok(hash.to_string())
}

/// `~/tappass.db` → `$HOME/tappass.db`; other paths are returned as given.
fn resolve_home(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
