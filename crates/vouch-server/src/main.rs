//! vouchd server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! session store, and serves the verification API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vouch_core::{signature::SignatureVerifier, sync::SyncEngine};
use vouch_provider::HttpProviderClient;
use vouch_server::{AppState, ServerConfig};
use vouch_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "KYC verification session server")]
struct Cli {
  /// TOML configuration file to load.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Tracing before anything that can fail.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Configuration: file first, then VOUCH_ environment overrides.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("VOUCH")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to parse ServerConfig")?;

  // Open the SQLite store.
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let provider = HttpProviderClient::new(server_cfg.provider.clone())
    .context("failed to build provider client")?;

  let verifier = match &server_cfg.webhook_secret {
    Some(secret) => SignatureVerifier::new(secret.clone()),
    None => {
      tracing::warn!(
        "webhook_secret is unset; webhook signatures will NOT be verified"
      );
      SignatureVerifier::disabled()
    }
  };

  // The provider calls back on {public_base_url}/webhook.
  let callback_url = format!(
    "{}/webhook",
    server_cfg.public_base_url.trim_end_matches('/')
  );

  let store = Arc::new(store);
  let engine = SyncEngine::new(
    Arc::clone(&store),
    Arc::new(provider),
    verifier,
    callback_url,
  );
  let state = AppState {
    engine: Arc::new(engine),
    store,
  };

  let app = vouch_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a `~/` prefix to the user's `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  let text = path.to_string_lossy();
  match (text.strip_prefix("~/"), std::env::var("HOME")) {
    (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
