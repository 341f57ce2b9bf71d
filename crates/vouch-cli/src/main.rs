//! `vouch`, the command line client for the verification server.
//!
//! # Usage
//!
//! ```
//! vouch create --first-name Ana --last-name Ruiz --document-id X1
//! vouch status 5b29f141-d1a8-44f5-b35e-cf7a7d0c8f2a
//! vouch status --document-id X1
//! vouch webhook 5b29f141-d1a8-44f5-b35e-cf7a7d0c8f2a --status COMPLETED
//! ```

mod client;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client::ApiClient;
use serde::Deserialize;
use vouch_core::{
  session::SessionView,
  signature::SignatureVerifier,
  sync::CreateSessionRequest,
};

// ─── Arguments ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
  name = "vouch",
  about = "Command line client for the vouch verification server"
)]
struct Args {
  /// Path to a TOML config file (url, webhook_secret).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<std::path::PathBuf>,

  /// Base URL of the vouch server (default: http://localhost:8787).
  #[arg(long, env = "VOUCH_URL", global = true)]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Start a verification session for a new subject.
  Create {
    #[arg(long)]
    first_name:    String,
    #[arg(long)]
    last_name:     String,
    #[arg(long)]
    document_id:   String,
    /// Document kind, e.g. "passport".
    #[arg(long)]
    document_type: Option<String>,
    /// Provider feature flags (default: OCR).
    #[arg(long)]
    features:      Option<String>,
    /// Correlation tag echoed back in webhooks (default: the document id).
    #[arg(long)]
    vendor_data:   Option<String>,
  },
  /// Show a session, looked up by session id or by document id.
  Status {
    /// Provider session identifier.
    session_id:  Option<String>,
    /// Look up the newest session for a document instead.
    #[arg(long, conflicts_with = "session_id")]
    document_id: Option<String>,
  },
  /// Ask the provider to override a session's status.
  Override {
    session_id: String,
    /// New provider status label, e.g. "Approved" or "Declined".
    #[arg(long)]
    status:     String,
    #[arg(long)]
    comment:    Option<String>,
  },
  /// Fetch the provider's decision report for a session.
  Decision { session_id: String },
  /// Send a provider-shaped webhook to the server, signed like the real one.
  Webhook {
    session_id:  String,
    /// Provider status label (COMPLETED, REJECTED, FAILED, EXPIRED, PENDING).
    #[arg(long, default_value = "COMPLETED")]
    status:      String,
    /// HMAC key; omit to send the delivery unsigned.
    #[arg(long, env = "VOUCH_WEBHOOK_SECRET")]
    secret:      Option<String>,
    /// Correlation tag to embed in the payload.
    #[arg(long)]
    vendor_data: Option<String>,
  },
}

// ─── TOML config ──────────────────────────────────────────────────────────────

/// Keys the optional config file may set.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:            String,
  #[serde(default)]
  webhook_secret: String,
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let file_cfg = match &args.config {
    Some(path) => {
      let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
      toml::from_str::<ConfigFile>(&raw)
        .with_context(|| format!("could not parse {}", path.display()))?
    }
    None => ConfigFile::default(),
  };

  // Precedence: flag, then config file, then the default.
  let base_url = args
    .url
    .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
    .unwrap_or_else(|| "http://localhost:8787".to_string());
  let file_secret =
    (!file_cfg.webhook_secret.is_empty()).then(|| file_cfg.webhook_secret.clone());

  let client = ApiClient::new(base_url)?;

  match args.command {
    Command::Create {
      first_name,
      last_name,
      document_id,
      document_type,
      features,
      vendor_data,
    } => {
      let created = client
        .create_session(&CreateSessionRequest {
          first_name: Some(first_name),
          last_name: Some(last_name),
          document_id: Some(document_id),
          document_type,
          features,
          vendor_data,
        })
        .await?;
      println!("session_id:       {}", created.session_id);
      println!("verification_url: {}", created.verification_url);
      if let Some(expires) = created.expires_at {
        println!("expires_at:       {expires}");
      }
    }

    Command::Status {
      session_id,
      document_id,
    } => {
      let view = match (session_id, document_id) {
        (Some(id), None) => client.session(&id).await?,
        (None, Some(doc)) => client.session_by_document(&doc).await?,
        _ => bail!("pass a session id or --document-id"),
      };
      print_view(&view);
    }

    Command::Override {
      session_id,
      status,
      comment,
    } => {
      let remote = client
        .override_status(&session_id, &status, comment.as_deref())
        .await?;
      println!(
        "provider accepted: {} is now {}",
        remote.session_id,
        remote.status.as_deref().unwrap_or("(unreported)")
      );
    }

    Command::Decision { session_id } => {
      let decision = client.decision(&session_id).await?;
      println!("{}", serde_json::to_string_pretty(&decision)?);
    }

    Command::Webhook {
      session_id,
      status,
      secret,
      vendor_data,
    } => {
      let mut payload = serde_json::json!({
        "id":        session_id,
        "status":    status,
        "timestamp": Utc::now().to_rfc3339(),
      });
      if let Some(tag) = vendor_data {
        payload["vendor_data"] = serde_json::Value::String(tag);
      }
      let body = serde_json::to_vec(&payload)?;

      // The signature must cover the exact bytes sent.
      let secret = secret.or(file_secret);
      let signature = secret.as_deref().map(|s| SignatureVerifier::sign(s, &body));
      println!("payload:   {payload}");
      match &signature {
        Some(sig) => println!("signature: {sig}"),
        None => println!("signature: (none, sending unsigned)"),
      }

      let outcome = client.post_webhook(body, signature.as_deref()).await?;
      println!(
        "{}: {} is now {}",
        outcome.message, outcome.session_id, outcome.status
      );
    }
  }

  Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_view(view: &SessionView) {
  let session_id = view.session_id.as_deref().unwrap_or("(provisional)");
  println!("session_id:  {session_id}");
  println!("status:      {}", view.status);
  println!("subject:     {} {}", view.first_name, view.last_name);
  println!("document_id: {}", view.document_id);
  println!("created_at:  {}", view.created_at);
  println!("updated_at:  {}", view.updated_at);
}
