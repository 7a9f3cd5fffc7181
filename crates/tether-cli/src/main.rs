//! `tether` — command-line driver for the reconciliation engine.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! on-device SQLite store, and wires a [`Session`] to the three remote
//! services.
//!
//! ```text
//! tether signup a@b.com --name Alice
//! tether status
//! tether sync
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tether_core::{identity::Identity, record::ProfilePatch};
use tether_engine::Session;
use tether_remote::{BillingClient, IdentityClient, RecordClient, RemoteConfig};
use tether_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Tether identity engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Show the active identity and local snapshot.
  Status,
  /// Promote the current guest to a registered account.
  Signup {
    email: String,
    /// Display name to record on the new account.
    #[arg(long)]
    name:  Option<String>,
  },
  /// Sign in to an existing account, restoring its backend record.
  Signin { email: String },
  /// Sign out and start a fresh guest session.
  Signout,
  /// Update profile fields on the current identity.
  Profile {
    #[arg(long)]
    name:     Option<String>,
    #[arg(long)]
    username: Option<String>,
  },
  /// Complete pending backend writes and reconcile entitlement.
  Sync,
  /// Purchase a plan with the billing provider.
  Purchase { plan_id: String },
  /// Re-validate past purchases with the billing provider.
  Restore,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the TOML config file (overridable via `TETHER_*` env vars).
#[derive(Debug, Deserialize)]
struct CliConfig {
  /// Path to the SQLite store; `~` is expanded.
  store_path: PathBuf,
  remote:     RemoteConfig,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TETHER").separator("__"))
    .build()
    .context("failed to read config file")?;

  let cfg: CliConfig = settings
    .try_deserialize()
    .context("failed to deserialise CliConfig")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let session = Session::new(
    store,
    IdentityClient::new(&cfg.remote)?,
    RecordClient::new(&cfg.remote)?,
    BillingClient::new(&cfg.remote)?,
  );

  match cli.command {
    Command::Status => {
      let identity = session.ensure_identity().await?;
      print_identity(&identity);
      if let Some(snap) = session.snapshot().await? {
        println!(
          "plan: {} ({:?}){}",
          snap.entitlement.plan,
          snap.entitlement.status,
          if snap.dirty { ", pending backend sync" } else { "" }
        );
        if let Some(at) = snap.last_synced_at {
          println!("last synced: {at}");
        }
      }
    }

    Command::Signup { email, name } => {
      session.ensure_identity().await?;
      let password = prompt_password()?;
      let outcome =
        session.promote(&email, &password, name.as_deref()).await?;
      print_identity(&outcome.identity);
      if outcome.pending_sync {
        println!("backend record write pending; run `tether sync` later");
      }
    }

    Command::Signin { email } => {
      let password = prompt_password()?;
      let identity = session.sign_in(&email, &password).await?;
      print_identity(&identity);
    }

    Command::Signout => {
      let identity = session.sign_out().await?;
      print_identity(&identity);
    }

    Command::Profile { name, username } => {
      let profile = session
        .update_profile(&ProfilePatch {
          display_name: name,
          username,
          avatar_url: None,
        })
        .await?;
      println!(
        "profile: {} (@{})",
        profile.display_name.as_deref().unwrap_or("-"),
        profile.username.as_deref().unwrap_or("-")
      );
    }

    Command::Sync => {
      session.flush_dirty().await?;
      let effective = session.sync_entitlement().await?;
      println!("entitlement: {} ({:?})", effective.plan, effective.status);
    }

    Command::Purchase { plan_id } => {
      let effective = session.purchase(&plan_id).await?;
      println!("entitlement: {} ({:?})", effective.plan, effective.status);
    }

    Command::Restore => {
      let effective = session.restore_purchases().await?;
      println!("entitlement: {} ({:?})", effective.plan, effective.status);
    }
  }

  Ok(())
}

fn print_identity(identity: &Identity) {
  match identity {
    Identity::Guest { local_id } => println!("guest ({local_id})"),
    Identity::Registered { provider_id, email } => {
      println!("registered: {email} ({provider_id})");
    }
  }
}

/// Read a password from stdin.
fn prompt_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
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
