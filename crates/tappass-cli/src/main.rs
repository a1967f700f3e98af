//! `tappass`: operator command line for a TapPass server.
//!
//! # Usage
//!
//! ```text
//! tappass --url http://localhost:8080 --user operator --password secret lookup badge-1
//! tappass scan --reader lobby badge-1
//! tappass scan --reader lobby badge-1 --deny --reason "photo mismatch"
//! tappass scan --reader lobby badge-1 --review
//! tappass finalize --reader lobby <cycle-id> --grant --reason "escorted"
//! tappass log --digital-id badge-1 --limit 20
//! ```

mod client;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client::{ApiClient, ApiConfig, LogFilter};
use serde::Deserialize;
use tappass_core::{
  credential::{AccessLevel, Credential, DigitalId, NewCredential, Role},
  session::{OperatorAction, PendingDecision, ScanResult},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tappass", about = "Operator command line for TapPass readers")]
struct Args {
  /// Path to a TOML config file (url, username, password).
  #[arg(short, long, value_name = "FILE")]
  config: Option<std::path::PathBuf>,

  /// Base URL of the TapPass server (default: http://localhost:8080).
  #[arg(long, env = "TAPPASS_URL")]
  url: Option<String>,

  /// API username.
  #[arg(long, env = "TAPPASS_USER")]
  user: Option<String>,

  /// API password (plaintext).
  #[arg(long, env = "TAPPASS_PASSWORD")]
  password: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the credential behind a digital ID.
  Lookup { digital_id: String },

  /// Show the shareable badge card for a digital ID.
  Badge { digital_id: String },

  /// Issue a new credential.
  Register {
    #[arg(long)]
    user_id:      Uuid,
    #[arg(long)]
    name:         String,
    #[arg(long)]
    role:         String,
    #[arg(long)]
    access_level: String,
    /// Issued by the server when omitted.
    #[arg(long)]
    digital_id:   Option<String>,
    #[arg(long)]
    department:   Option<String>,
    #[arg(long)]
    phone:        Option<String>,
  },

  /// Re-enable a credential.
  Activate { digital_id: String },

  /// Disable a credential; it will be denied at every reader.
  Deactivate { digital_id: String },

  /// List configured readers and what they are doing.
  Readers,

  /// Scan a badge at a reader and record the decision.
  Scan {
    #[arg(long)]
    reader:     String,
    digital_id: String,
    /// Stop after evaluation and leave the decision pending.
    #[arg(long, conflicts_with_all = ["grant", "deny"])]
    review:     bool,
    #[command(flatten)]
    action:     ActionArgs,
  },

  /// Record the pending decision of a scan started with `--review`.
  Finalize {
    #[arg(long)]
    reader:   String,
    cycle_id: Uuid,
    #[command(flatten)]
    action:   ActionArgs,
  },

  /// Abandon the current scan at a reader without recording anything.
  Cancel {
    #[arg(long)]
    reader: String,
  },

  /// Show recorded access attempts, newest first.
  Log {
    #[arg(long)]
    digital_id: Option<String>,
    #[arg(long)]
    reader:     Option<String>,
    /// Only granted (`true`) or denied (`false`) attempts.
    #[arg(long)]
    granted:    Option<bool>,
    #[arg(long)]
    limit:      Option<usize>,
  },
}

/// How the operator resolves a pending decision.
#[derive(ClapArgs, Debug)]
struct ActionArgs {
  /// Override the decision and grant entry.
  #[arg(long, conflicts_with = "deny")]
  grant:  bool,
  /// Override the decision and deny entry.
  #[arg(long)]
  deny:   bool,
  /// Override reason, or a note kept with an accepted decision.
  #[arg(long)]
  reason: Option<String>,
}

impl ActionArgs {
  fn into_action(self) -> OperatorAction {
    match (self.grant, self.deny) {
      (true, _) => OperatorAction::ManualGrant { reason: self.reason },
      (_, true) => OperatorAction::ManualDeny { reason: self.reason },
      _ => OperatorAction::Accept { note: self.reason },
    }
  }
}

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
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    username: args
      .user
      .or_else(|| (!file_cfg.username.is_empty()).then(|| file_cfg.username.clone()))
      .unwrap_or_default(),
    password: args
      .password
      .or_else(|| (!file_cfg.password.is_empty()).then(|| file_cfg.password.clone()))
      .unwrap_or_default(),
  };

  let client = ApiClient::new(api_config)?;
  run(&client, args.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
  match command {
    Command::Lookup { digital_id } => {
      print_credential(&client.get_credential(&digital_id).await?);
    }
    Command::Badge { digital_id } => {
      let card = client.badge(&digital_id).await?;
      println!("{}", serde_json::to_string_pretty(&card)?);
    }
    Command::Register {
      user_id,
      name,
      role,
      access_level,
      digital_id,
      department,
      phone,
    } => {
      let role = Role::from(role);
      if !role.is_recognized() {
        bail!("unknown role {role}; expected admin, employee, student, or guest");
      }
      let input = NewCredential {
        digital_id: digital_id.as_deref().map(DigitalId::parse).transpose()?,
        department,
        phone,
        ..NewCredential::new(user_id, name, role, AccessLevel::from(access_level))
      };
      let credential = client.register(&input).await?;
      println!("registered {}", credential.digital_id);
      print_credential(&credential);
    }
    Command::Activate { digital_id } => {
      print_credential(&client.set_active(&digital_id, true).await?);
    }
    Command::Deactivate { digital_id } => {
      print_credential(&client.set_active(&digital_id, false).await?);
    }
    Command::Readers => {
      for reader in client.readers().await? {
        println!(
          "{:<16} {:<14} {:<24} operator {}",
          reader.reader_id,
          reader.phase.as_str(),
          reader.location,
          reader.operator_id,
        );
        if let Some(pending) = reader.pending {
          println!("  pending cycle {}: {}", pending.cycle_id, pending.message);
        }
      }
    }
    Command::Scan { reader, digital_id, review, action } => {
      let pending = client.begin_scan(&reader, &digital_id).await?;
      print_pending(&pending);
      if review {
        println!("cycle {} is awaiting a decision", pending.cycle_id);
        return Ok(());
      }
      let result = client.finalize(&reader, pending.cycle_id, &action.into_action()).await?;
      print_result(&result);
    }
    Command::Finalize { reader, cycle_id, action } => {
      let result = client.finalize(&reader, cycle_id, &action.into_action()).await?;
      print_result(&result);
    }
    Command::Cancel { reader } => {
      client.cancel(&reader).await?;
      println!("scan at {reader} cancelled");
    }
    Command::Log { digital_id, reader, granted, limit } => {
      let filter = LogFilter { digital_id, reader_id: reader, granted, limit };
      for attempt in client.list_attempts(&filter).await? {
        println!(
          "{}  {:<7} {:<12} {:<24} {} @ {} ({}){}",
          attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
          if attempt.granted { "GRANTED" } else { "DENIED" },
          attempt.reader_id,
          attempt.reason.as_str(),
          attempt.digital_id,
          attempt.location,
          attempt.reader_operator_id,
          attempt
            .operator_note
            .as_deref()
            .map(|n| format!("  \"{n}\""))
            .unwrap_or_default(),
        );
      }
    }
  }
  Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_credential(c: &Credential) {
  println!("{}  {}", c.digital_id, c.full_name);
  println!("  role:         {}", c.role);
  println!("  access level: {}", c.access_level);
  println!("  active:       {}", if c.is_active { "yes" } else { "no" });
  if let Some(department) = &c.department {
    println!("  department:   {department}");
  }
  if let Some(phone) = &c.phone {
    println!("  phone:        {phone}");
  }
  println!("  user:         {}", c.user_id);
}

fn print_pending(p: &PendingDecision) {
  let verdict = if p.decision.granted { "would GRANT" } else { "would DENY" };
  println!("{} ({}) at {}: {verdict}", p.credential.full_name, p.credential.digital_id, p.reader_id);
  println!("  {}", p.message);
}

fn print_result(r: &ScanResult) {
  let verdict = if r.granted { "GRANTED" } else { "DENIED" };
  println!("{verdict}: {} ({})", r.full_name, r.digital_id);
  println!("  {}", r.message);
  if r.escort_required {
    println!("  escort required");
  }
  println!("  recorded as {} at {}", r.attempt_id, r.timestamp.to_rfc3339());
}
