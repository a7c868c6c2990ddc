//! Shield license gate CLI.
//!
//! Runs the startup check and the other gate operations against a
//! file-backed store, mostly for support and integration testing.
//!
//! Usage:
//!   shield --config shield.json check
//!   shield status
//!   shield activate ABCD-1234

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shield_cli::{build_gate, load_config, open_payload, open_store};
use shield_gate::Verdict;
use shield_license::{LicenseStateMachine, Reachability};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "shield")]
#[command(about = "Offline-capable license gate")]
struct Args {
    /// JSON configuration file (defaults apply to missing fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Credential store file (defaults to the per-user data directory)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Treat the network as unreachable
    #[arg(long)]
    offline: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the startup license check
    Check,
    /// Print the license record
    Status,
    /// Redeem a license key
    Activate { key: String },
    /// Verify a signed `payload|signature` string and print its fields
    VerifyPayload { payload: String },
    /// Wipe the license record
    Reset {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_deref())?;
    let store = open_store(args.store.as_deref())?;
    let reachability = if args.offline {
        Reachability::None
    } else {
        Reachability::Full
    };

    match args.command {
        Command::Check => {
            let gate = build_gate(config, store, reachability)?;
            let verdict = gate.check_license().await;
            gate.shutdown();
            match verdict {
                Verdict::Allow => println!("allowed"),
                Verdict::Deny(reason) => bail!("denied: {reason}"),
            }
        }
        Command::Status => {
            let gate = build_gate(config, store, reachability)?;
            println!("{}", serde_json::to_string_pretty(&gate.info())?);
        }
        Command::Activate { key } => {
            let gate = build_gate(config, store, reachability)?;
            match gate.activate_with_key(&key).await {
                Verdict::Allow => {
                    let info = gate.info();
                    match info.expires_at {
                        Some(expiry) => println!("activated until {}", expiry.to_rfc3339()),
                        None => println!("activated"),
                    }
                }
                Verdict::Deny(reason) => bail!("activation failed: {reason}"),
            }
        }
        Command::VerifyPayload { payload } => {
            let payload = open_payload(&config, &payload)?;
            println!("{}", serde_json::to_string_pretty(payload.fields())?);
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("refusing to wipe the license record without --yes");
            }
            LicenseStateMachine::new(config, store).reset()?;
            println!("license record wiped");
        }
    }

    Ok(())
}
