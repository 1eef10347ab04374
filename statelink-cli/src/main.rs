//! statelink shared medium tool
//!
//! Operates on the SQLite file that synchronized contexts share, for
//! inspecting or repairing state from outside the application.
//!
//! Usage:
//!   statelink --db shared.db get app-state --pretty
//!   statelink --db shared.db watch app-state

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use statelink_cli::{clear_snapshot, parse_path, read_snapshot, render, write_snapshot};
use statelink_sync::{SharedChannel, SqliteMedium, SqliteMediumConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "statelink")]
#[command(about = "Inspect and edit a statelink shared medium")]
struct Args {
    /// Path to the shared medium database
    #[arg(short, long, default_value = "statelink.db")]
    db: PathBuf,

    /// Poll interval for `watch`, in milliseconds
    #[arg(long, default_value = "250")]
    poll_ms: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the snapshot stored under a key
    Get {
        key: String,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
        /// Dotted paths to leave out of the output
        #[arg(long = "hide", value_name = "PATH")]
        hide: Vec<String>,
    },
    /// Store a JSON object under a key
    Set {
        key: String,
        json: String,
        /// Shallow-merge into the stored snapshot instead of replacing it
        #[arg(long)]
        merge: bool,
    },
    /// Remove a key
    Clear { key: String },
    /// List keys holding a snapshot
    Keys,
    /// Print the snapshot every time another context changes it
    Watch {
        key: String,
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = SqliteMediumConfig {
        poll_interval_ms: args.poll_ms,
        ..Default::default()
    };
    let medium = SqliteMedium::open(&args.db, config)
        .with_context(|| format!("Failed to open shared medium {:?}", args.db))?;
    let channel = medium.channel()?;

    match args.command {
        Command::Get { key, pretty, hide } => {
            let hide = hide.iter().map(|p| parse_path(p)).collect::<Result<Vec<_>>>()?;
            match read_snapshot(&channel, &key).await? {
                Some(state) => println!("{}", render(&state, &hide, pretty)?),
                None => info!("{} holds no snapshot", key),
            }
        }
        Command::Set { key, json, merge } => {
            let written = write_snapshot(&channel, &key, &json, merge).await?;
            info!("{} now holds {} top-level key(s)", key, written.len());
        }
        Command::Clear { key } => {
            if clear_snapshot(&channel, &key).await? {
                info!("Cleared {}", key);
            } else {
                info!("{} was already empty", key);
            }
        }
        Command::Keys => {
            for key in channel.keys().await? {
                println!("{key}");
            }
        }
        Command::Watch { key, pretty } => {
            let mut changes = channel.subscribe(&key);
            info!("Watching {} in {:?} (Ctrl-C to stop)", key, args.db);
            if let Some(state) = read_snapshot(&channel, &key).await? {
                println!("{}", render(&state, &[], pretty)?);
            }
            loop {
                tokio::select! {
                    notice = changes.recv() => {
                        let Some(notice) = notice else { break };
                        info!("{} changed by {}", notice.key, notice.origin);
                        match read_snapshot(&channel, &key).await? {
                            Some(state) => println!("{}", render(&state, &[], pretty)?),
                            None => println!("null"),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
