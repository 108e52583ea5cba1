//! `wv-gh` — bidirectional sync between the local issue graph and a remote
//! tracker, plus single-node lifecycle notifications.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repotoire::config;
use repotoire::graphclient::CliGraphClient;
use repotoire::reconciler::notify::{notify, NotifyEvent};
use repotoire::reconciler::phases::refresh_parent_body;
use repotoire::reconciler::remote::GhCliTracker;
use repotoire::reconciler::run_full_sync;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "wv-gh")]
#[command(version, about = "Sync the local issue graph with a remote tracker", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    hot_zone: Option<PathBuf>,

    /// Compute the sync plan without writing to either side.
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post a lifecycle comment for one node without running a full sync.
    Notify {
        node_id: String,
        event: String,
        #[arg(long)]
        learning: Option<String>,
        #[arg(long)]
        blocker: Option<String>,
    },
    /// Re-render and update one node's parent body.
    RefreshParent { node_id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(cli) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
    let graph = CliGraphClient::new(&hot_zone);
    let remote = GhCliTracker::new();

    match cli.command {
        None => {
            let stats = run_full_sync(&graph, &remote, cli.dry_run).context("sync failed")?;
            println!("{stats:?}");
            Ok(())
        }
        Some(Commands::Notify { node_id, event, learning, blocker }) => {
            let event = NotifyEvent::from_str(&event).with_context(|| format!("unknown event {event}"))?;
            notify(&graph, &remote, &node_id, event, learning.as_deref(), blocker.as_deref())?;
            Ok(())
        }
        Some(Commands::RefreshParent { node_id }) => {
            let updated = refresh_parent_body(&graph, &remote, &node_id, cli.dry_run)?;
            println!("{}", if updated { "updated" } else { "unchanged" });
            Ok(())
        }
    }
}
