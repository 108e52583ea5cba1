//! `wv-quality` — incremental code quality scanner CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repotoire::{config, db, githist, scanner};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "wv-quality")]
#[command(version, about = "Local-first code quality scanner", long_about = None)]
struct Cli {
    /// Directory the graph/quality databases live under (default: repo root's .wv)
    #[arg(long, global = true)]
    hot_zone: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the repository and persist hotspot/trend state.
    Scan {
        path: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// List the current top hotspots.
    Hotspots {
        #[arg(long, default_value = "20")]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Compare the two most recent scans.
    Diff {
        #[arg(long)]
        json: bool,
    },
    /// Promote hotspots into the issue graph under a parent node.
    Promote {
        #[arg(long)]
        parent: String,
        #[arg(long, default_value = "10")]
        top: usize,
        #[arg(long)]
        upsert: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// List function-level complexity for one file.
    Functions {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print scan freshness/availability as JSON.
    HealthInfo,
    /// Annotate newline-delimited paths (read from stdin) with quality data.
    ContextFiles,
    /// Delete the persisted quality database.
    Reset,
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
    match cli.command {
        Commands::Scan { path, json, exclude } => {
            let repo_root = config::resolve_repo_root(path.as_deref())?;
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let summary = scanner::run_scan(&repo_root, &hot_zone, &exclude).context("scan failed")?;
            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                println!(
                    "scanned {} files in {}ms ({} changed)",
                    summary.files_scanned, summary.duration_ms, summary.files_changed
                );
            }
            Ok(())
        }
        Commands::Hotspots { top, json } => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let conn = db::open(&config::quality_db_path(&hot_zone))?;
            let rows = scanner::report::hotspots(&conn, top)?;
            if json {
                println!("{}", serde_json::to_string(&rows)?);
            } else {
                for row in rows {
                    println!("{:.4}\t{}", row.hotspot, row.path);
                }
            }
            Ok(())
        }
        Commands::Diff { json } => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let conn = db::open(&config::quality_db_path(&hot_zone))?;
            let report = scanner::report::diff(&conn)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{} file(s) degraded", report.degraded.len());
            }
            Ok(())
        }
        Commands::Promote { parent, top, upsert, dry_run, json } => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let conn = db::open(&config::quality_db_path(&hot_zone))?;
            let graph = repotoire::graphclient::CliGraphClient::new(&hot_zone);
            let report = scanner::report::promote(&conn, &graph, &parent, top, upsert, dry_run)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "promoted {} updated {} skipped {}",
                    report.promoted.len(),
                    report.updated.len(),
                    report.skipped.len()
                );
            }
            Ok(())
        }
        Commands::Functions { path, json } => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let conn = db::open(&config::quality_db_path(&hot_zone))?;
            let scan_id = db::latest_scan(&conn)?.map(|s| s.id).unwrap_or(0);
            let report = scanner::report::functions(&conn, &path.to_string_lossy(), scan_id)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                for f in report.functions {
                    println!("{}\tcc={}", f.function_name, f.complexity);
                }
            }
            Ok(())
        }
        Commands::HealthInfo => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let repo_root = config::resolve_repo_root(None)?;
            let db_path = config::quality_db_path(&hot_zone);
            let info = if db::db_exists(&db_path) {
                let conn = db::open(&db_path)?;
                let head = githist::open_repo(&repo_root).and_then(|r| githist::head_id(&r)).unwrap_or_default();
                scanner::report::health_info(&conn, &head)?
            } else {
                scanner::report::HealthInfo {
                    available: false,
                    score: None,
                    hotspot_count: None,
                    total_files: None,
                    git_head: None,
                    scanned_at: None,
                }
            };
            println!("{}", serde_json::to_string(&info)?);
            Ok(())
        }
        Commands::ContextFiles => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            let db_path = config::quality_db_path(&hot_zone);
            let stdin = io::stdin();
            if !db::db_exists(&db_path) {
                println!(r#"{{"code_quality":[],"quality_as_of":null}}"#);
                return Ok(());
            }
            let conn = db::open(&db_path)?;
            let report = scanner::report::context_files(&conn, stdin.lock())?;
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Commands::Reset => {
            let hot_zone = config::resolve_hot_zone(cli.hot_zone.as_deref());
            scanner::report::reset(&hot_zone)
        }
    }
}
