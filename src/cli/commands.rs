use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, DatabaseOpts};
use crate::runtime_config::Config;
use crate::server::HttpServer;
use crate::site;
use crate::utils::Schedule;

const SITE_DB: &str = "site.db";

/// Command-line interface for sitekit
#[derive(Debug, Parser)]
#[command(name = "sitekit")]
#[command(about = "Personal website server and tools", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the site
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bind address, overriding HOST and PORT
        #[arg(long)]
        addr: Option<String>,

        /// Development mode
        #[arg(long, default_value_t = false)]
        dev: bool,
    },
    /// Write a snapshot of a database to a file
    DumpDb {
        /// Database to snapshot
        #[arg(long)]
        db: PathBuf,

        /// Destination file
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print whether a cron rule matches the current UTC minute
    CronCheck {
        /// Five-field rule or an alias such as `hourly`
        rule: String,
    },
}

/// Run a parsed command, writing user-facing output to stdout.
///
/// # Errors
///
/// Returns the first error the command hits.
pub fn run_cli(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

/// Run a parsed command, writing user-facing output to `out`.
///
/// # Errors
///
/// Returns the first error the command hits.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Serve { config, addr, dev } => serve(config, addr, dev, out),
        Commands::DumpDb { db, out: dest } => {
            let database = Database::open(&db, DatabaseOpts::default())
                .with_context(|| format!("Failed to open {}", db.display()))?;
            let bytes = database.serialize().context("Failed to snapshot database")?;
            std::fs::write(&dest, &bytes)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            writeln!(out, "wrote {} bytes to {}", bytes.len(), dest.display())?;
            Ok(())
        }
        Commands::CronCheck { rule } => {
            let schedule = Schedule::parse(&rule).with_context(|| format!("Invalid rule {rule:?}"))?;
            writeln!(out, "{}", schedule.matches(&Utc::now()))?;
            Ok(())
        }
    }
}

fn serve(config: Option<PathBuf>, addr: Option<String>, dev: bool, out: &mut dyn Write) -> Result<()> {
    let mut config = Config::load(config.as_deref())?;
    config.dev |= dev;
    let db_path = config.db_path(SITE_DB);
    let db = Database::open(&db_path, DatabaseOpts { wal: true })
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let site = site::build(&config, &db)?;
    let cleaner = site
        .filehost
        .run_cleaner()
        .context("Failed to schedule file cleanup")?;

    let addr = addr.unwrap_or_else(|| config.addr());
    let handle = HttpServer(Arc::new(site.server))
        .start(addr.as_str())
        .with_context(|| format!("Failed to bind {addr}"))?;
    writeln!(out, "server starting at http://{}", handle.addr())?;
    info!(addr = %handle.addr(), dev = config.dev, db = %db_path.display(), "Site started");

    let joined = handle.join();
    cleaner.cancel();
    if joined.is_err() {
        warn!("HTTP worker panicked");
        return Err(anyhow!("server worker panicked"));
    }
    Ok(())
}
