//! # CLI Module
//!
//! Command-line entry points for the `sitekit` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the site:
//!
//! ```bash
//! sitekit serve --config site.toml --addr 0.0.0.0:8080
//! ```
//!
//! Options:
//! - `--config <FILE>` - TOML configuration (environment variables still override it)
//! - `--addr <ADDR>` - Bind address, replacing `HOST`/`PORT`
//! - `--dev` - Development mode (databases under `data/`)
//!
//! ### `dump-db`
//!
//! Snapshot a database into a standalone SQLite file:
//!
//! ```bash
//! sitekit dump-db --db ~/.local/share/sitekit/site.db --out backup.db
//! ```
//!
//! ### `cron-check`
//!
//! Print whether a cron rule fires in the current UTC minute:
//!
//! ```bash
//! sitekit cron-check "*/5 * * * *"
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use sitekit::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;


pub use commands::{run, run_cli, Cli, Commands};
