//! # Runtime Configuration Module
//!
//! Site configuration loaded from an optional TOML file and then overridden
//! by environment variables.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Notes |
//! |---|---|---|
//! | `DEV` | `dev` | any non-empty value other than `0`/`false` enables dev mode |
//! | `HOST` | `host` | bind address |
//! | `PORT` | `port` | |
//! | `SITE_WORKERS` | `workers` | `0` uses the available parallelism |
//! | `TOKEN` | `token` | bearer token for the file host |
//! | `SITE_DB_PATH` | `db_path` | |
//! | `SITE_STATIC_DIR` | `static_dir` | |
//! | `SITE_FILES_DIR` | `files_dir` | |
//!
//! ## Example Configuration
//!
//! ```toml
//! port = 8000
//! root = "/srv/site"
//! access_log = "/var/log/site/access.log"
//! ```
//!
//! ## Database Location
//!
//! Without an explicit `db_path`, databases live in `data/` during
//! development and under `$HOME/.local/share/<app>/` otherwise. See
//! [`default_db_path`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::utils::MB;

pub const APP_NAME: &str = "sitekit";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dev: bool,
    pub host: String,
    pub port: u16,
    /// Worker threads; `0` picks one per available core.
    pub workers: usize,
    /// Bearer token guarding file host uploads and deletes.
    pub token: String,
    pub db_path: Option<PathBuf>,
    /// Directory the site's filesystem is rooted at.
    pub root: PathBuf,
    /// Served at `/static`, relative to `root`.
    pub static_dir: String,
    /// Browsable at `/files`, relative to `root`.
    pub files_dir: String,
    /// Largest accepted request body and file host upload, in bytes.
    pub max_upload: u64,
    /// Plain access log file, in addition to stdout.
    pub access_log: Option<PathBuf>,
    /// Per-IP requests allowed per minute; `0` disables rate limiting.
    pub rate_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev: false,
            host: "0.0.0.0".to_string(),
            port: 80,
            workers: 0,
            token: String::new(),
            db_path: None,
            root: PathBuf::from("."),
            static_dir: "static".to_string(),
            files_dir: "files".to_string(),
            max_upload: 64 * MB,
            access_log: None,
            rate_limit: 0,
        }
    }
}

impl Config {
    /// Load `path` (if given) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or an override has an
    /// invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides looked up through `get`, usually the environment.
    ///
    /// # Errors
    ///
    /// Fails on a non-numeric `PORT` or `SITE_WORKERS`.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("DEV") {
            self.dev = !matches!(v.trim().to_lowercase().as_str(), "" | "0" | "false");
        }
        if let Some(v) = get("HOST") {
            self.host = v;
        }
        if let Some(v) = get("PORT") {
            self.port = v.trim().parse().with_context(|| format!("Invalid PORT: {v}"))?;
        }
        if let Some(v) = get("SITE_WORKERS") {
            self.workers = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid SITE_WORKERS: {v}"))?;
        }
        if let Some(v) = get("TOKEN") {
            self.token = v;
        }
        if let Some(v) = get("SITE_DB_PATH") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SITE_STATIC_DIR") {
            self.static_dir = v;
        }
        if let Some(v) = get("SITE_FILES_DIR") {
            self.files_dir = v;
        }
        Ok(())
    }

    /// `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured database path, or the default location for `name`.
    #[must_use]
    pub fn db_path(&self, name: &str) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| default_db_path(APP_NAME, name, self.dev))
    }
}

/// Where an app keeps the database `name`.
///
/// `data/<name>` in dev mode, `$HOME/.local/share/<app>/<name>` otherwise.
#[must_use]
pub fn default_db_path(app: &str, name: &str, dev: bool) -> PathBuf {
    if dev {
        return Path::new("data").join(name);
    }
    let home = env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".local/share").join(app).join(name)
}
