use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use super::Middleware;
use crate::db::{row, ColumnDef, Database, DbError, Table, TableOpts, TableSchema, Value};
use crate::dispatcher::Next;
use crate::error::Error;
use crate::server::{Ctx, Request};
use crate::utils::{ansi, fmt_bytes};

type Filter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Access log middleware.
///
/// Records one entry per request once its response is final. Entries can go
/// to stdout as a coloured line, to a file as a plain line and to a
/// `request` table.
#[derive(Clone)]
pub struct Logger {
    filter: Option<Filter>,
    sinks: Arc<Sinks>,
}

#[derive(Debug, Clone, Default)]
struct Sinks {
    stdout: bool,
    file: Option<PathBuf>,
    table: Option<Table>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// A logger printing to stdout only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: None,
            sinks: Arc::new(Sinks {
                stdout: true,
                ..Sinks::default()
            }),
        }
    }

    fn sinks_mut(&mut self) -> &mut Sinks {
        Arc::make_mut(&mut self.sinks)
    }

    /// Only log requests for which `filter` returns `true`.
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn stdout(mut self, enabled: bool) -> Self {
        self.sinks_mut().stdout = enabled;
        self
    }

    /// Append plain lines to `path`.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sinks_mut().file = Some(path.into());
        self
    }

    /// Insert a row per request into the `request` table of `db`, creating
    /// the table on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn database(mut self, db: &Database) -> Result<Self, DbError> {
        let schema = TableSchema::new()
            .column("id", ColumnDef::integer().primary_key().auto_increment())
            .column("method", ColumnDef::text())
            .column("path", ColumnDef::text())
            .column("params", ColumnDef::text())
            .column("ip", ColumnDef::text().allow_null())
            .column("err", ColumnDef::text().allow_null());
        let table = db.table(
            "request",
            &schema,
            TableOpts {
                time_created: true,
                ..TableOpts::default()
            },
        )?;
        self.sinks_mut().table = Some(table);
        Ok(self)
    }
}

/// Access log line: `[YYYY-MM-DD HH:MM:SS] <status> <method> <path> <ms>ms <size>`.
///
/// The size is left out for empty bodies. With `color` the timestamp and
/// timing are dimmed and the status is coloured by class.
#[must_use]
pub fn format_line(
    at: DateTime<Utc>,
    status: u16,
    method: &str,
    path: &str,
    ms: u128,
    size: u64,
    color: bool,
) -> String {
    let paint = |code: &'static str| if color { code } else { "" };
    let (dim, bold, reset) = (paint(ansi::DIM), paint(ansi::BOLD), paint(ansi::RESET));
    let status_color = paint(ansi::status_color(status));
    let mut parts = vec![
        format!("{dim}[{}]{reset}", at.format("%Y-%m-%d %H:%M:%S")),
        format!("{bold}{status_color}{status}{reset}"),
        method.to_string(),
        path.to_string(),
        format!("{dim}{ms}ms{reset}"),
    ];
    if size > 0 {
        parts.push(format!("{dim}{}{reset}", fmt_bytes(size, 2)));
    }
    parts.join(" ")
}

impl Sinks {
    fn write(&self, ctx: &Ctx) {
        let now = Utc::now();
        let method = ctx.req.method().as_str();
        let path = ctx.req.path();
        let ms = ctx.elapsed().as_millis();
        let size = ctx.res.body_len();
        if self.stdout {
            println!("{}", format_line(now, ctx.res.status, method, path, ms, size, true));
        }
        if let Some(file) = &self.file {
            let line = format_line(now, ctx.res.status, method, path, ms, size, false);
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .and_then(|mut f| writeln!(f, "{line}"));
            if let Err(e) = written {
                warn!(error = %e, path = %file.display(), "Failed to append access log");
            }
        }
        if let Some(table) = &self.table {
            let params = ctx.req.url().query().map(|q| format!("?{q}")).unwrap_or_default();
            let entry = row([
                ("method", method.into()),
                ("path", path.into()),
                ("params", params.into()),
                ("ip", Value::from(ctx.req.ip())),
                ("err", Value::from(ctx.error_message())),
            ]);
            if let Err(e) = table.insert(&entry) {
                warn!(error = %e, "Failed to record request");
            }
        }
    }
}

impl Middleware for Logger {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        if let Some(filter) = &self.filter {
            if !filter(&ctx.req) {
                return next.run(ctx);
            }
        }
        let sinks = Arc::clone(&self.sinks);
        ctx.on_finish(move |ctx| sinks.write(ctx));
        next.run(ctx)
    }
}
