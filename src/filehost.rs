//! # File Host
//!
//! A temporary file host in the style of paste services: clients upload a
//! file or a text body and get back a short URL to download it from.
//!
//! ## Routes
//!
//! Relative to the prefix the router is mounted at:
//!
//! | Method   | Path   | Gated | Effect |
//! |----------|--------|-------|--------|
//! | `POST`   | ``     | yes   | store the body, reply with its URL |
//! | `GET`    | `/:id` | no    | download with the stored content type |
//! | `DELETE` | `/:id` | yes   | remove one file |
//! | `DELETE` | ``     | yes   | remove every file |
//!
//! Gated routes need `Authorization: Bearer <token>`.
//!
//! ## Storage
//!
//! Files live in a `file` table. Identical content is stored once: an upload
//! whose sha256 matches an existing row returns that row's id. Rows older
//! than the configured lifespan are removed by [`FileHost::remove_expired`],
//! which [`FileHost::run_cleaner`] schedules hourly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use http::Method;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::{row, ColumnDef, Database, DbError, Op, Table, TableOpts, TableSchema, Value, Where};
use crate::dispatcher::from_fn;
use crate::error::{Error, HttpError};
use crate::middleware::gate;
use crate::router::Router;
use crate::server::{Ctx, ResOpts};
use crate::utils::{cron, rand_alnum, CronError, CronHandle, MB, MONTH};

const ID_LEN: usize = 8;
const ID_ATTEMPTS: usize = 16;

#[derive(Debug, Clone)]
pub struct FileHostOpts {
    /// Largest accepted `Content-Length`.
    pub max_size: u64,
    /// Age after which a stored file is removed.
    pub lifespan: Duration,
    /// Bearer token for uploads and deletes. Empty disables them.
    pub token: String,
}

impl Default for FileHostOpts {
    fn default() -> Self {
        Self {
            max_size: 64 * MB,
            lifespan: MONTH,
            token: String::new(),
        }
    }
}

/// The file host service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FileHost {
    table: Table,
    opts: Arc<FileHostOpts>,
}

impl FileHost {
    /// Open the host on `db`, creating its `file` table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn new(db: &Database, opts: FileHostOpts) -> Result<Self, DbError> {
        let schema = TableSchema::new()
            .column("id", ColumnDef::text().primary_key())
            .column("hash", ColumnDef::text().index())
            .column("type", ColumnDef::text())
            .column("size", ColumnDef::integer())
            .column("data", ColumnDef::blob());
        let table = db.table(
            "file",
            &schema,
            TableOpts {
                time_created: true,
                time_updated: true,
                ..TableOpts::default()
            },
        )?;
        if opts.token.is_empty() {
            warn!("File host has no token; uploads and deletes are disabled");
        }
        Ok(Self {
            table,
            opts: Arc::new(opts),
        })
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Routes for mounting, e.g. `host.router().mount("/tmpfile")`.
    #[must_use]
    pub fn router(&self) -> Router {
        let token = self.opts.token.as_str();
        let mut router = Router::new();

        let host = self.clone();
        router.add(Method::POST, "", gate(token, from_fn(move |ctx, _next| host.upload(ctx))));

        let host = self.clone();
        router.get("/:id", move |ctx, _next| host.download(ctx));

        let host = self.clone();
        router.add(Method::DELETE, "/:id", gate(token, from_fn(move |ctx, _next| host.remove(ctx))));

        let host = self.clone();
        router.add(Method::DELETE, "", gate(token, from_fn(move |ctx, _next| host.purge(ctx))));

        router
    }

    /// Store the request body and reply with the download URL.
    ///
    /// # Errors
    ///
    /// * 400 `too big` - `Content-Length` missing, zero or above the limit
    /// * 400 `no file` - a multipart body without a `file` part
    /// * 400 `data type not supported` - neither multipart nor `text/*`
    pub fn upload(&self, ctx: &mut Ctx) -> Result<(), Error> {
        let len = ctx.req.content_length().unwrap_or(0);
        if len == 0 || len > self.opts.max_size {
            return Err(HttpError::bad_request("too big").into());
        }
        let raw_type = ctx.req.header("content-type").unwrap_or("").to_string();
        let media = ctx.req.content_type().unwrap_or_default();
        let (data, content_type) = if media == "multipart/form-data" {
            let form = ctx.req.form_data()?;
            let file = form.file("file").ok_or_else(|| HttpError::bad_request("no file"))?;
            let ty = file
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            (file.data.clone(), ty)
        } else if media == "application/x-www-form-urlencoded" {
            (ctx.req.bytes()?.to_vec(), "text/plain".to_string())
        } else if media.starts_with("text/") {
            (ctx.req.bytes()?.to_vec(), raw_type)
        } else {
            return Err(HttpError::bad_request(format!("data type not supported: {raw_type}")).into());
        };

        let id = self.store(&data, &content_type)?;
        let url = ctx.req.url();
        let scheme = ctx.req.header("x-forwarded-proto").unwrap_or(url.scheme());
        let host = ctx.req.header("host").unwrap_or("localhost");
        let link = format!("{scheme}://{host}{}/{id}", url.path().trim_end_matches('/'));
        ctx.res.send_text(link, ());
        Ok(())
    }

    /// Store `data`, returning the id of the new row or of an existing row
    /// with the same content.
    ///
    /// # Errors
    ///
    /// Database errors, or an internal error if no unused id was found.
    pub fn store(&self, data: &[u8], content_type: &str) -> Result<String, Error> {
        let hash = STANDARD.encode(Sha256::digest(data));
        if let Some(existing) = self.table.find(&Where::new().eq("hash", hash.as_str()))? {
            if let Some(id) = existing.get("id").and_then(Value::as_str) {
                debug!(id, "Upload matches stored file");
                return Ok(id.to_string());
            }
        }
        for _ in 0..ID_ATTEMPTS {
            let id = rand_alnum(ID_LEN);
            if self.table.find(&Where::new().eq("id", id.as_str()))?.is_some() {
                debug!(id = %id, "Generated file id already taken");
                continue;
            }
            self.table.insert(&row([
                ("id", id.as_str().into()),
                ("hash", hash.as_str().into()),
                ("type", content_type.into()),
                ("size", Value::Integer(data.len() as i64)),
                ("data", data.to_vec().into()),
            ]))?;
            info!(id = %id, size = data.len(), content_type, "File stored");
            return Ok(id);
        }
        Err(anyhow::anyhow!("no free file id after {ID_ATTEMPTS} attempts").into())
    }

    pub fn download(&self, ctx: &mut Ctx) -> Result<(), Error> {
        let id = ctx.req.params.get("id").cloned().unwrap_or_default();
        let file = self
            .table
            .find(&Where::new().eq("id", id))?
            .ok_or_else(HttpError::not_found)?;
        let content_type = file
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream");
        let data = file.get("data").and_then(Value::as_blob).unwrap_or_default();
        ctx.res
            .send(data.to_vec(), ResOpts::default().header("content-type", content_type));
        Ok(())
    }

    pub fn remove(&self, ctx: &mut Ctx) -> Result<(), Error> {
        let id = ctx.req.params.get("id").cloned().unwrap_or_default();
        let removed = self.table.delete(&Where::new().eq("id", id.as_str()))?;
        debug!(id = %id, removed, "File removed");
        ctx.res.send_text("ok", ());
        Ok(())
    }

    pub fn purge(&self, ctx: &mut Ctx) -> Result<(), Error> {
        let removed = self.table.clear()?;
        info!(removed, "File host purged");
        ctx.res.send_text("ok", ());
        Ok(())
    }

    /// Delete files created longer ago than the lifespan.
    pub fn remove_expired(&self) -> Result<usize, DbError> {
        let Some(cutoff) = chrono::Duration::from_std(self.opts.lifespan)
            .ok()
            .and_then(|lifespan| Utc::now().checked_sub_signed(lifespan))
        else {
            return Ok(0);
        };
        // Same text format as CURRENT_TIMESTAMP, so string order is time order.
        let cutoff = cutoff.format("%Y-%m-%d %H:%M:%S").to_string();
        let removed = self
            .table
            .delete(&Where::new().op("time_created", Op::Lt, cutoff))?;
        if removed > 0 {
            info!(removed, "Expired files removed");
        }
        Ok(removed)
    }

    /// Run [`remove_expired`](Self::remove_expired) every hour.
    pub fn run_cleaner(&self) -> Result<CronHandle, CronError> {
        let host = self.clone();
        cron("hourly", move || {
            if let Err(e) = host.remove_expired() {
                warn!(error = %e, "File cleanup failed");
            }
        })
    }
}
