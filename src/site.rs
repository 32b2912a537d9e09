//! The personal site: every piece of the toolkit wired into one [`Server`].
//!
//! | Route | Served by |
//! |---|---|
//! | `/` | `<static_dir>/index.html` |
//! | `/static/*` | [`files`] over `static_dir` |
//! | `/files/*` | [`filebrowser`] over `files_dir` |
//! | `/ip` | the client IP as JSON (`null` for local clients) |
//! | `/randomlink` | 303 to a random line of `<files_dir>/links.txt` |
//! | `/tmpfile` | the [`FileHost`] |

use anyhow::{Context, Result};
use http::Method;
use rand::seq::SliceRandom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::Database;
use crate::filehost::{FileHost, FileHostOpts};
use crate::middleware::{Logger, RateLimiter};
use crate::router::Router;
use crate::runtime_config::Config;
use crate::server::{Redirect, Server, ServerOpts};
use crate::static_files::{filebrowser, files, join_path, DiskFs, SendFileOpts};

const LINKS_FILE: &str = "links.txt";

/// A configured site, ready to be served.
pub struct Site {
    pub server: Server,
    pub filehost: FileHost,
}

/// Non-empty lines of `path`. A missing file yields no links.
pub fn load_links(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "No links loaded");
            Vec::new()
        }
    }
}

/// Build the site server from `config`, storing its tables in `db`.
///
/// # Errors
///
/// Fails if the access log or file host tables cannot be created.
pub fn build(config: &Config, db: &Database) -> Result<Site> {
    let mut opts = ServerOpts::default();
    opts.max_body_size = usize::try_from(config.max_upload).unwrap_or(usize::MAX);
    if config.workers > 0 {
        opts.workers = config.workers;
    }
    let mut server = Server::with_fs(opts, Arc::new(DiskFs::new(&config.root)));

    let mut logger = Logger::new()
        .database(db)
        .context("Failed to create request log table")?;
    if let Some(path) = &config.access_log {
        logger = logger.file(path);
    }
    server.use_middleware(logger);
    if config.rate_limit > 0 {
        server.use_middleware(RateLimiter::new(Duration::from_secs(60), config.rate_limit));
    }

    server.use_middleware(files("/static", &config.static_dir));
    server.use_middleware(filebrowser("/files", &config.files_dir));

    let index = join_path(&config.static_dir, "index.html");
    let links = Arc::new(load_links(
        &config.root.join(&config.files_dir).join(LINKS_FILE),
    ));
    info!(links = links.len(), "Site content loaded");

    let mut router = Router::new();
    router.get("/", move |ctx, _next| ctx.send_file(&index, SendFileOpts::default()));
    router.get("/ip", |ctx, _next| {
        let ip = ctx.req.ip();
        ctx.res.send_json(&ip, ())
    });
    router.get("/randomlink", move |ctx, _next| {
        match links.choose(&mut rand::thread_rng()) {
            Some(link) => ctx.res.redirect(link, Redirect::SeeOther),
            None => ctx.res.send_text("404 no links", 404),
        }
        Ok(())
    });
    server.use_middleware(router.mount(""));

    let filehost = FileHost::new(
        db,
        FileHostOpts {
            max_size: config.max_upload,
            token: config.token.clone(),
            ..FileHostOpts::default()
        },
    )
    .context("Failed to create file host table")?;
    server.use_middleware(filehost.router().mount("/tmpfile"));

    Ok(Site { server, filehost })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Request;

    fn site() -> (tempfile::TempDir, Site) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();
        std::fs::create_dir_all(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("static/index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(
            dir.path().join("files/links.txt"),
            "https://a.example\n\nhttps://b.example\n",
        )
        .unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            token: "tok".into(),
            ..Config::default()
        };
        let db = Database::memory().unwrap();
        let site = build(&config, &db).unwrap();
        (dir, site)
    }

    fn get(target: &str) -> Request {
        Request::builder(Method::GET, target)
            .header("x-forwarded-for", "203.0.113.9")
            .build()
            .unwrap()
    }

    #[test]
    fn test_index_and_static() {
        let (_dir, site) = site();
        let res = site.server.handle(get("/"));
        assert_eq!(res.status, 200);
        assert_eq!(res.headers["content-type"], "text/html; charset=utf-8");
        assert_eq!(site.server.handle(get("/static/index.html")).status, 200);
        assert_eq!(site.server.handle(get("/static/missing.css")).status, 404);
    }

    #[test]
    fn test_ip() {
        let (_dir, site) = site();
        let res = site.server.handle(get("/ip"));
        assert_eq!(res.text(), Some("\"203.0.113.9\""));
        let local = Request::builder(Method::GET, "/ip").build().unwrap();
        assert_eq!(site.server.handle(local).text(), Some("null"));
    }

    #[test]
    fn test_randomlink() {
        let (_dir, site) = site();
        let res = site.server.handle(get("/randomlink"));
        assert_eq!(res.status, 303);
        let location = res.headers["location"].to_str().unwrap();
        assert!(["https://a.example", "https://b.example"].contains(&location));
    }

    #[test]
    fn test_filehost_is_mounted() {
        let (_dir, site) = site();
        let res = site.server.handle(
            Request::builder(Method::POST, "/tmpfile")
                .header("content-type", "text/plain")
                .header("content-length", "2")
                .body("hi")
                .build()
                .unwrap(),
        );
        assert_eq!(res.status, 401);
    }

    #[test]
    fn test_missing_links_file() {
        assert!(load_links(Path::new("/nonexistent/links.txt")).is_empty());
    }
}
