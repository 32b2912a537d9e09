//! Static file serving.
//!
//! Files are read through a [`FileSystem`] capability owned by the server,
//! so the same handlers work against a directory on disk ([`DiskFs`]) or an
//! in-memory manifest ([`MemFs`]). Paths handed to a filesystem are
//! slash-separated and relative to its root.

use chrono::{DateTime, Utc};
use minijinja::{context, Environment};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use tracing::debug;

use crate::dispatcher::{Middleware, Next};
use crate::error::{Error, HttpError};
use crate::server::{Body, Ctx, Request, ResOpts, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub kind: EntryKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Read-only file access for a server.
///
/// A server built with [`Server::with_fs`](crate::server::Server::with_fs)
/// carries one of these; a server built with `Server::new` cannot send
/// files at all.
pub trait FileSystem: Send + Sync {
    /// Stat a path.
    ///
    /// # Errors
    ///
    /// `NotFound` if the path does not exist or escapes the root.
    fn metadata(&self, path: &str) -> io::Result<Metadata>;

    /// Open `len` bytes of a file starting at `start`.
    fn open_range(&self, path: &str, start: u64, len: u64) -> io::Result<Box<dyn Read + Send>>;

    /// List a directory, in no particular order.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "file not found")
}

/// A directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    base_dir: PathBuf,
}

impl DiskFs {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        map_path(&self.base_dir, path).ok_or_else(not_found)
    }
}

impl FileSystem for DiskFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let meta = fs::metadata(self.resolve(path)?)?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else if meta.is_file() {
            EntryKind::File
        } else {
            return Err(not_found());
        };
        Ok(Metadata {
            kind,
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn open_range(&self, path: &str, start: u64, len: u64) -> io::Result<Box<dyn Read + Send>> {
        let mut file = fs::File::open(self.resolve(path)?)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Box::new(file.take(len)))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            // follows symlinks
            let meta = fs::metadata(entry.path())?;
            let kind = if meta.is_dir() {
                EntryKind::Dir
            } else if meta.is_file() {
                EntryKind::File
            } else {
                continue;
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone)]
struct MemFile {
    data: Arc<Vec<u8>>,
    modified: SystemTime,
}

/// An in-memory file manifest, e.g. assets embedded in the binary.
///
/// Directories are implied by file paths.
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    files: BTreeMap<String, MemFile>,
}

impl MemFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(
            trim_slashes(path).to_string(),
            MemFile {
                data: Arc::new(data.into()),
                modified: SystemTime::now(),
            },
        );
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || {
            let prefix = format!("{path}/");
            self.files.keys().any(|k| k.starts_with(&prefix))
        }
    }
}

impl FileSystem for MemFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let path = trim_slashes(path);
        if let Some(f) = self.files.get(path) {
            return Ok(Metadata {
                kind: EntryKind::File,
                len: f.data.len() as u64,
                modified: Some(f.modified),
            });
        }
        if self.is_dir(path) {
            return Ok(Metadata {
                kind: EntryKind::Dir,
                len: 0,
                modified: None,
            });
        }
        Err(not_found())
    }

    fn open_range(&self, path: &str, start: u64, len: u64) -> io::Result<Box<dyn Read + Send>> {
        let f = self.files.get(trim_slashes(path)).ok_or_else(not_found)?;
        let mut cursor = Cursor::new(f.data.as_ref().clone());
        cursor.set_position(start);
        Ok(Box::new(cursor.take(len)))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = trim_slashes(path);
        if !self.is_dir(path) {
            return Err(not_found());
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut seen = BTreeMap::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    seen.insert(dir.to_string(), EntryKind::Dir);
                }
                None => {
                    seen.entry(rest.to_string()).or_insert(EntryKind::File);
                }
            }
        }
        Ok(seen
            .into_iter()
            .map(|(name, kind)| DirEntry { name, kind })
            .collect())
    }
}

/// Map a request path onto `base`, rejecting anything but plain segments.
pub fn map_path(base: &Path, url_path: &str) -> Option<PathBuf> {
    let mut pb = base.to_path_buf();
    for comp in Path::new(url_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => pb.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(pb)
}

#[must_use]
pub fn trim_slashes(s: &str) -> &str {
    s.trim_matches('/')
}

/// Join two filesystem-relative paths with a single `/`.
#[must_use]
pub fn join_path(root: &str, rel: &str) -> String {
    match (trim_slashes(root), trim_slashes(rel)) {
        ("", rel) => rel.to_string(),
        (root, "") => root.to_string(),
        (root, rel) => format!("{root}/{rel}"),
    }
}

/// Format a timestamp as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
#[must_use]
pub fn http_date(t: SystemTime) -> String {
    DateTime::<Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn mime_for_ext(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "ico" => "image/ico",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mid" | "midi" => "audio/midi",
        "mp4" => "video/mp4",
        "mpeg" => "video/mpeg",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "htm" | "html" => "text/html",
        "js" => "text/javascript",
        "txt" => "text/plain",
        "css" => "text/css",
        "csv" => "text/csv",
        "otf" => "font/otf",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "pdf" => "application/pdf",
        "json" | "map" => "application/json",
        "rtf" => "application/rtf",
        "bin" => "application/octet-stream",
        "gltf" => "model/gltf+json",
        "glb" => "model/gltf-binary",
        _ => return None,
    })
}

/// Guess a `Content-Type` from a file extension.
///
/// `extra` maps lowercase extensions to MIME types and takes precedence over
/// the built-in table. Text types and JSON get `; charset=utf-8`.
#[must_use]
pub fn guess_mime(path: &str, extra: &HashMap<String, String>) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mime = extra
        .get(&ext)
        .map(String::as_str)
        .or_else(|| mime_for_ext(&ext))
        .unwrap_or("application/octet-stream");
    if (mime.starts_with("text/") || mime == "application/json") && !mime.contains("charset") {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

/// Options for [`send_file`].
#[derive(Debug, Clone, Default)]
pub struct SendFileOpts {
    /// Status and headers applied to the final response.
    pub res: ResOpts,
    /// Extra extension to MIME type mappings.
    pub mimes: HashMap<String, String>,
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Supports `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`; only the
/// first range of a list is honoured. Returns inclusive `(start, end)`.
fn parse_range(header: &str, size: u64) -> Option<(u64, u64)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let first = spec.split(',').next()?.trim();
    let (s, e) = first.split_once('-')?;
    let last = size.checked_sub(1)?;
    let (start, end) = match (s.trim(), e.trim()) {
        ("", "") => return None,
        ("", n) => {
            let n: u64 = n.parse().ok()?;
            if n == 0 {
                return None;
            }
            (size.saturating_sub(n), last)
        }
        (a, "") => (a.parse().ok()?, last),
        (a, b) => (a.parse().ok()?, b.parse().ok()?),
    };
    if start > end || end > last {
        return None;
    }
    Some((start, end))
}

/// Send a file through `res`.
///
/// # Errors
///
/// * 404 if `path` is not a regular file
/// * 416 `"invalid range"` if a `Range` header cannot be satisfied
/// * I/O errors opening the file
pub fn send_file(
    fs: &dyn FileSystem,
    req: &Request,
    res: &mut Response,
    path: &str,
    opts: &SendFileOpts,
) -> Result<(), Error> {
    let meta = match fs.metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(HttpError::not_found().into()),
    };
    let size = meta.len;
    res.set_header("content-type", &guess_mime(path, &opts.mimes));

    if let Some(range) = req.header("range") {
        let (start, end) = parse_range(range, size).ok_or_else(|| HttpError::new(416, "invalid range"))?;
        let len = end - start + 1;
        debug!(path, start, end, size, "Serving byte range");
        let reader = fs.open_range(path, start, len)?;
        res.set_header("content-range", &format!("bytes {start}-{end}/{size}"));
        res.set_header("content-length", &len.to_string());
        res.set_header("accept-ranges", "bytes");
        let opts = ResOpts {
            status: Some(206),
            ..opts.res.clone()
        };
        res.send(Body::Stream { reader, len }, opts);
        return Ok(());
    }

    if let Some(modified) = meta.modified.map(http_date) {
        if req.header("if-modified-since") == Some(modified.as_str()) {
            res.send(Body::Empty, 304);
            return Ok(());
        }
        res.set_header("last-modified", &modified);
    }
    res.set_header("cache-control", "no-cache");
    let reader = fs.open_range(path, 0, size)?;
    res.send(Body::Stream { reader, len: size }, opts.res.clone());
    Ok(())
}

/// Path relative to `route`, or `None` when the request is outside it.
fn strip_route<'a>(path: &'a str, route: &str) -> Option<&'a str> {
    if route.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(route)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Serves files under `root` at `route`. See [`files`].
#[derive(Debug, Clone)]
pub struct Files {
    route: String,
    root: String,
}

/// Serve files from `root` (in the server's filesystem) under `route`.
///
/// Requests outside `route`, and paths that are not regular files, fall
/// through to `next`.
#[must_use]
pub fn files(route: &str, root: &str) -> Files {
    Files {
        route: trim_slashes(route).to_string(),
        root: trim_slashes(root).to_string(),
    }
}

impl Middleware for Files {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        let path = ctx.req.decoded_path();
        let Some(rel) = strip_route(trim_slashes(&path), &self.route) else {
            return next.run(ctx);
        };
        let file = join_path(&self.root, rel);
        let is_file = ctx.fs()?.metadata(&file).is_ok_and(|m| m.is_file());
        if !is_file {
            return next.run(ctx);
        }
        ctx.send_file(&file, SendFileOpts::default())
    }
}

const FILEBROWSER_TEMPLATE: &str = include_str!("templates/filebrowser.html");

fn templates() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        if let Err(e) = env.add_template("filebrowser.html", FILEBROWSER_TEMPLATE) {
            tracing::error!(error = %e, "Failed to load file browser template");
        }
        env
    })
}

#[derive(Debug, Serialize)]
struct BrowserLink {
    name: String,
    href: String,
}

#[derive(Debug, Serialize)]
struct BrowserFile {
    name: String,
    mime: String,
}

/// Serves files like [`Files`] and renders a browsing page for
/// directories. See [`filebrowser`].
#[derive(Debug, Clone)]
pub struct FileBrowser {
    route: String,
    root: String,
}

/// Serve `root` under `route` with a generated directory browser.
#[must_use]
pub fn filebrowser(route: &str, root: &str) -> FileBrowser {
    FileBrowser {
        route: trim_slashes(route).to_string(),
        root: trim_slashes(root).to_string(),
    }
}

fn default_file(fs: &dyn FileSystem, dir: &str) -> String {
    for name in ["index.html", "README"] {
        if fs.metadata(&join_path(dir, name)).is_ok_and(|m| m.is_file()) {
            return format!("#{name}");
        }
    }
    String::new()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn href(url_path: &str, name: &str) -> String {
    let name = urlencoding::encode(name);
    if url_path.is_empty() {
        format!("/{name}")
    } else {
        let base = url_path
            .split('/')
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{base}/{name}")
    }
}

/// Sort files by extension then name, with `README*` and `index.html`
/// promoted to the front.
fn sort_files(names: &mut [String]) {
    names.sort_by(|a, b| {
        let ext = |s: &str| {
            Path::new(s)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        ext(a).cmp(&ext(b)).then_with(|| a.cmp(b))
    });
    names.sort_by_key(|n| !(n.starts_with("README") || n == "index.html"));
}

impl FileBrowser {
    fn render(&self, fs: &dyn FileSystem, url_path: &str, dir: &str, is_root: bool) -> Result<String, Error> {
        let mut dirs = Vec::new();
        let mut file_names = Vec::new();
        for entry in fs.read_dir(dir)? {
            if entry.name.starts_with('.') {
                continue;
            }
            match entry.kind {
                EntryKind::Dir => dirs.push(entry.name),
                EntryKind::File => file_names.push(entry.name),
            }
        }
        dirs.sort();
        sort_files(&mut file_names);

        let parent = (!is_root).then(|| {
            let parent_url = parent_of(url_path);
            let href = if parent_url.is_empty() {
                "/".to_string()
            } else {
                format!("/{parent_url}")
            };
            format!("{href}{}", default_file(fs, parent_of(dir)))
        });
        let dirs: Vec<BrowserLink> = dirs
            .into_iter()
            .map(|d| BrowserLink {
                href: format!("{}{}", href(url_path, &d), default_file(fs, &join_path(dir, &d))),
                name: format!("{d}/"),
            })
            .collect();
        let no_mimes = HashMap::new();
        let files: Vec<BrowserFile> = file_names
            .into_iter()
            .map(|name| BrowserFile {
                mime: guess_mime(&name, &no_mimes),
                name,
            })
            .collect();

        let tpl = templates()
            .get_template("filebrowser.html")
            .map_err(|e| Error::Internal(e.into()))?;
        tpl.render(context! {
            title => url_path,
            parent => parent,
            dirs => dirs,
            files => files,
        })
        .map_err(|e| Error::Internal(e.into()))
    }
}

impl Middleware for FileBrowser {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        let decoded = ctx.req.decoded_path();
        let url_path = trim_slashes(&decoded);
        let Some(rel) = strip_route(url_path, &self.route) else {
            return next.run(ctx);
        };
        let is_root = rel.is_empty();
        let target = join_path(&self.root, rel);
        let meta = ctx.fs()?.metadata(&target);
        let Ok(meta) = meta else {
            return next.run(ctx);
        };
        if meta.is_file() {
            return ctx.send_file(&target, SendFileOpts::default());
        }
        let html = self.render(ctx.fs()?, url_path, &target, is_root)?;
        ctx.res.send_html(html, ());
        Ok(())
    }
}
