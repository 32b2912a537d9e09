use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::ids::RequestId;
use crate::server::{Request, Response};
use crate::static_files::{self, FileSystem, SendFileOpts};

type FinishHook = Box<dyn FnOnce(&Ctx)>;
type ErrorHook = Box<dyn Fn(&Ctx, &Error)>;

/// Per-request context threaded through the middleware chain.
///
/// Owns the request and the response under construction. Never shared
/// between requests.
pub struct Ctx {
    pub req: Request,
    pub res: Response,
    request_id: RequestId,
    fs: Option<Arc<dyn FileSystem>>,
    started: Instant,
    error: Option<String>,
    finish_hooks: Vec<FinishHook>,
    error_hooks: Vec<ErrorHook>,
}

impl Ctx {
    pub fn new(req: Request, fs: Option<Arc<dyn FileSystem>>) -> Self {
        let request_id = RequestId::from_header_or_new(req.header(RequestId::HEADER));
        Self {
            req,
            res: Response::new(),
            request_id,
            fs,
            started: Instant::now(),
            error: None,
            finish_hooks: Vec::new(),
            error_hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Message of the last error caught for this request, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Run `hook` once the response is final.
    pub fn on_finish(&mut self, hook: impl FnOnce(&Ctx) + 'static) {
        self.finish_hooks.push(Box::new(hook));
    }

    /// Run `hook` whenever the dispatcher catches an error for this request.
    pub fn on_error(&mut self, hook: impl Fn(&Ctx, &Error) + 'static) {
        self.error_hooks.push(Box::new(hook));
    }

    /// The server's filesystem capability.
    ///
    /// # Errors
    ///
    /// [`Error::NoFileSystem`] when the server was built without one.
    pub fn fs(&self) -> Result<&dyn FileSystem, Error> {
        self.fs.as_deref().ok_or(Error::NoFileSystem)
    }

    /// Send a file from the server's filesystem, honouring `Range` and
    /// `If-Modified-Since`.
    ///
    /// # Errors
    ///
    /// * 404 `HttpError` - the path does not name a regular file
    /// * 416 `HttpError` - the range cannot be satisfied
    /// * [`Error::NoFileSystem`] - no filesystem capability
    pub fn send_file(&mut self, path: &str, opts: SendFileOpts) -> Result<(), Error> {
        let fs = self.fs.clone().ok_or(Error::NoFileSystem)?;
        static_files::send_file(fs.as_ref(), &self.req, &mut self.res, path, &opts)
    }

    pub(crate) fn record_error(&mut self, err: &Error) {
        self.error = Some(err.to_string());
    }

    pub(crate) fn run_error_hooks(&mut self, err: &Error) {
        let hooks = std::mem::take(&mut self.error_hooks);
        for hook in &hooks {
            hook(self, err);
        }
        let added = std::mem::replace(&mut self.error_hooks, hooks);
        self.error_hooks.extend(added);
    }

    pub(crate) fn run_finish_hooks(&mut self) {
        for hook in std::mem::take(&mut self.finish_hooks) {
            hook(self);
        }
    }

    pub(crate) fn into_response(self) -> Response {
        self.res
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("request_id", &self.request_id)
            .field("method", self.req.method())
            .field("path", &self.req.path())
            .field("status", &self.res.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use std::cell::Cell;
    use std::rc::Rc;

    fn ctx() -> Ctx {
        Ctx::new(
            Request::builder(http::Method::GET, "/").build().unwrap(),
            None,
        )
    }

    #[test]
    fn test_request_id_from_header() {
        let id = RequestId::new();
        let req = Request::builder(http::Method::GET, "/")
            .header("X-Request-Id", &id.to_string())
            .build()
            .unwrap();
        assert_eq!(Ctx::new(req, None).request_id(), id);
    }

    #[test]
    fn test_finish_hooks_run_once() {
        let mut c = ctx();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        c.on_finish(move |_| seen.set(seen.get() + 1));
        c.run_finish_hooks();
        c.run_finish_hooks();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_error_hooks_see_error() {
        let mut c = ctx();
        let status = Rc::new(Cell::new(0));
        let seen = status.clone();
        c.on_error(move |_, err| seen.set(err.status()));
        let err = Error::from(HttpError::new(429, "too many requests"));
        c.record_error(&err);
        c.run_error_hooks(&err);
        assert_eq!(status.get(), 429);
        assert_eq!(c.error_message(), Some("429 too many requests"));
    }

    #[test]
    fn test_send_file_without_fs() {
        let mut c = ctx();
        assert!(matches!(
            c.send_file("index.html", SendFileOpts::default()),
            Err(Error::NoFileSystem)
        ));
        assert!(c.fs().is_err());
    }
}
