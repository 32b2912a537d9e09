use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info_span, warn};

use super::context::Ctx;
use super::request::Request;
use super::response::Response;
use crate::dispatcher::{Chain, ErrorHandler, Middleware, NotFoundHandler};
use crate::error::Error;
use crate::ids::RequestId;
use crate::static_files::FileSystem;
use crate::utils::{Event, EventController, MB};

/// Server-wide options.
#[derive(Debug, Clone)]
pub struct ServerOpts {
    /// Largest request body read into memory; larger bodies make the body
    /// accessors fail with 413.
    pub max_body_size: usize,
    /// Number of transport worker threads.
    pub workers: usize,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            max_body_size: (16 * MB) as usize,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Summary of a completed request, delivered to [`Server::on_finish`]
/// listeners.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u128,
    pub size: u64,
    pub ip: Option<String>,
    pub error: Option<String>,
}

impl RequestRecord {
    fn from_ctx(ctx: &Ctx) -> Self {
        Self {
            request_id: ctx.request_id(),
            method: ctx.req.method().to_string(),
            path: ctx.req.path().to_string(),
            status: ctx.res.status,
            duration_ms: ctx.elapsed().as_millis(),
            size: ctx.res.body_len(),
            ip: ctx.req.ip(),
            error: ctx.error_message().map(str::to_string),
        }
    }
}

/// A middleware pipeline plus the handlers that terminate it.
///
/// `Server` is transport-agnostic: [`Server::handle`] turns a [`Request`]
/// into a finished [`Response`]. Wrap it in
/// [`HttpServer`](super::HttpServer) to serve it over TCP.
pub struct Server {
    opts: ServerOpts,
    fs: Option<Arc<dyn FileSystem>>,
    stack: Vec<Arc<dyn Middleware>>,
    on_error: Arc<dyn ErrorHandler>,
    on_not_found: NotFoundHandler,
    finished: Event<RequestRecord>,
}

impl Server {
    /// A server without filesystem capability.
    #[must_use]
    pub fn new(opts: ServerOpts) -> Self {
        Self {
            opts,
            fs: None,
            stack: Vec::new(),
            on_error: Arc::new(default_error_handler),
            on_not_found: Arc::new(default_not_found),
            finished: Event::new(),
        }
    }

    /// A server whose contexts can send files from `fs`.
    #[must_use]
    pub fn with_fs(opts: ServerOpts, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs: Some(fs),
            ..Self::new(opts)
        }
    }

    #[must_use]
    pub fn opts(&self) -> &ServerOpts {
        &self.opts
    }

    #[must_use]
    pub fn has_fs(&self) -> bool {
        self.fs.is_some()
    }

    /// Append a middleware to the end of the pipeline.
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.stack.push(Arc::new(middleware));
        self
    }

    /// Replace the error handler.
    pub fn on_error(&mut self, handler: impl ErrorHandler + 'static) -> &mut Self {
        self.on_error = Arc::new(handler);
        self
    }

    /// Replace the handler that runs when no middleware finished the response.
    pub fn on_not_found(&mut self, handler: impl Fn(&mut Ctx) + Send + Sync + 'static) -> &mut Self {
        self.on_not_found = Arc::new(handler);
        self
    }

    /// Listen for completed requests.
    pub fn on_finish(
        &self,
        listener: impl Fn(&RequestRecord) + Send + Sync + 'static,
    ) -> EventController {
        self.finished.add(listener)
    }

    /// Run one request through the pipeline.
    ///
    /// Errors and panics raised by middleware are routed to the error
    /// handler; a response nobody finished goes to the not-found handler.
    /// `HEAD` responses keep their headers but lose the body.
    pub fn handle(&self, req: Request) -> Response {
        let mut ctx = Ctx::new(req, self.fs.clone());
        let span = info_span!(
            "request",
            id = %ctx.request_id(),
            method = %ctx.req.method(),
            path = %ctx.req.path(),
        );
        let _entered = span.enter();

        let chain = Chain::new(&self.stack, self.on_error.as_ref());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| chain.run(&mut ctx)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => chain.fail(&mut ctx, err),
            Err(payload) => chain.fail(&mut ctx, Error::Panic(panic_message(payload.as_ref()))),
        }
        debug!(dispatched = chain.dispatched(), "Chain complete");

        if !ctx.res.is_finished() {
            (self.on_not_found)(&mut ctx);
            ctx.res.end();
        }
        ctx.run_finish_hooks();
        if self.finished.num_listeners() > 0 {
            self.finished.trigger(&RequestRecord::from_ctx(&ctx));
        }

        let is_head = *ctx.req.method() == http::Method::HEAD;
        let mut res = ctx.into_response();
        if is_head {
            res.strip_body();
        }
        res
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Render an [`HttpError`](crate::HttpError) as `"<status> <message>"` and
/// anything else as a generic 500, logging the detail server-side.
pub fn default_error_handler(ctx: &mut Ctx, err: &Error) {
    match err.as_http() {
        Some(e) => {
            warn!(status = e.status, message = %e.message, "Request failed");
            ctx.res.send_text(e.to_string(), e.status);
        }
        None => {
            error!(error = %err, "Unhandled error");
            ctx.res.send_text("500 internal server error", 500);
        }
    }
}

pub fn default_not_found(ctx: &mut Ctx) {
    ctx.res.send_text("404 not found", 404);
}
