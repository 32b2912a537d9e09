use tracing::{info, info_span};

use super::Middleware;
use crate::dispatcher::Next;
use crate::error::Error;
use crate::server::Ctx;

/// Wraps the rest of the chain in a `handler` span and emits one event with
/// the final status and latency.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        let span = info_span!(
            "handler",
            method = %ctx.req.method(),
            path = %ctx.req.path(),
            ip = ctx.req.ip().as_deref().unwrap_or("-"),
        );
        let _entered = span.enter();
        let result = next.run(ctx);
        info!(
            status = ctx.res.status,
            latency_ms = ctx.elapsed().as_millis() as u64,
            error = ctx.error_message().unwrap_or(""),
            "Request handled"
        );
        result
    }
}
