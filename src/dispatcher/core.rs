use std::cell::Cell;
use std::sync::Arc;
use tracing::debug;

use crate::error::Error;
use crate::server::Ctx;

/// A unit of request processing.
///
/// Implemented for every `Fn(&mut Ctx, Next<'_>) -> Result<(), Error>`, so
/// plain closures and functions can be registered directly.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync,
{
    #[inline]
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        self(ctx, next)
    }
}

/// Pins a closure to the middleware signature so its argument types are
/// inferred without annotations.
#[inline]
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync,
{
    f
}

/// Renders an error caught by the dispatcher into the response.
///
/// Implementations must not fail; they should leave a finalized response.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, ctx: &mut Ctx, err: &Error);
}

impl<F> ErrorHandler for F
where
    F: Fn(&mut Ctx, &Error) + Send + Sync,
{
    fn handle(&self, ctx: &mut Ctx, err: &Error) {
        self(ctx, err)
    }
}

/// Produces a response when no middleware finalized one.
pub type NotFoundHandler = Arc<dyn Fn(&mut Ctx) + Send + Sync>;

/// One dispatch of a request through a middleware stack.
///
/// Owned by a single request; `last` records the highest index dispatched.
pub struct Chain<'a> {
    stack: &'a [Arc<dyn Middleware>],
    last: Cell<Option<usize>>,
    on_error: &'a dyn ErrorHandler,
}

impl<'a> Chain<'a> {
    #[must_use]
    pub fn new(stack: &'a [Arc<dyn Middleware>], on_error: &'a dyn ErrorHandler) -> Self {
        Self {
            stack,
            last: Cell::new(None),
            on_error,
        }
    }

    /// Run the stack from the first middleware.
    ///
    /// # Errors
    ///
    /// Only returns an error if the chain was already started.
    pub fn run(&self, ctx: &mut Ctx) -> Result<(), Error> {
        self.dispatch(0, ctx)
    }

    /// Number of middleware invoked so far.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.last.get().map_or(0, |i| (i + 1).min(self.stack.len()))
    }

    fn dispatch(&self, index: usize, ctx: &mut Ctx) -> Result<(), Error> {
        if self.last.get().is_some_and(|last| index <= last) {
            return Err(Error::NextCalledMultipleTimes);
        }
        self.last.set(Some(index));
        if ctx.res.is_finished() {
            debug!(index, "Response already finalized, stopping chain");
            return Ok(());
        }
        let Some(middleware) = self.stack.get(index) else {
            return Ok(());
        };
        let next = Next {
            chain: self,
            index: index + 1,
        };
        if let Err(err) = middleware.handle(ctx, next) {
            self.fail(ctx, err);
        }
        Ok(())
    }

    /// Route an error to the error handler, then to the request's error hooks.
    pub fn fail(&self, ctx: &mut Ctx, err: Error) {
        ctx.record_error(&err);
        self.on_error.handle(ctx, &err);
        ctx.run_error_hooks(&err);
    }
}

/// Continuation handed to a middleware; runs the rest of the stack.
pub struct Next<'a> {
    chain: &'a Chain<'a>,
    index: usize,
}

impl Next<'_> {
    /// Dispatch the next middleware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NextCalledMultipleTimes`] if this continuation (or an
    /// earlier one) has already been used. Errors raised by later middleware
    /// are handled inside the chain and are not returned here.
    pub fn run(&self, ctx: &mut Ctx) -> Result<(), Error> {
        self.chain.dispatch(self.index, ctx)
    }

    /// Index of the middleware this continuation will dispatch.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}
