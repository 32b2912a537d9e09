//! # Dispatcher Module
//!
//! The dispatcher threads one request context through an ordered stack of
//! middleware using explicit continuations.
//!
//! ## Overview
//!
//! Each middleware receives `(ctx, next)`. It may:
//! - finalize the response and return without calling `next`
//! - delegate by calling `next.run(ctx)` exactly once
//! - return an `Err`, which the dispatcher routes to the error handler
//!
//! ## State Machine
//!
//! A [`Chain`] is created per request and remembers the highest middleware
//! index dispatched so far. Dispatching an index that is not strictly
//! greater fails with [`crate::Error::NextCalledMultipleTimes`], which is
//! what a middleware sees when it calls `next` twice.
//!
//! ```text
//! dispatch(0) ─► mw[0](ctx, next=1) ─► dispatch(1) ─► mw[1](ctx, next=2) ─► ...
//!                     │                                   │
//!                     └── Err(e) ─► error handler          └── no call: chain stops at 1
//! ```
//!
//! ## Error Handling
//!
//! An error returned by a middleware is caught once, by the dispatch step
//! that invoked it. The error handler renders it and the request-scoped
//! error hooks run; enclosing middleware then see `Ok(())` from their `next`.
//!
//! ## Example
//!
//! ```rust
//! use sitekit::dispatcher::from_fn;
//! use sitekit::server::{Request, Server, ServerOpts};
//!
//! let mut server = Server::new(ServerOpts::default());
//! server.use_middleware(from_fn(|ctx, next| {
//!     ctx.res.headers.insert("x-powered-by", "sitekit".parse().unwrap());
//!     next.run(ctx)
//! }));
//! server.use_middleware(from_fn(|ctx, _next| {
//!     ctx.res.send_text("hello", ());
//!     Ok(())
//! }));
//!
//! let res = server.handle(Request::builder(http::Method::GET, "/").build().unwrap());
//! assert_eq!(res.status, 200);
//! ```

mod core;

pub use core::{from_fn, Chain, ErrorHandler, Middleware, Next, NotFoundHandler};
