//! # Router Module
//!
//! Path matching and method/path route dispatch.
//!
//! ## Overview
//!
//! A [`Router`] collects `(method, pattern, handler)` triples. Mounting it
//! at a prefix compiles every pattern once and yields a single middleware
//! ([`Mounted`]) that:
//!
//! - treats `HEAD` as `GET` when matching
//! - scans routes in registration order, first match wins
//! - stores the captured `:name` parameters on `ctx.req.params`
//! - calls `next` when nothing matches
//!
//! A matched handler receives the mounted router's continuation, so calling
//! `next` from a handler continues after the router, not with the next route.
//!
//! ## Example
//!
//! ```rust
//! use sitekit::router::Router;
//! use sitekit::server::{Request, Server, ServerOpts};
//!
//! let mut router = Router::new();
//! router.get("/users/:id", |ctx, _next| {
//!     let id = ctx.req.params["id"].clone();
//!     ctx.res.send_text(format!("user {id}"), ());
//!     Ok(())
//! });
//!
//! let mut server = Server::new(ServerOpts::default());
//! server.use_middleware(router.mount("/api"));
//!
//! let res = server.handle(Request::builder(http::Method::GET, "/api/users/7").build().unwrap());
//! assert_eq!(res.text(), Some("user 7"));
//! ```

mod core;
pub mod matcher;
#[cfg(test)]
mod tests;

pub use core::{route, Mounted, RouteMethod, Router};
pub use matcher::{match_path, Params, PathPattern};
