//! # sitekit
//!
//! A small middleware-based HTTP server toolkit with a SQLite table layer,
//! used to run a personal website and its helper services.
//!
//! ## Architecture
//!
//! ```text
//! tiny_http worker ──► Server::handle ──► Chain (middleware stack)
//!                                           │
//!                 ┌─────────────────────────┼───────────────────────────┐
//!                 ▼                         ▼                           ▼
//!           Logger / RateLimiter      Router (mounted)           files / filebrowser
//!                                           │                           │
//!                                     route handlers ──► db::Table   FileSystem
//! ```
//!
//! An inbound request is converted into a [`server::Request`], wrapped in a
//! [`server::Ctx`] together with a fresh [`server::Response`] builder and
//! threaded through the registered middleware. Each middleware receives a
//! [`dispatcher::Next`] continuation it may invoke at most once. Errors are
//! routed to a single error handler; a response that is never finalized
//! falls through to the not-found handler.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sitekit::router::Router;
//! use sitekit::server::{HttpServer, Server, ServerOpts};
//! use std::sync::Arc;
//!
//! let mut router = Router::new();
//! router.get("/users/:id", |ctx, _next| {
//!     let id = ctx.req.params.get("id").cloned().unwrap_or_default();
//!     ctx.res.send_text(format!("user {id}"), ());
//!     Ok(())
//! });
//!
//! let mut server = Server::new(ServerOpts::default());
//! server.use_middleware(router.mount(""));
//!
//! let handle = HttpServer(Arc::new(server)).start("127.0.0.1:8080").unwrap();
//! handle.join().unwrap();
//! ```
//!
//! ## Runtime Considerations
//!
//! Requests are served by a fixed pool of worker threads, each handling one
//! request at a time from start to finish. Timed background work (rate-limit
//! counter decrements, cron schedules) runs on `may` coroutines.

pub mod cli;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod filehost;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod site;
pub mod static_files;
pub mod utils;

pub use error::{Error, HttpError};
