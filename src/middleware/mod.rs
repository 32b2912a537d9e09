//! # Middleware Module
//!
//! Reusable middleware for the dispatcher pipeline.
//!
//! ## Overview
//!
//! - [`Logger`] - access log on stdout, in a file and/or a `request` table
//! - [`RateLimiter`] - per client IP request counting with a sliding window
//! - [`Gate`] - bearer token check in front of another middleware
//! - [`TracingMiddleware`] - a `tracing` span plus a completion event per request
//!
//! Every item here implements [`Middleware`], so it can be registered with
//! `Server::use_middleware` or wrapped around a single route.
//!
//! ## Example
//!
//! ```rust
//! use sitekit::middleware::{Logger, RateLimiter};
//! use sitekit::server::{Server, ServerOpts};
//! use std::time::Duration;
//!
//! let mut server = Server::new(ServerOpts::default());
//! server
//!     .use_middleware(Logger::new().stdout(false))
//!     .use_middleware(RateLimiter::new(Duration::from_secs(60), 100));
//! ```

mod auth;
mod logger;
mod rate_limit;
mod tracing;

pub use crate::dispatcher::Middleware;
pub use auth::{basic_auth, bearer_token, gate, Gate};
pub use logger::{format_line, Logger};
pub use rate_limit::RateLimiter;
pub use self::tracing::TracingMiddleware;
