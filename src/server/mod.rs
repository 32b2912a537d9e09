//! # Server Module
//!
//! Request/response model, the per-request context, the transport-agnostic
//! [`Server`] that runs the middleware pipeline, and the `tiny_http`
//! transport that exposes it over TCP.
//!
//! ## Request Lifecycle
//!
//! ```text
//! tiny_http worker ─► Request ─► Server::handle ─► Chain(middleware...) ─► Response
//!                                      │                     │
//!                                      │                     └─ Err / panic ─► error handler
//!                                      └─ unfinished ─► not-found handler
//! ```

mod context;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use context::Ctx;
pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_cookies, FilePart, FormData, FormField, FormValue, RawBody, Request, RequestBuilder};
pub use response::{Body, CookieOpts, Redirect, ResOpts, Response};
pub use service::{default_error_handler, default_not_found, RequestRecord, Server, ServerOpts};
