//! Integration tests for the HTTP transport and request pipeline
//!
//! # Test Coverage
//!
//! - End-to-end routing over a real socket: `/users/:id`, 404 fallback
//! - Query strings, JSON bodies, cookies and client IP resolution
//! - `HEAD` handling and body size limits
//! - Server startup and readiness
//!
//! # Test Strategy
//!
//! Each test binds a fresh server to `127.0.0.1:0` through [`TestServer`],
//! which stops it again on drop, and talks to it with a blocking `reqwest`
//! client. Pipeline behaviour that does not need a socket is exercised
//! through `Server::handle` directly.

use http::Method;
use serde_json::{json, Value};
use sitekit::router::Router;
use sitekit::server::{Server, ServerOpts};
use sitekit::HttpError;

mod common;
use common::requests::{get, get_from, request};
use common::test_server::TestServer;

fn app(opts: ServerOpts) -> Server {
    let mut router = Router::new();
    router.get("/users/:id", |ctx, _next| {
        let id = ctx.req.params["id"].clone();
        ctx.res.send_text(format!("user {id}"), ());
        Ok(())
    });
    router.get("/search", |ctx, _next| {
        let q = ctx.req.query("q").unwrap_or_default();
        ctx.res.send_json(&json!({ "q": q }), ())
    });
    router.post("/echo", |ctx, _next| {
        let body: Value = ctx.req.json()?;
        ctx.res.send_json(&body, 201)
    });
    router.get("/whoami", |ctx, _next| {
        let name = ctx.req.cookie("name").ok_or_else(HttpError::unauthorized)?;
        ctx.res.send_text(name, ());
        Ok(())
    });
    router.get("/ip", |ctx, _next| {
        let ip = ctx.req.ip();
        ctx.res.send_json(&ip, ())
    });

    let mut server = Server::new(opts);
    server.use_middleware(router.mount(""));
    server
}

fn small_workers() -> ServerOpts {
    ServerOpts {
        workers: 2,
        ..ServerOpts::default()
    }
}

#[test]
fn test_route_over_socket() {
    let server = TestServer::start(app(small_workers()));
    let res = reqwest::blocking::get(server.url("/users/42")).unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(res.text().unwrap(), "user 42");
}

#[test]
fn test_not_found_over_socket() {
    let server = TestServer::start(app(small_workers()));
    let res = reqwest::blocking::get(server.url("/missing")).unwrap();
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(res.text().unwrap(), "404 not found");
}

#[test]
fn test_json_round_trip_over_socket() {
    let server = TestServer::start(app(small_workers()));
    let client = reqwest::blocking::Client::new();
    let res = client
        .post(server.url("/echo"))
        .header("content-type", "application/json")
        .body(r#"{"a":1,"b":[true,null]}"#)
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    let body: Value = serde_json::from_str(&res.text().unwrap()).unwrap();
    assert_eq!(body, json!({"a": 1, "b": [true, null]}));
}

#[test]
fn test_invalid_json_is_400() {
    let server = TestServer::start(app(small_workers()));
    let res = reqwest::blocking::Client::new()
        .post(server.url("/echo"))
        .body("{oops")
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(res.text().unwrap(), "400 invalid json");
}

#[test]
fn test_body_over_limit_is_413() {
    let opts = ServerOpts {
        max_body_size: 16,
        ..small_workers()
    };
    let server = TestServer::start(app(opts));
    let res = reqwest::blocking::Client::new()
        .post(server.url("/echo"))
        .body(format!("[{}]", "1,".repeat(32) + "1"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 413);
}

#[test]
fn test_head_over_socket() {
    let server = TestServer::start(app(small_workers()));
    let res = reqwest::blocking::Client::new()
        .head(server.url("/users/7"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-length"].to_str().unwrap(), "6");
    assert!(res.bytes().unwrap().is_empty());
}

#[test]
fn test_query_and_cookies() {
    let server = app(ServerOpts::default());
    let res = server.handle(get("/search?q=hello%20world&q=last"));
    assert_eq!(res.text(), Some(r#"{"q":"last"}"#));

    let res = server.handle(
        request(Method::GET, "/whoami")
            .header("cookie", "theme=dark; name=fang")
            .build()
            .unwrap(),
    );
    assert_eq!(res.text(), Some("fang"));
    assert_eq!(server.handle(get("/whoami")).status, 401);
}

#[test]
fn test_client_ip() {
    let server = app(ServerOpts::default());
    let res = server.handle(get_from("/ip", "::ffff:198.51.100.4, 10.0.0.1"));
    assert_eq!(res.text(), Some(r#""198.51.100.4""#));
    let res = server.handle(get_from("/ip", "127.0.0.1"));
    assert_eq!(res.text(), Some("null"));
}

#[test]
fn test_request_id_is_reused() {
    let server = app(ServerOpts::default());
    let id = sitekit::ids::RequestId::new().to_string();
    let records = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&records);
    let _l = server.on_finish(move |r| sink.lock().unwrap().push(r.request_id.to_string()));
    server.handle(
        request(Method::GET, "/users/1")
            .header(sitekit::ids::RequestId::HEADER, &id)
            .build()
            .unwrap(),
    );
    assert_eq!(*records.lock().unwrap(), vec![id]);
}
