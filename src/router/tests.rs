use super::{route, RouteMethod, Router};
use crate::server::{Request, Response, Server, ServerOpts};
use http::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn serve(router: &Router, prefix: &str, method: Method, path: &str) -> Response {
    let mut server = Server::new(ServerOpts::default());
    server.use_middleware(router.mount(prefix));
    server.handle(Request::builder(method, path).build().unwrap())
}

#[test]
fn test_params_assigned_on_match() {
    let mut router = Router::new();
    router.get("/users/:id", |ctx, _next| {
        let id = ctx.req.params.get("id").cloned().unwrap_or_default();
        ctx.res.send_text(id, ());
        Ok(())
    });
    let res = serve(&router, "", Method::GET, "/users/42");
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), Some("42"));
}

#[test]
fn test_first_match_wins() {
    let second = Arc::new(AtomicUsize::new(0));
    let hits = second.clone();
    let mut router = Router::new();
    router.get("/a/:x", |ctx, _next| {
        ctx.res.send_text("first", ());
        Ok(())
    });
    router.get("/a/b", move |ctx, _next| {
        hits.fetch_add(1, Ordering::SeqCst);
        ctx.res.send_text("second", ());
        Ok(())
    });
    let res = serve(&router, "", Method::GET, "/a/b");
    assert_eq!(res.text(), Some("first"));
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn test_no_fallthrough_on_handler_error() {
    let mut router = Router::new();
    router.get("/x", |_ctx, _next| Err(crate::HttpError::new(418, "teapot").into()));
    router.get("/x", |ctx, _next| {
        ctx.res.send_text("later", ());
        Ok(())
    });
    let res = serve(&router, "", Method::GET, "/x");
    assert_eq!(res.status, 418);
    assert_eq!(res.text(), Some("418 teapot"));
}

#[test]
fn test_method_mismatch_falls_through() {
    let mut router = Router::new();
    router.post("/items", |ctx, _next| {
        ctx.res.send_text("created", 201);
        Ok(())
    });
    let res = serve(&router, "", Method::GET, "/items");
    assert_eq!(res.status, 404);
}

#[test]
fn test_head_matches_get_route() {
    let mut router = Router::new();
    router.get("/page", |ctx, _next| {
        ctx.res.send_text("hello", ());
        Ok(())
    });
    let res = serve(&router, "", Method::HEAD, "/page");
    assert_eq!(res.status, 200);
    assert_eq!(res.headers[http::header::CONTENT_LENGTH], "5");
    assert!(res.body().is_empty());
}

#[test]
fn test_wildcard_method() {
    let mut router = Router::new();
    router.any("/echo", |ctx, _next| {
        let m = ctx.req.method().to_string();
        ctx.res.send_text(m, ());
        Ok(())
    });
    assert_eq!(serve(&router, "", Method::PATCH, "/echo").text(), Some("PATCH"));
    assert_eq!(serve(&router, "", Method::DELETE, "/echo").text(), Some("DELETE"));
}

#[test]
fn test_mount_prefix() {
    let mut router = Router::new();
    router.get("/ping", |ctx, _next| {
        ctx.res.send_text("pong", ());
        Ok(())
    });
    assert_eq!(serve(&router, "/api/", Method::GET, "/api/ping").text(), Some("pong"));
    assert_eq!(serve(&router, "/api", Method::GET, "/ping").status, 404);
    let mounted = router.mount("/api");
    let patterns: Vec<_> = mounted.patterns().map(|(_, p)| p.to_string()).collect();
    assert_eq!(patterns, vec!["/api/ping"]);
}

#[test]
fn test_matches_decoded_path() {
    let mut router = Router::new();
    router.get("/files/:name", |ctx, _next| {
        let name = ctx.req.params["name"].clone();
        ctx.res.send_text(name, ());
        Ok(())
    });
    let res = serve(&router, "", Method::GET, "/files/my%20file.txt");
    assert_eq!(res.text(), Some("my file.txt"));
}

#[test]
fn test_handler_next_continues_after_router() {
    let mut router = Router::new();
    router.get("/skip", |ctx, next| next.run(ctx));
    router.get("/skip", |ctx, _next| {
        ctx.res.send_text("route two", ());
        Ok(())
    });
    let mut server = Server::new(ServerOpts::default());
    server.use_middleware(router.mount(""));
    server.use_middleware(crate::dispatcher::from_fn(|ctx, _next| {
        ctx.res.send_text("after router", ());
        Ok(())
    }));
    let res = server.handle(Request::builder(Method::GET, "/skip").build().unwrap());
    assert_eq!(res.text(), Some("after router"));
}

#[test]
fn test_single_route() {
    let mut server = Server::new(ServerOpts::default());
    let handler = crate::dispatcher::from_fn(|ctx, _next| {
        let k = ctx.req.params["k"].clone();
        ctx.res.send_text(k, ());
        Ok(())
    });
    server.use_middleware(route(RouteMethod::Exact(Method::PUT), "/r/:k", handler));
    let res = server.handle(Request::builder(Method::PUT, "/r/v").build().unwrap());
    assert_eq!(res.text(), Some("v"));
    assert_eq!(RouteMethod::Any.to_string(), "*");
}
