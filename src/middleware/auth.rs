use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use super::Middleware;
use crate::dispatcher::Next;
use crate::error::{Error, HttpError};
use crate::server::{Ctx, Request};

fn credentials<'a>(req: &'a Request, scheme: &str) -> Option<&'a str> {
    let auth = req.header("authorization")?;
    let (given, cred) = auth.split_once(' ')?;
    if !given.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let cred = cred.trim();
    (!cred.is_empty()).then_some(cred)
}

/// Token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(req: &Request) -> Option<String> {
    credentials(req, "bearer").map(str::to_string)
}

/// `(user, password)` from an `Authorization: Basic <base64>` header.
///
/// A credential without a `:` yields an empty password.
#[must_use]
pub fn basic_auth(req: &Request) -> Option<(String, String)> {
    let cred = credentials(req, "basic")?;
    let decoded = STANDARD.decode(cred).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    match decoded.split_once(':') {
        Some((user, pass)) => Some((user.to_string(), pass.to_string())),
        None => Some((decoded, String::new())),
    }
}

/// Runs the wrapped middleware only for requests bearing the expected token.
///
/// Anything else fails with `401 unauthorized`. An empty expected token
/// rejects every request.
pub struct Gate<M> {
    token: String,
    inner: M,
}

/// Guard `inner` behind a bearer token.
pub fn gate<M: Middleware>(token: &str, inner: M) -> Gate<M> {
    Gate {
        token: token.to_string(),
        inner,
    }
}

impl<M: Middleware> Middleware for Gate<M> {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        match bearer_token(&ctx.req) {
            Some(token) if !self.token.is_empty() && token == self.token => {
                self.inner.handle(ctx, next)
            }
            _ => {
                debug!(path = %ctx.req.path(), "Rejected request without valid bearer token");
                Err(HttpError::unauthorized().into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::from_fn;
    use crate::router::route;
    use crate::server::{Server, ServerOpts};
    use http::Method;

    fn req(auth: Option<&str>) -> Request {
        let mut b = Request::builder(Method::GET, "/secret");
        if let Some(a) = auth {
            b = b.header("authorization", a);
        }
        b.build().unwrap()
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&req(Some("Bearer abc"))).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&req(Some("bearer abc"))).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&req(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&req(Some("Bearer"))), None);
        assert_eq!(bearer_token(&req(None)), None);
    }

    #[test]
    fn test_basic_auth() {
        // "user:pa:ss"
        let r = req(Some("Basic dXNlcjpwYTpzcw=="));
        assert_eq!(basic_auth(&r), Some(("user".into(), "pa:ss".into())));
        assert_eq!(basic_auth(&req(Some("Basic !!!"))), None);
        assert_eq!(basic_auth(&req(Some("Bearer dXNlcjpwYTpzcw=="))), None);
    }

    fn gated_server(token: &str) -> Server {
        let mut server = Server::new(ServerOpts::default());
        server.use_middleware(route(
            Method::GET,
            "/secret",
            gate(
                token,
                from_fn(|ctx, _next| {
                    ctx.res.send_text("ok", ());
                    Ok(())
                }),
            ),
        ));
        server
    }

    #[test]
    fn test_gate() {
        let server = gated_server("s3cret");
        let res = server.handle(req(Some("Bearer s3cret")));
        assert_eq!(res.status, 200);
        assert_eq!(res.text(), Some("ok"));

        let res = server.handle(req(Some("Bearer nope")));
        assert_eq!(res.status, 401);
        assert_eq!(res.text(), Some("401 unauthorized"));

        assert_eq!(server.handle(req(None)).status, 401);
    }

    #[test]
    fn test_empty_token_rejects_everything() {
        let server = gated_server("");
        assert_eq!(server.handle(req(Some("Bearer "))).status, 401);
        assert_eq!(server.handle(req(None)).status, 401);
    }
}
