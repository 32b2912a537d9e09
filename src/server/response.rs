use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::Serialize;
use std::fmt;
use std::io::Read;
use tracing::warn;

use crate::error::Error;
use crate::utils::{build_kv, KvValue};

/// Response body.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// A streamed body of known length, e.g. a file slice.
    Stream {
        reader: Box<dyn Read + Send>,
        len: u64,
    },
}

impl Body {
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::Stream { len, .. } => *len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the body into memory.
    ///
    /// # Errors
    ///
    /// Propagates read errors from a streamed body.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Body::Empty => Ok(Vec::new()),
            Body::Bytes(b) => Ok(b),
            Body::Stream { mut reader, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(b) => write!(f, "Bytes({})", b.len()),
            Body::Stream { len, .. } => write!(f, "Stream({len})"),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

impl From<&[u8]> for Body {
    fn from(b: &[u8]) -> Self {
        Body::Bytes(b.to_vec())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(s.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Bytes(s.as_bytes().to_vec())
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

/// Status and extra headers applied by [`Response::send`].
#[derive(Debug, Clone, Default)]
pub struct ResOpts {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

impl ResOpts {
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

impl From<()> for ResOpts {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<u16> for ResOpts {
    fn from(status: u16) -> Self {
        Self::status(status)
    }
}

/// Redirect flavours accepted by [`Response::redirect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redirect {
    MovedPermanently,
    #[default]
    Found,
    SeeOther,
    Temporary,
    Permanent,
}

impl Redirect {
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Redirect::MovedPermanently => 301,
            Redirect::Found => 302,
            Redirect::SeeOther => 303,
            Redirect::Temporary => 307,
            Redirect::Permanent => 308,
        }
    }
}

/// Attributes for [`Response::set_cookie`].
#[derive(Debug, Clone, Default)]
pub struct CookieOpts {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub expires: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
}

/// A response under construction.
///
/// `status` and `headers` are public so middleware can adjust them before
/// the response is sent. Once [`Response::send`] (or a helper built on it)
/// has run, the response is finished and further sends are ignored.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    body: Body,
    finished: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: Body::Empty,
            finished: false,
        }
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the response.
    ///
    /// # Arguments
    ///
    /// * `body` - New body; an empty body keeps any body already set
    /// * `opts` - Optional status and extra headers
    ///
    /// Does nothing if the response is already finished.
    pub fn send(&mut self, body: impl Into<Body>, opts: impl Into<ResOpts>) {
        if self.finished {
            return;
        }
        let opts = opts.into();
        if let Some(status) = opts.status {
            self.status = status;
        }
        for (name, value) in &opts.headers {
            self.set_header(name, value);
        }
        let body = body.into();
        if !matches!(body, Body::Empty) {
            self.body = body;
        }
        self.finished = true;
    }

    /// Finish with whatever status, headers and body are already set.
    pub fn end(&mut self) {
        self.send(Body::Empty, ());
    }

    pub fn send_text(&mut self, text: impl Into<String>, opts: impl Into<ResOpts>) {
        self.send_typed("text/plain; charset=utf-8", text.into(), opts.into());
    }

    pub fn send_html(&mut self, html: impl Into<String>, opts: impl Into<ResOpts>) {
        self.send_typed("text/html; charset=utf-8", html.into(), opts.into());
    }

    /// Serialize `value` and send it as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails; the response is left open.
    pub fn send_json<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        opts: impl Into<ResOpts>,
    ) -> Result<(), Error> {
        let json = serde_json::to_string(value)?;
        self.send_typed("application/json; charset=utf-8", json, opts.into());
        Ok(())
    }

    fn send_typed(&mut self, content_type: &str, body: String, opts: ResOpts) {
        if self.finished {
            return;
        }
        self.set_header(CONTENT_TYPE.as_str(), content_type);
        self.send(body, opts);
    }

    /// Redirect to `location`.
    pub fn redirect(&mut self, location: &str, kind: Redirect) {
        if self.finished {
            return;
        }
        self.set_header(LOCATION.as_str(), location);
        self.send(Body::Empty, kind.status());
    }

    /// Set (replace) a header. Invalid names or values are logged and skipped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.insert(n, v);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }

    /// Append a `Set-Cookie` header.
    pub fn set_cookie(&mut self, name: &str, value: &str, opts: &CookieOpts) {
        let mut props: Vec<(&str, KvValue)> = vec![(name, value.into())];
        if let Some(p) = &opts.path {
            props.push(("Path", p.as_str().into()));
        }
        if let Some(d) = &opts.domain {
            props.push(("Domain", d.as_str().into()));
        }
        if let Some(age) = opts.max_age {
            props.push(("Max-Age", age.into()));
        }
        if let Some(e) = &opts.expires {
            props.push(("Expires", e.as_str().into()));
        }
        props.push(("HttpOnly", opts.http_only.into()));
        props.push(("Secure", opts.secure.into()));
        if let Some(s) = &opts.same_site {
            props.push(("SameSite", s.as_str().into()));
        }
        match HeaderValue::from_str(&build_kv(&props)) {
            Ok(v) => {
                self.headers.append(http::header::SET_COOKIE, v);
            }
            Err(_) => warn!(cookie = %name, "Skipping invalid cookie"),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Body length in bytes, preferring an explicit `Content-Length` header.
    #[must_use]
    pub fn body_len(&self) -> u64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| self.body.len())
    }

    /// Replace the body with nothing while keeping `Content-Length`, as
    /// required for `HEAD`.
    pub fn strip_body(&mut self) {
        let len = self.body_len();
        if !self.headers.contains_key(CONTENT_LENGTH) {
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        self.body = Body::Empty;
    }

    /// Body as UTF-8 text, for buffered bodies only.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Bytes(b) => std::str::from_utf8(b).ok(),
            Body::Empty => Some(""),
            Body::Stream { .. } => None,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_is_idempotent() {
        let mut res = Response::new();
        res.send_text("first", 201);
        res.send_text("second", 500);
        res.redirect("/elsewhere", Redirect::Found);
        assert_eq!(res.status, 201);
        assert_eq!(res.text(), Some("first"));
        assert!(res.headers.get(LOCATION).is_none());
    }

    #[test]
    fn test_end_keeps_existing_body() {
        let mut res = Response::new();
        res.status = 418;
        res.end();
        assert!(res.is_finished());
        assert_eq!(res.status, 418);
        assert_eq!(res.body_len(), 0);
    }

    #[test]
    fn test_json_sets_content_type() {
        let mut res = Response::new();
        res.send_json(&serde_json::json!({"ok": true}), ()).unwrap();
        assert_eq!(
            res.headers[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(res.text(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn test_redirect_statuses() {
        let mut res = Response::new();
        res.redirect("https://example.com/", Redirect::SeeOther);
        assert_eq!(res.status, 303);
        assert_eq!(res.headers[LOCATION], "https://example.com/");
        assert_eq!(Redirect::default().status(), 302);
        assert_eq!(Redirect::Permanent.status(), 308);
    }

    #[test]
    fn test_set_cookie() {
        let mut res = Response::new();
        res.set_cookie(
            "sid",
            "abc",
            &CookieOpts {
                path: Some("/".into()),
                http_only: true,
                ..Default::default()
            },
        );
        assert_eq!(
            res.headers[http::header::SET_COOKIE],
            "sid=abc; Path=/; HttpOnly"
        );
    }

    #[test]
    fn test_strip_body_keeps_length() {
        let mut res = Response::new();
        res.send_text("hello", ());
        res.strip_body();
        assert_eq!(res.headers[CONTENT_LENGTH], "5");
        assert!(res.body().is_empty());
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let mut res = Response::new();
        res.set_header("bad header", "x");
        res.set_header("x-ok", "bad\nvalue");
        assert!(res.headers.is_empty());
    }
}
