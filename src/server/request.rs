use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::net::IpAddr;
use url::Url;

use crate::error::{Error, HttpError};
use crate::router::Params;
use crate::utils::parse_kv;

/// Request body as captured by the transport.
///
/// Bodies are read eagerly up to the server's size limit and parsed lazily
/// by the accessor that asks for them.
#[derive(Debug, Clone, Default)]
pub enum RawBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// The body exceeded the configured limit and was discarded.
    TooLarge,
}

/// An inbound HTTP request.
///
/// Read-only for middleware except for `params`, which the router fills in
/// when a route matches.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RawBody,
    peer: Option<IpAddr>,
    /// Route parameters captured by the matching route pattern.
    pub params: Params,
}

impl Request {
    /// Build a request from transport-level parts.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `target` - Request target as sent on the request line (path and query)
    /// * `headers` - Request headers
    /// * `body` - Body captured by the transport
    /// * `peer` - Socket peer address, if known
    ///
    /// # Errors
    ///
    /// Returns a 400 `HttpError` when the target cannot form a valid URL.
    pub fn from_parts(
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: RawBody,
        peer: Option<IpAddr>,
    ) -> Result<Self, Error> {
        let host = headers
            .get(http::header::HOST)
            .and_then(|h| h.to_str().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or("localhost");
        let url = Url::parse(&format!("http://{host}{target}"))
            .map_err(|_| HttpError::bad_request("bad request"))?;
        Ok(Self {
            method,
            url,
            headers,
            body,
            peer,
            params: Params::new(),
        })
    }

    /// Start building a request by hand, mostly for tests.
    pub fn builder(method: Method, target: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            target: target.to_string(),
            headers: HeaderMap::new(),
            body: RawBody::Empty,
            peer: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Raw (still percent-encoded) path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Percent-decoded path, falling back to the raw path when it does not
    /// decode to UTF-8.
    pub fn decoded_path(&self) -> String {
        urlencoding::decode(self.url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.url.path().to_string())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Client IP address.
    ///
    /// Prefers the first `X-Forwarded-For` entry, falling back to the socket
    /// peer. An IPv4-mapped IPv6 prefix is stripped and loopback addresses
    /// are reported as `None`.
    pub fn ip(&self) -> Option<String> {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let ip = forwarded.or_else(|| self.peer.map(|p| p.to_string()))?;
        let ip = ip.strip_prefix("::ffff:").map(str::to_string).unwrap_or(ip);
        match ip.as_str() {
            "127.0.0.1" | "::1" => None,
            _ => Some(ip),
        }
    }

    /// Cookies from the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        parse_cookies(self.header("cookie").unwrap_or(""))
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Decoded query string pairs in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Last value of a query parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .filter(|(k, _)| k == name)
            .last()
            .map(|(_, v)| v.into_owned())
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Raw body bytes.
    ///
    /// # Errors
    ///
    /// Returns 413 if the body exceeded the server's size limit.
    pub fn bytes(&self) -> Result<&[u8], Error> {
        match &self.body {
            RawBody::Empty => Ok(&[]),
            RawBody::Bytes(b) => Ok(b),
            RawBody::TooLarge => Err(HttpError::new(413, "payload too large").into()),
        }
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String, Error> {
        String::from_utf8(self.bytes()?.to_vec())
            .map_err(|_| HttpError::bad_request("body is not valid utf-8").into())
    }

    /// Body parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(self.bytes()?)
            .map_err(|_| HttpError::bad_request("invalid json").into())
    }

    /// Body parsed as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> Result<HashMap<String, String>, Error> {
        Ok(url::form_urlencoded::parse(self.bytes()?)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect())
    }

    /// Body parsed as form data, either urlencoded or `multipart/form-data`.
    ///
    /// # Errors
    ///
    /// Returns 400 for other content types or a malformed multipart body.
    pub fn form_data(&self) -> Result<FormData, Error> {
        match self.content_type().as_deref() {
            Some("application/x-www-form-urlencoded") => {
                let fields = url::form_urlencoded::parse(self.bytes()?)
                    .map(|(k, v)| FormField {
                        name: k.into_owned(),
                        value: FormValue::Text(v.into_owned()),
                    })
                    .collect();
                Ok(FormData { fields })
            }
            Some("multipart/form-data") => {
                let boundary = self
                    .header("content-type")
                    .and_then(multipart_boundary)
                    .ok_or_else(|| HttpError::bad_request("missing multipart boundary"))?;
                parse_multipart(self.bytes()?, &boundary)
            }
            other => Err(HttpError::bad_request(format!(
                "unsupported form content type: {}",
                other.unwrap_or("none")
            ))
            .into()),
        }
    }
}

/// Incrementally assembles a [`Request`].
pub struct RequestBuilder {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: RawBody,
    peer: Option<IpAddr>,
}

impl RequestBuilder {
    /// Add a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = RawBody::Bytes(body.into());
        self
    }

    pub fn raw_body(mut self, body: RawBody) -> Self {
        self.body = body;
        self
    }

    pub fn peer(mut self, ip: IpAddr) -> Self {
        self.peer = Some(ip);
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        Request::from_parts(self.method, &self.target, self.headers, self.body, self.peer)
    }
}

/// Parse a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((name, value))
        })
        .collect()
}

/// Parsed form body.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// An uploaded file from a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FormData {
    /// First text field with this name.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match &f.value {
            FormValue::Text(t) if f.name == name => Some(t.as_str()),
            _ => None,
        })
    }

    /// First non-empty file part with this name.
    pub fn file(&self, name: &str) -> Option<&FilePart> {
        self.fields.iter().find_map(|f| match &f.value {
            FormValue::File(p) if f.name == name && !p.data.is_empty() => Some(p),
            _ => None,
        })
    }
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    parse_kv(content_type)
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| unquote(&v.to_string()).to_string())
        .filter(|b| !b.is_empty())
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormData, Error> {
    let malformed = || Error::from(HttpError::bad_request("malformed multipart body"));
    let delim = format!("--{boundary}").into_bytes();
    let mut pos = find(body, &delim, 0).ok_or_else(malformed)? + delim.len();
    let mut fields = Vec::new();
    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        if rest.starts_with(b"\r\n") {
            pos += 2;
        }
        let end = find(body, &delim, pos).ok_or_else(malformed)?;
        let mut part = &body[pos..end];
        if part.ends_with(b"\r\n") {
            part = &part[..part.len() - 2];
        }
        let split = find(part, b"\r\n\r\n", 0).ok_or_else(malformed)?;
        let head = std::str::from_utf8(&part[..split]).map_err(|_| malformed())?;
        let data = &part[split + 4..];

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for (k, v) in parse_kv(value) {
                    let v = v.to_string();
                    match k.as_str() {
                        "name" => name = Some(unquote(&v).to_string()),
                        "filename" => filename = Some(unquote(&v).to_string()),
                        _ => {}
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }
        let name = name.ok_or_else(malformed)?;
        let value = match filename {
            Some(filename) => FormValue::File(FilePart {
                filename,
                content_type,
                data: data.to_vec(),
            }),
            None => FormValue::Text(String::from_utf8_lossy(data).into_owned()),
        };
        fields.push(FormField { name, value });
        pos = end + delim.len();
    }
    Ok(FormData { fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies() {
        let c = parse_cookies("a=1; b = two ;flag; =x; c=d=e");
        assert_eq!(c.get("a").map(String::as_str), Some("1"));
        assert_eq!(c.get("b").map(String::as_str), Some("two"));
        assert_eq!(c.get("flag").map(String::as_str), Some(""));
        assert_eq!(c.get("c").map(String::as_str), Some("d=e"));
        assert!(!c.contains_key(""));
    }

    #[test]
    fn test_ip_prefers_forwarded_header() {
        let req = Request::builder(Method::GET, "/")
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .peer("198.51.100.2".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(req.ip().as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_ip_strips_mapped_prefix_and_loopback() {
        let req = Request::builder(Method::GET, "/")
            .peer("::ffff:192.0.2.1".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(req.ip().as_deref(), Some("192.0.2.1"));

        let local = Request::builder(Method::GET, "/")
            .peer("127.0.0.1".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(local.ip(), None);

        let local6 = Request::builder(Method::GET, "/")
            .header("X-Forwarded-For", "::1")
            .build()
            .unwrap();
        assert_eq!(local6.ip(), None);
    }

    #[test]
    fn test_query_helpers() {
        let req = Request::builder(Method::GET, "/search?q=rust+lang&page=1&page=2")
            .build()
            .unwrap();
        assert_eq!(req.query("q").as_deref(), Some("rust lang"));
        assert_eq!(req.query("page").as_deref(), Some("2"));
        assert_eq!(req.query_pairs().len(), 3);
        assert_eq!(req.path(), "/search");
    }

    #[test]
    fn test_decoded_path() {
        let req = Request::builder(Method::GET, "/files/my%20notes.txt")
            .build()
            .unwrap();
        assert_eq!(req.path(), "/files/my%20notes.txt");
        assert_eq!(req.decoded_path(), "/files/my notes.txt");
    }

    #[test]
    fn test_body_too_large() {
        let req = Request::builder(Method::POST, "/")
            .raw_body(RawBody::TooLarge)
            .build()
            .unwrap();
        match req.text() {
            Err(Error::Http(e)) => assert_eq!(e.status, 413),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_json_body() {
        let req = Request::builder(Method::POST, "/")
            .body(r#"{"name":"fang"}"#)
            .build()
            .unwrap();
        let v: serde_json::Value = req.json().unwrap();
        assert_eq!(v["name"], "fang");
    }

    #[test]
    fn test_urlencoded_form() {
        let req = Request::builder(Method::POST, "/")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("name=a+b&x=%21")
            .build()
            .unwrap();
        let form = req.form().unwrap();
        assert_eq!(form["name"], "a b");
        assert_eq!(req.form_data().unwrap().text("x"), Some("!"));
    }

    #[test]
    fn test_multipart_form() {
        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file body\r\n\
            --XyZ--\r\n";
        let req = Request::builder(Method::POST, "/")
            .header("Content-Type", "multipart/form-data; boundary=XyZ")
            .body(body)
            .build()
            .unwrap();
        let form = req.form_data().unwrap();
        assert_eq!(form.text("title"), Some("hello"));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.data, b"file body");
    }
}
