use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::io::{self, Cursor, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::request::{RawBody, Request};
use super::response::{Body, Response};
use super::service::Server;

/// Serves a [`Server`] over HTTP/1.1 using `tiny_http`.
pub struct HttpServer(pub Arc<Server>);

/// Handle to a running HTTP server
///
/// Provides methods for waiting until the server is ready, stopping it
/// gracefully, or joining the worker threads.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to (useful with port 0).
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// Polls the server address by attempting TCP connections until successful.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't become ready within ~250ms
    /// (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting requests and wait for every worker to exit.
    pub fn stop(self) {
        for _ in 0..self.workers.len() {
            self.server.unblock();
        }
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("HTTP worker panicked during shutdown");
            }
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Block until every worker exits.
    ///
    /// # Errors
    ///
    /// Returns the panic payload of the first worker that panicked.
    pub fn join(self) -> thread::Result<()> {
        for worker in self.workers {
            worker.join()?;
        }
        Ok(())
    }
}

impl HttpServer {
    /// Start the HTTP server on the given address
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to bind to (e.g., `"0.0.0.0:8080"` or `"127.0.0.1:0"`)
    ///
    /// # Returns
    ///
    /// A `ServerHandle` for managing the running server
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = tiny_http::Server::http(addr).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let bound = listener.server_addr().to_ip().unwrap_or(addr);
        let listener = Arc::new(listener);

        let count = self.0.opts().workers.max(1);
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let listener = Arc::clone(&listener);
            let app = Arc::clone(&self.0);
            let worker = thread::Builder::new()
                .name(format!("sitekit-http-{i}"))
                .spawn(move || serve(&listener, &app))?;
            workers.push(worker);
        }
        info!(addr = %bound, workers = count, "HTTP server listening");
        Ok(ServerHandle {
            addr: bound,
            server: listener,
            workers,
        })
    }
}

fn serve(listener: &tiny_http::Server, app: &Server) {
    for mut rq in listener.incoming_requests() {
        let max = app.opts().max_body_size;
        let response = match read_request(&mut rq, max) {
            Ok(req) => app.handle(req),
            Err(e) => {
                debug!(error = %e, url = %rq.url(), "Rejecting malformed request");
                let mut res = Response::new();
                res.send_text("400 bad request", 400);
                res
            }
        };
        if let Err(e) = rq.respond(to_tiny(response)) {
            debug!(error = %e, "Failed to write response");
        }
    }
}

fn read_request(rq: &mut tiny_http::Request, max_body: usize) -> Result<Request, crate::Error> {
    let method = http::Method::from_bytes(rq.method().as_str().as_bytes())
        .map_err(|_| crate::HttpError::bad_request("bad method"))?;
    let mut headers = HeaderMap::new();
    for h in rq.headers() {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(h.field.as_str().as_str().as_bytes()),
            HeaderValue::from_str(h.value.as_str()),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    let peer = rq.remote_addr().map(|a| a.ip());
    let target = rq.url().to_string();

    let mut buf = Vec::new();
    rq.as_reader()
        .take(max_body as u64 + 1)
        .read_to_end(&mut buf)?;
    let body = if buf.len() > max_body {
        RawBody::TooLarge
    } else if buf.is_empty() {
        RawBody::Empty
    } else {
        RawBody::Bytes(buf)
    };
    Request::from_parts(method, &target, headers, body, peer)
}

fn to_tiny(res: Response) -> tiny_http::Response<Box<dyn Read + Send>> {
    let (status, headers, body) = res.into_parts();
    let len = body.len() as usize;
    let reader: Box<dyn Read + Send> = match body {
        Body::Empty => Box::new(io::empty()),
        Body::Bytes(b) => Box::new(Cursor::new(b)),
        Body::Stream { reader, .. } => reader,
    };
    // A Content-Length header (kept for HEAD) overrides `len`.
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            tiny_http::Header::from_bytes(name.as_str().as_bytes(), value.as_bytes()).ok()
        })
        .collect();
    tiny_http::Response::new(tiny_http::StatusCode(status), headers, reader, Some(len), None)
}
