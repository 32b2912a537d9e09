//! Error types shared by the middleware pipeline.
//!
//! Every middleware returns `Result<(), Error>`. The dispatcher catches an
//! `Err` once and hands it to the server's error handler, which renders an
//! [`HttpError`] verbatim and anything else as a generic 500.

use std::fmt;
use std::io;

use crate::db::DbError;

/// An error that carries an explicit HTTP status and a client-facing message.
///
/// The default error handler renders it as plain text `"<status> <message>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(401, "unauthorized")
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404, "not found")
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// The error type returned by middleware and handlers.
#[derive(Debug)]
pub enum Error {
    /// A client-facing error with an explicit status code.
    Http(HttpError),
    Io(io::Error),
    Json(serde_json::Error),
    Db(DbError),
    /// A middleware invoked its continuation more than once.
    NextCalledMultipleTimes,
    /// `send_file` was used on a server constructed without a filesystem.
    NoFileSystem,
    /// A middleware panicked; the payload message is kept for logging only.
    Panic(String),
    Internal(anyhow::Error),
}

impl Error {
    /// Returns the HTTP error if this is a client-facing error.
    #[must_use]
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Http(e) => Some(e),
            _ => None,
        }
    }

    /// Status code this error renders as under the default error handler.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.as_http().map_or(500, |e| e.status)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Db(e) => write!(f, "database error: {e}"),
            Error::NextCalledMultipleTimes => write!(f, "next() called multiple times"),
            Error::NoFileSystem => write!(f, "server has no filesystem capability"),
            Error::Panic(msg) => write!(f, "handler panicked: {msg}"),
            Error::Internal(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Db(e) => Some(e),
            Error::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Error::Http(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<DbError> for Error {
    fn from(e: DbError) -> Self {
        Error::Db(e)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let e = HttpError::new(416, "invalid range");
        assert_eq!(e.to_string(), "416 invalid range");
    }

    #[test]
    fn test_status_defaults_to_500() {
        let e = Error::from(io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(e.status(), 500);
        assert_eq!(Error::from(HttpError::not_found()).status(), 404);
    }
}
