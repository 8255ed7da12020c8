//! The client-protocol error taxonomy and its fixed wire-format renderings.
//!
//! [`ErrorKind`] covers every condition the request state machine can raise
//! that still gets an HTTP response (400/405/408/413/414/431/503/505), plus
//! one connection-killing case, `Io`, for socket failures that can't get a
//! response at all (client disconnect mid-write, a write past a broken
//! pipe). `HttpConnection::run` matches `Io` out before it ever reaches
//! `send_error`, so a call site can't accidentally try to write a response
//! onto a socket that's already gone.

use crate::{query, Version};
use std::{error, fmt, io};

#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    InvalidMethod,
    MethodNotAllowed,

    InvalidUrl,
    UriTooLong,
    #[allow(dead_code)]
    Query(query::Error),

    InvalidVersion,
    UnsupportedVersion,

    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,

    BodyTooLarge,
    #[allow(dead_code)]
    BodyMismatch {
        expected: usize,
        available: usize,
    },
    #[allow(dead_code)]
    UnexpectedBody(usize),
    MalformedChunk,

    RequestTimeout,

    ServiceUnavailable,
    TlsRequired,
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        pub(crate) const fn as_http(
            &self,
            version: Version,
            json: bool,
        ) -> &'static [u8] {
            match (json, self, version) { $(
                (true, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (true, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidMethod: "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;
        MethodNotAllowed: "405 Method Not Allowed", "53"
            => r#"{"error":"Method not allowed","code":"METHOD_NOT_ALLOWED"}"#;

        InvalidUrl: "400 Bad Request", "51"
            => r#"{"error":"Invalid URL format","code":"INVALID_URL"}"#;
        UriTooLong: "414 Request-URI Too Long", "48"
            => r#"{"error":"Request URI too long","code":"URI_TOO_LONG"}"#;
        Query: "400 Bad Request", "55"
            => r#"{"error":"Invalid query string","code":"INVALID_QUERY"}"#;

        InvalidVersion: "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;

        InvalidHeader: "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        InvalidContentLength: "400 Bad Request", "66"
            => r#"{"error":"Invalid Content-Length","code":"INVALID_CONTENT_LENGTH"}"#;
        InvalidConnection: "400 Bad Request", "65"
            => r#"{"error":"Invalid Connection header","code":"INVALID_CONNECTION"}"#;

        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        BodyMismatch: "400 Bad Request", "55"
            => r#"{"error":"Body length mismatch","code":"BODY_MISMATCH"}"#;
        UnexpectedBody: "400 Bad Request", "60"
            => r#"{"error":"Unexpected request body","code":"UNEXPECTED_BODY"}"#;
        MalformedChunk: "400 Bad Request", "58"
            => r#"{"error":"Malformed chunk framing","code":"MALFORMED_CHUNK"}"#;

        RequestTimeout: "408 Request Timeout", "54"
            => r#"{"error":"Request timed out","code":"REQUEST_TIMEOUT"}"#;

        ServiceUnavailable: "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
        TlsRequired: "400 Bad Request", "64"
            => r#"{"error":"Plain HTTP request on TLS port","code":"TLS_REQUIRED"}"#;
        Io: "503 Service Unavailable", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }

    /// Whether this condition always forces the connection closed.
    ///
    /// Every client-protocol error currently does — §7's propagation policy
    /// forces `Connection: close` on all of them — but the flag is explicit
    /// so future additions (recoverable warnings) have somewhere to opt out.
    #[inline]
    pub(crate) const fn closes_connection(&self) -> bool {
        true
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<query::Error> for ErrorKind {
    fn from(err: query::Error) -> Self {
        ErrorKind::Query(err)
    }
}
impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_and_plain_forms_differ() {
        let json = ErrorKind::InvalidMethod.as_http(Version::Http11, true);
        let plain = ErrorKind::InvalidMethod.as_http(Version::Http11, false);

        assert!(std::str::from_utf8(json).unwrap().contains("INVALID_METHOD"));
        assert!(!std::str::from_utf8(plain).unwrap().contains("INVALID_METHOD"));
    }

    #[test]
    fn every_kind_forces_close() {
        assert!(ErrorKind::RequestTimeout.closes_connection());
        assert!(ErrorKind::MalformedChunk.closes_connection());
    }

    #[test]
    fn io_error_eq_compares_kind_only() {
        let a = IoError(io::Error::new(io::ErrorKind::BrokenPipe, "a"));
        let b = IoError(io::Error::new(io::ErrorKind::BrokenPipe, "b"));
        assert_eq!(a, b);
    }
}
