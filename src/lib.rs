//! reqgate - an embeddable HTTP/1.x server engine for gateway processes.
//!
//! A small, self-contained request/response I/O engine: a single-threaded
//! selector-driven accept loop, a bounded elastic pool of request-handling
//! workers, and an HTTP/1.x state machine that frames bodies (fixed-length,
//! chunked, or size-capped), writes chunked or length-delimited responses,
//! and manages keep-alive. It does not route requests, speak HTTP/2 or
//! HTTP/3, cache or compress anything, or carry its own CLI — those are an
//! embedder's problem; this crate is the transport and framing underneath.
//!
//! # Protocol support
//!
//! - **HTTP/1.1**: persistent connections, chunked transfer-encoding.
//! - **HTTP/1.0**: basic request/response, no persistence unless the client
//!   asks for `Connection: keep-alive`.
//!
//! # Features
//!
//! - **Built-in overload protection** - a bounded ready queue answers 503
//!   once the worker pool can't keep up, rather than queuing unboundedly.
//! - **Custom connection filtering** - implement [`ConnectionFilter`] to
//!   reject unwanted peers before a single byte is parsed.
//! - **Per-connection state** - implement [`ConnectionData`] to carry data
//!   across requests on the same keep-alive connection.
//! - **TLS as a strategy object** - [`tls::TlsAdapter`] wraps an accepted
//!   socket and exposes peer-certificate fields to the handler; a `rustls`
//!   implementation ships by default, an OpenSSL one behind a feature.
//! - **Peer-credential resolution** - [`peer_creds::PeerCreds`] reads
//!   `SO_PEERCRED`/`LOCAL_PEERCRED` for local-socket deployments.
//! - **Graceful degradation** - exceeding a configured limit ends the
//!   connection with a typed error response, never a panic.
//!
//! # Quick start
//!
//! ```no_run
//! use reqgate::{HttpServer, Handler, Request, Response, Handled, StatusCode};
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
//!         resp.status(StatusCode::Ok).body("Hello world!")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     HttpServer::builder()
//!         .bind("127.0.0.1:8080")
//!         .unwrap()
//!         .handler(MyHandler)
//!         .start()
//!         .await
//!         .unwrap();
//! }
//! ```

pub(crate) mod http {
    pub mod header_reader;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod connection_manager;
    pub(crate) mod conn_stream;
    pub(crate) mod http_server;
    pub(crate) mod worker_pool;
}
pub(crate) mod errors;
pub mod limits;
pub mod peer_creds;
pub mod tls;

pub use crate::{
    http::{
        header_reader::{DefaultHeaderReader, DropUnderscoreHeaderReader, HeaderReader},
        query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Handled, Response,
        },
        types::{Method, StatusCode, Url, Version},
    },
    server::{
        connection::{ConnectionData, ConnectionFilter},
        http_server::{BindAddr, HttpServer},
        worker_pool::Handler,
    },
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use reqgate::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        // `<()>` to check functionality
        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("Hello world!")
            }
        }
    };
}

#[doc(hidden)]
#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str(value: Option<&[u8]>) -> Option<&str> {
        Some(from_utf8(value?).unwrap())
    }

    #[inline]
    pub(crate) fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }

    #[inline]
    pub(crate) fn str_2<'a>(value: (&'a [u8], &'a [u8])) -> (&'a str, &'a str) {
        (from_utf8(value.0).unwrap(), from_utf8(value.1).unwrap())
    }

    /// Replaces the dynamic `date: ...` header line with a fixed placeholder
    /// so a response buffer with an auto-added `Date` header can still be
    /// compared against an exact expected string.
    #[inline]
    pub(crate) fn normalize_date(value: &str) -> String {
        let Some(start) = value.find("date: ") else {
            return value.to_string();
        };
        let end = value[start..]
            .find("\r\n")
            .map(|i| start + i + 2)
            .unwrap_or(value.len());

        format!("{}date: <DATE>\r\n{}", &value[..start], &value[end..])
    }
}
