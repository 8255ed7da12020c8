//! Connection engine configuration: limits, timeouts, and TLS/peer-cred knobs.
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Slowloris attacks
//! - Header flooding
//!
//! # Memory Consumption
//!
//! Each active connection consumes memory according to:
//!
//! `Total` = [`Request Buffer`](crate::limits::ReqLimits#memory-allocation-strategy) +
//!           [`Response Buffer`](crate::limits::RespLimits#buffer-management) +
//!           `Runtime Overhead`
//!
//! See each component's documentation for details and configuration options.
//!
//! # Examples
//!
//! ```no_run
//! # reqgate::impt_default_handler!{MyHandler}
//! use reqgate::{HttpServer, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     HttpServer::builder()
//!         .bind("127.0.0.1:8080").unwrap()
//!         .handler(MyHandler)
//!         .server_limits(ServerLimits {
//!             max_workers: 500,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 18,
//!             max_request_body_size: 16 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .start()
//!         .await
//!         .unwrap();
//! }
//! ```

use crate::http::header_reader::{DefaultHeaderReader, HeaderReader};
use std::{sync::Arc, time::Duration};

/// Controls worker pool sizing, connection admission, and overload behavior.
///
/// # Connection management
///
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue if full? | =====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [---------]   Yes   /--------------------------\   No   [------]
/// [ Worker  ] <====== | Is there a free worker?  | =====> [ Wait ]
/// [---------]         \--------------------------/        [------]
/// ```
///
/// The ready queue is the hand-off point between the Connection Manager and
/// the Worker Pool; workers poll it using the configured `wait_strategy`.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Lower bound on live workers (default: `10`).
    ///
    /// The pool keeps at least this many workers alive until `stop()` is called.
    pub min_workers: usize,

    /// Upper bound on live workers (default: `100`).
    ///
    /// The pool never grows past this size; once reached, overload connections
    /// get a `503` instead of queueing indefinitely.
    pub max_workers: usize,

    /// Maximum number of accepted connections waiting in the ready queue (default: `250`).
    ///
    /// All accepted connections first go into this queue; workers pull from it.
    /// When full, new connections receive an immediate HTTP `503`.
    pub max_pending_connections: usize,

    /// Strategy for worker-task waiting behavior (default: `Sleep(50us)`).
    pub wait_strategy: WaitStrategy,

    /// Dedicated workers for queue-overflow `503` responses (default: `1`).
    ///
    /// Set to `0` to silently close the connection instead (not recommended).
    pub count_503_handlers: usize,

    /// Format for error responses (default: `true`).
    ///
    /// If `true`, errors are rendered as a small JSON body (`{"error":...,"code":...}`);
    /// if `false`, as an empty-body plain response.
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            min_workers: 10,
            max_workers: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,
            json_errors: true,

            _priv: (),
        }
    }
}

/// Strategy for worker-task waiting when the ready queue is empty.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Uses [`tokio::task::yield_now()`] while waiting.
    ///
    /// Keeps latency minimal but drives CPU load close to 100% on an idle
    /// pool; prefer `Sleep` unless you have measured the trade-off.
    Yield,

    /// Uses [`tokio::time::sleep()`] while waiting.
    Sleep(Duration),
}

/// Connection-level limits and timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for data on the socket (default: `2 seconds`).
    ///
    /// Also used as the per-request inactivity timeout during header/body
    /// reads; exceeding it aborts the request with `408` and closes.
    pub socket_read_timeout: Duration,

    /// Maximum duration to wait while writing to the socket (default: `3 seconds`).
    pub socket_write_timeout: Duration,

    /// Maximum number of requests allowed per connection (default: `100`).
    pub max_requests_per_connection: usize,

    /// Maximum lifetime of a connection from accept to close (default: `2 minutes`).
    pub connection_lifetime: Duration,

    /// Peer-Credential Resolver configuration (default: both flags off).
    pub peer_creds: PeerCredsConfig,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            connection_lifetime: Duration::from_secs(120),
            max_requests_per_connection: 100,
            peer_creds: PeerCredsConfig::default(),

            _priv: (),
        }
    }
}

/// Connection Manager tick/idle-set configuration.
#[derive(Debug, Clone)]
pub struct ManagerLimits {
    /// Selector tick granularity and idle-connection sweep period (default: `1 second`).
    pub expiration_interval: Duration,

    /// Maximum number of idle keep-alive connections tracked concurrently (default: `1000`).
    pub keep_alive_conn_limit: usize,

    /// Timeout for handing an accepted connection to the Worker Pool's ready
    /// queue before giving up and answering `503` (default: `1 second`).
    pub accepted_queue_timeout: Duration,

    /// Sets `TCP_NODELAY` on every accepted socket (default: `true`).
    pub nodelay: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ManagerLimits {
    fn default() -> Self {
        Self {
            expiration_interval: Duration::from_secs(1),
            keep_alive_conn_limit: 1000,
            accepted_queue_timeout: Duration::from_secs(1),
            nodelay: true,

            _priv: (),
        }
    }
}

/// HTTP request parsing limits and buffer pre-allocation strategy.
///
/// # Memory Allocation Strategy
///
/// Each connection pre-allocates a fixed-size buffer for the request line and
/// headers based on these limits; the body is read separately (streamed, not
/// pre-allocated) since bodies can legitimately be chunked/unbounded-until-
/// capped.
///
/// ```text
/// Header Buffer = First Line + (header_count x Header Line)
/// ```
///
/// | Component | Formula | Purpose |
/// |-----------|---------|---------|
/// | First Line | `19 + url_size` | `METHOD URL HTTP/1.1\r\n` |
/// | Header Line | `header_name_size + header_value_size + 4` | `Name: Value\r\n` |
#[derive(Clone)]
pub struct ReqLimits {
    /// Maximum URL length in bytes including path and query string (default: `256 B`).
    pub url_size: usize,
    /// Maximum number of path segments in the URL (default: `8`).
    pub url_parts: usize,
    /// Maximum query string length (default: `128 B`).
    pub url_query_size: usize,
    /// Maximum number of query parameters (default: `8`).
    pub url_query_parts: usize,

    /// Maximum number of headers per request (default: `16`).
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `64 B`).
    pub header_name_size: usize,
    /// Maximum header value length in bytes (default: `512 B`).
    pub header_value_size: usize,

    /// `max_request_header_size`: cap on the size-capped reader for the
    /// request line + headers combined (default: derived from the fields
    /// above via [`Self::estimated_header_size`] unless overridden).
    pub max_request_header_size: usize,

    /// `max_request_body_size`: cap enforced on both known-length and
    /// chunked request bodies (default: `4 KiB`).
    pub max_request_body_size: usize,

    /// The [`HeaderReader`] capability consulted for every parsed header
    /// name; [`DefaultHeaderReader`] accepts everything (default: accept
    /// any syntactically valid field).
    pub header_reader: Arc<dyn HeaderReader>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub precalc: ReqLimitsPrecalc,
}

impl std::fmt::Debug for ReqLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqLimits")
            .field("url_size", &self.url_size)
            .field("url_parts", &self.url_parts)
            .field("url_query_size", &self.url_query_size)
            .field("url_query_parts", &self.url_query_parts)
            .field("header_count", &self.header_count)
            .field("header_name_size", &self.header_name_size)
            .field("header_value_size", &self.header_value_size)
            .field("max_request_header_size", &self.max_request_header_size)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("header_reader", &"<dyn HeaderReader>")
            .field("precalc", &self.precalc)
            .finish()
    }
}

impl Default for ReqLimits {
    fn default() -> Self {
        let mut limits = Self {
            url_size: 256,
            url_parts: 8,
            url_query_size: 128,
            url_query_parts: 8,

            header_count: 16,
            header_name_size: 64,
            header_value_size: 512,

            max_request_header_size: 0,
            max_request_body_size: 4 * 1024,

            header_reader: Arc::new(DefaultHeaderReader),

            precalc: ReqLimitsPrecalc::default(),
        };
        limits.max_request_header_size = limits.estimated_header_size();
        limits
    }
}

impl ReqLimits {
    /// Returns the buffer size needed for the request line + headers.
    #[inline(always)]
    pub fn estimated_header_size(&self) -> usize {
        self.first_line() + self.header_count * self.h_line() + 2
    }

    #[inline(always)]
    pub(crate) fn precalculate(mut self) -> Self {
        self.precalc.first_line = self.first_line();
        self.precalc.h_line = self.h_line();
        self.precalc.header_buffer = self.estimated_header_size();
        // The request buffer covers the request line + headers *and* however
        // much of the body arrives in the same read; known-length and
        // chunked bodies that don't fit get topped up with further reads
        // into this same buffer, up to max_request_body_size total.
        self.precalc.buffer = self.precalc.header_buffer + self.max_request_body_size;

        self
    }

    #[inline(always)]
    // CONNECT /url/test HTTP/1.1\r\n
    // |-----| |-------| |------|
    //  Method    URl    Version
    // Formula: Method(7) + " " + URl + " " + Version(8) + "\r\n"
    fn first_line(&self) -> usize {
        19 + self.url_size
    }

    #[inline(always)]
    // Authorization: Sample%20Data\r\n
    // |-----------|  |-----------|
    //     Name           Value
    // Formula: Name + ": " + Value + "\r\n"
    fn h_line(&self) -> usize {
        self.header_name_size + self.header_value_size + 4
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Default)]
pub struct ReqLimitsPrecalc {
    pub(crate) header_buffer: usize,
    pub(crate) first_line: usize,
    pub(crate) h_line: usize,
    pub(crate) buffer: usize,
}

/// Configuration for response processing and memory allocation limits.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity allocated for responses (default: `1024 B`).
    pub default_capacity: usize,
    /// Maximum buffer capacity kept between requests before it's reallocated
    /// down to `default_capacity` (default: `8192 B`).
    pub max_capacity: usize,

    /// Value advertised in the auto-added `Keep-Alive: timeout=<n>` response
    /// header when a connection is kept alive on HTTP/1.1 (default: `2
    /// seconds`, matching [`ConnLimits::socket_read_timeout`]'s default).
    ///
    /// Purely advisory to the client; raise it alongside
    /// `socket_read_timeout` to keep the advertised value honest.
    pub keep_alive_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,
            keep_alive_timeout: Duration::from_secs(2),

            _priv: (),
        }
    }
}

/// TLS Adapter configuration: certificate material and cipher preferences.
///
/// Mirrors the constructor inputs in the TLS Adapter contract: certificate
/// path, private key path, optional chain, optional cipher list. The
/// private-key password callable form is intentionally not modeled here —
/// `rustls`/`openssl` key loading in this crate always reads unencrypted PEM
/// material, consistent with how both backing crates are typically deployed
/// behind a secrets manager rather than a password prompt.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM-encoded certificate (or certificate chain).
    pub cert_path: std::path::PathBuf,
    /// Path to the PEM-encoded private key.
    pub key_path: std::path::PathBuf,
    /// Restrict negotiated cipher suites to this explicit list, if given.
    pub cipher_list: Option<Vec<String>>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl TlsConfig {
    /// Builds a config pointing at a certificate/key PEM pair.
    pub fn new(cert_path: impl Into<std::path::PathBuf>, key_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            cipher_list: None,
            _priv: (),
        }
    }

    /// Restricts the adapter to the given cipher suite names.
    pub fn cipher_list(mut self, ciphers: Vec<String>) -> Self {
        self.cipher_list = Some(ciphers);
        self
    }
}

/// Peer-Credential Resolver configuration for local (Unix-domain) sockets.
#[derive(Debug, Clone)]
pub struct PeerCredsConfig {
    /// Whether peer-credential resolution runs at all (default: `false`).
    ///
    /// Has no effect on TCP connections, which always report
    /// [`PeerCredsError::Unavailable`](crate::peer_creds::PeerCredsError::Unavailable).
    pub peercreds_enabled: bool,

    /// Whether to additionally resolve numeric UID/GID into user/group names
    /// via the system account database (default: `false`).
    pub peercreds_resolve_enabled: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for PeerCredsConfig {
    fn default() -> Self {
        Self {
            peercreds_enabled: false,
            peercreds_resolve_enabled: false,
            _priv: (),
        }
    }
}
