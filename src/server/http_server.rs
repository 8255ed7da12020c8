//! [`HttpServer`]: the top-level coordinator binding an address, wiring up
//! a [`ConnectionManager`](super::connection_manager::ConnectionManager)
//! and [`WorkerPool`], and owning the `serving` lifecycle.

use crate::{
    limits::{ConnLimits, ManagerLimits, ReqLimits, RespLimits, ServerLimits},
    server::{connection_manager::ConnectionManager, worker_pool::Handler},
    tls::{ErasedTlsAdapter, TlsAdapter},
    ConnectionData, ConnectionFilter,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    marker::PhantomData,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;

/// A parsed bind target.
///
/// Mirrors the three forms a gateway process is typically configured with:
/// a TCP host/port (v4 or v6), a filesystem-path Unix-domain socket, or a
/// Linux abstract-namespace socket (leading NUL byte, never touches the
/// filesystem).
#[derive(Debug, Clone)]
pub enum BindAddr {
    Tcp(SocketAddr),
    /// Filesystem-path Unix-domain socket, with the desired file mode.
    Unix { path: std::path::PathBuf, mode: u32 },
    /// Linux abstract-namespace socket (name only, no leading `\0`).
    UnixAbstract(String),
}

impl BindAddr {
    /// Parses `addr` the way a gateway configuration string typically would:
    /// `host:port` for TCP, `unix:/path/to.sock` for a filesystem socket,
    /// `abstract:name` for a Linux abstract-namespace socket.
    pub fn parse(addr: &str) -> Result<Self, io::Error> {
        if let Some(path) = addr.strip_prefix("unix:") {
            return Ok(BindAddr::Unix {
                path: path.into(),
                mode: 0o666,
            });
        }
        if let Some(name) = addr.strip_prefix("abstract:") {
            return Ok(BindAddr::UnixAbstract(name.to_owned()));
        }
        addr.parse::<SocketAddr>()
            .map(BindAddr::Tcp)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

/// Top-level coordinator: bind address, handler, worker pool, connection
/// manager, and the knobs that don't belong to any one of those.
pub struct HttpServer<H, S = (), F = ()>
where
    H: Handler<S>,
    S: ConnectionData,
    F: ConnectionFilter,
{
    bind_addr: Option<BindAddr>,
    handler: Option<Arc<H>>,
    connection_filter: Arc<F>,
    _marker: PhantomData<S>,

    reuse_port: bool,
    request_queue_size: i32,
    shutdown_timeout: Duration,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    manager_limits: Option<ManagerLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,

    tls: Option<Arc<dyn ErasedTlsAdapter>>,

    manager: Option<ConnectionManager<H, S, F>>,
}

impl<H, S> HttpServer<H, S, ()>
where
    H: Handler<S>,
    S: ConnectionData,
{
    /// Starts building a server. `F` (the connection filter) defaults to
    /// `()` until `.conn_filter()` is called.
    #[inline]
    pub fn builder() -> Self {
        HttpServer {
            bind_addr: None,
            handler: None,
            connection_filter: Arc::new(()),
            _marker: PhantomData,

            reuse_port: false,
            request_queue_size: 1024,
            shutdown_timeout: Duration::from_secs(10),

            server_limits: None,
            connection_limits: None,
            manager_limits: None,
            request_limits: None,
            response_limits: None,

            tls: None,

            manager: None,
        }
    }
}

impl<H, S, F> HttpServer<H, S, F>
where
    H: Handler<S>,
    S: ConnectionData,
    F: ConnectionFilter,
{
    #[inline(always)]
    pub fn bind(mut self, addr: impl AsRef<str>) -> Result<Self, io::Error> {
        self.bind_addr = Some(BindAddr::parse(addr.as_ref())?);
        Ok(self)
    }

    #[inline(always)]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[inline(always)]
    pub fn conn_filter<NewF: ConnectionFilter>(self, filter: NewF) -> HttpServer<H, S, NewF> {
        HttpServer {
            bind_addr: self.bind_addr,
            handler: self.handler,
            connection_filter: Arc::new(filter),
            _marker: self._marker,

            reuse_port: self.reuse_port,
            request_queue_size: self.request_queue_size,
            shutdown_timeout: self.shutdown_timeout,

            server_limits: self.server_limits,
            connection_limits: self.connection_limits,
            manager_limits: self.manager_limits,
            request_limits: self.request_limits,
            response_limits: self.response_limits,

            tls: self.tls,

            manager: None,
        }
    }

    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn manager_limits(mut self, limits: ManagerLimits) -> Self {
        self.manager_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }

    /// Sets `TCP_NODELAY` on every accepted socket (default: `true`).
    #[inline(always)]
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        let mut limits = self.manager_limits.unwrap_or_default();
        limits.nodelay = nodelay;
        self.manager_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Terminates TLS on every accepted connection with `adapter` before it
    /// reaches the Worker Pool.
    ///
    /// A client that connects without sending anything resembling a TLS
    /// ClientHello gets a plain-text `400` and the connection is closed
    /// before a single byte reaches the HTTP/1.x state machine; a failed
    /// handshake just drops the connection.
    #[inline(always)]
    pub fn tls<A: TlsAdapter>(mut self, adapter: A) -> Self {
        self.tls = Some(Arc::new(adapter));
        self
    }

    /// Resolves the bind address, creates and configures the listening
    /// socket, and wires up the [`ConnectionManager`]/[`WorkerPool`]. Does
    /// not start accepting connections; call [`Self::serve`] for that.
    ///
    /// UNIX-domain and abstract-namespace addresses parse successfully but
    /// are not yet accepted here — this engine binds TCP listeners, the
    /// only transport its Worker Pool and request state machine handle.
    /// Peer-credential resolution (`peer_creds`) still operates correctly
    /// on UNIX-domain connections accepted by an embedder through another
    /// means; see `peer_creds.rs`.
    #[track_caller]
    pub async fn prepare(&mut self) -> Result<(), io::Error> {
        let bind_addr = self
            .bind_addr
            .clone()
            .expect("`bind` must be called before `prepare`");
        let handler = self
            .handler
            .clone()
            .expect("`handler` must be called before `prepare`");

        let addr = match bind_addr {
            BindAddr::Tcp(addr) => addr,
            BindAddr::Unix { .. } | BindAddr::UnixAbstract(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "UNIX-domain listening sockets are not supported by this engine",
                ));
            }
        };

        let listener = self.bind_tcp(addr)?;

        let server_limits = self.server_limits.clone().unwrap_or_default();
        let conn_limits = self.connection_limits.clone().unwrap_or_default();
        let manager_limits = self.manager_limits.clone().unwrap_or_default();
        let req_limits = self.request_limits.clone().unwrap_or_default().precalculate();
        let resp_limits = self.response_limits.clone().unwrap_or_default();

        self.manager = Some(ConnectionManager::new(
            listener,
            handler,
            self.connection_filter.clone(),
            manager_limits,
            (server_limits, conn_limits, req_limits, resp_limits),
            self.tls.clone(),
        ));

        Ok(())
    }

    fn bind_tcp(&self, addr: SocketAddr) -> Result<TcpListener, io::Error> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

        #[cfg(unix)]
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        if self.reuse_port {
            socket.set_reuse_port(true)?;
        }

        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(self.request_queue_size)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;

        Ok(listener)
    }

    /// The address actually bound, including the OS-assigned port when
    /// `bind` was given port `0`. `None` until [`Self::prepare`] succeeds.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.manager.as_ref().and_then(|m| m.local_addr().ok())
    }

    /// Runs the Connection Manager's accept loop until [`Self::stop`] is
    /// called. Must be preceded by [`Self::prepare`].
    pub async fn serve(&mut self) {
        let manager = self
            .manager
            .as_mut()
            .expect("`prepare` must be called before `serve`");

        tracing::info!("http server entering accept loop");
        manager.run().await;
    }

    /// `prepare()` + `serve()`.
    pub async fn start(&mut self) -> Result<(), io::Error> {
        self.prepare().await?;
        self.serve().await;
        Ok(())
    }

    /// Stops accepting, drains in-flight connections up to
    /// `shutdown_timeout`, and returns once every worker has exited or the
    /// deadline passes.
    pub async fn stop(&self) {
        if let Some(manager) = &self.manager {
            tracing::info!("http server shutting down");
            manager.stop(self.shutdown_timeout).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_bind_addr() {
        assert!(matches!(BindAddr::parse("127.0.0.1:8080").unwrap(), BindAddr::Tcp(_)));
    }

    #[test]
    fn parses_unix_bind_addr() {
        match BindAddr::parse("unix:/tmp/reqgate.sock").unwrap() {
            BindAddr::Unix { path, .. } => assert_eq!(path, std::path::Path::new("/tmp/reqgate.sock")),
            _ => panic!("expected Unix"),
        }
    }

    #[test]
    fn parses_abstract_bind_addr() {
        match BindAddr::parse("abstract:my-service").unwrap() {
            BindAddr::UnixAbstract(name) => assert_eq!(name, "my-service"),
            _ => panic!("expected UnixAbstract"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(BindAddr::parse("not an address").is_err());
    }
}
