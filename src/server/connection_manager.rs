//! The Connection Manager: a single-threaded accept loop that owns every
//! socket between `accept()` and the moment it has at least one byte to
//! give a worker.
//!
//! Realized as one dedicated Tokio task per listener driven by
//! [`tokio::select!`] over `accept()` and a [`FuturesUnordered`] of
//! per-connection readability futures — the async-runtime equivalent of a
//! `poll`/`epoll` selector, since the whole I/O stack here already runs on
//! Tokio's reactor. The Manager never runs request-handling code itself;
//! readability only triggers a bounded hand-off into the [`WorkerPool`]'s
//! ready queue.
//!
//! Once a connection reaches a worker it stays there for the lifetime of
//! its keep-alive session rather than bouncing back through the selector
//! between requests — matching the single-task-per-connection shape the
//! request cycle already has, and avoiding a reselect on every request.

use crate::server::conn_stream::ConnStream;
use crate::server::worker_pool::{AllLimits, Handler, TcpQueue, WorkerPool};
use crate::tls::{ErasedTlsAdapter, TlsOutcome};
use crate::{errors::ErrorKind, limits::ManagerLimits, ConnectionData, ConnectionFilter, Version};
use futures_util::{stream::FuturesUnordered, StreamExt};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};

type PendingConn = (TcpStream, SocketAddr, SocketAddr);

/// Owns the listening socket and the set of accepted-but-not-yet-readable
/// connections, and feeds a [`WorkerPool`] with connections as they become
/// readable.
pub(crate) struct ConnectionManager<H: Handler<S>, S: ConnectionData, F: ConnectionFilter> {
    listener: TcpListener,
    pool: Arc<WorkerPool<H, S, F>>,
    manager_limits: ManagerLimits,
    serving: Arc<AtomicBool>,
    tls: Option<Arc<dyn ErasedTlsAdapter>>,
}

impl<H: Handler<S>, S: ConnectionData, F: ConnectionFilter> ConnectionManager<H, S, F> {
    #[inline]
    pub(crate) fn new(
        listener: TcpListener,
        handler: Arc<H>,
        filter: Arc<F>,
        manager_limits: ManagerLimits,
        limits: AllLimits,
        tls: Option<Arc<dyn ErasedTlsAdapter>>,
    ) -> Self {
        let queue: TcpQueue = Arc::new(crossbeam::queue::SegQueue::new());
        let pool = Arc::new(WorkerPool::new(queue, handler, filter, limits));

        Self {
            listener,
            pool,
            manager_limits,
            serving: Arc::new(AtomicBool::new(true)),
            tls,
        }
    }

    /// A handle that [`Self::stop`] flips to end the accept loop.
    pub(crate) fn serving_flag(&self) -> Arc<AtomicBool> {
        self.serving.clone()
    }

    /// The address actually bound, including the OS-assigned port when the
    /// configured port was `0`.
    pub(crate) fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the selector-equivalent loop until [`Self::stop`] is requested.
    pub(crate) async fn run(&mut self) {
        let mut idle: FuturesUnordered<_> = FuturesUnordered::new();

        while self.serving.load(Ordering::Relaxed) {
            tokio::select! {
                biased;

                accepted = self.listener.accept(), if idle.len() < self.manager_limits.keep_alive_conn_limit => {
                    let Ok((stream, client_addr)) = accepted else { continue };
                    let Ok(server_addr) = stream.local_addr() else { continue };
                    if self.manager_limits.nodelay {
                        let _ = stream.set_nodelay(true);
                    }

                    tracing::trace!(peer = %client_addr, "connection accepted, awaiting first byte");
                    idle.push(readiness_peek(stream, client_addr, server_addr));
                }

                Some(ready) = idle.next(), if !idle.is_empty() => {
                    self.dispatch(ready).await;
                }
            }
        }
    }

    async fn dispatch(&self, conn: PendingConn) {
        let (stream, client_addr, server_addr) = conn;

        let stream = match self.terminate_tls(stream, client_addr).await {
            Some(stream) => stream,
            None => return,
        };

        let queue = self.pool.queue();
        let max_pending = self.pool.max_pending_connections();

        let deadline = tokio::time::Instant::now() + self.manager_limits.accepted_queue_timeout;
        loop {
            if queue.len() < max_pending {
                queue.push((stream, client_addr, server_addr));
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(peer = %client_addr, "ready queue saturated, answering 503");
                self.pool.error_queue().push((stream, client_addr, server_addr));
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Runs the configured [`ErasedTlsAdapter`] (if any) over a freshly
    /// readable socket. `None` means the connection is already fully
    /// handled (a plain-text 400 written and the socket closed, or a
    /// handshake that failed outright) and must not reach the worker pool.
    async fn terminate_tls(&self, stream: TcpStream, client_addr: SocketAddr) -> Option<ConnStream> {
        let Some(adapter) = &self.tls else {
            return Some(ConnStream::Plain(stream));
        };

        match adapter.wrap_erased(stream).await {
            Ok(TlsOutcome::Tls(wrapped)) => Some(ConnStream::Wrapped(wrapped.stream, wrapped.environ)),
            Ok(TlsOutcome::Plain(mut sock)) => {
                tracing::debug!(peer = %client_addr, "plain HTTP request on TLS port, answering 400");
                let _ = sock
                    .write_all(ErrorKind::TlsRequired.as_http(Version::Http11, false))
                    .await;
                None
            }
            Err(e) => {
                tracing::warn!(peer = %client_addr, error = %e, "TLS handshake failed");
                None
            }
        }
    }

    /// Stops accepting; in-flight connections in the worker pool still run
    /// to completion via [`WorkerPool::stop`].
    pub(crate) async fn stop(&self, shutdown_timeout: std::time::Duration) {
        self.serving.store(false, Ordering::Relaxed);
        self.pool.stop(shutdown_timeout).await;
    }
}

async fn readiness_peek(
    stream: TcpStream,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
) -> PendingConn {
    // `readable()` resolves once `MSG_PEEK`-class readiness is observed;
    // it never consumes bytes, so the worker's own buffered reader still
    // sees the first byte it reads.
    let _ = stream.readable().await;
    (stream, client_addr, server_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits},
        Handled, Request, Response, StatusCode,
    };

    struct EchoHandler;

    impl Handler<()> for EchoHandler {
        async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
            resp.status(StatusCode::Ok).body("ok")
        }
    }

    fn test_all_limits() -> AllLimits {
        (
            ServerLimits {
                min_workers: 1,
                max_workers: 2,
                ..ServerLimits::default()
            },
            ConnLimits::default(),
            ReqLimits::default().precalculate(),
            RespLimits::default(),
        )
    }

    #[tokio::test]
    async fn manager_accepts_and_dispatches() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(
            listener,
            Arc::new(EchoHandler),
            Arc::new(()),
            ManagerLimits::default(),
            test_all_limits(),
            None,
        );
        let serving = manager.serving_flag();

        let run_task = tokio::spawn(async move { manager.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"GET / HTTP/1.1\r\nhost: x\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), client.read_to_end(&mut buf)).await;
        assert!(buf.starts_with(b"HTTP/1.1 200"));

        serving.store(false, Ordering::Relaxed);
        run_task.abort();
    }

    struct RejectEverythingAdapter;

    impl crate::tls::TlsAdapter for RejectEverythingAdapter {
        type Stream = TcpStream;

        async fn wrap(&self, sock: TcpStream) -> Result<TlsOutcome<Self::Stream>, crate::tls::TlsError> {
            Ok(TlsOutcome::Plain(sock))
        }
    }

    /// Skips the real handshake but reports a TLS environment, so tests can
    /// exercise the wiring without a certificate.
    struct StubTlsAdapter;

    impl crate::tls::TlsAdapter for StubTlsAdapter {
        type Stream = TcpStream;

        async fn wrap(
            &self,
            sock: TcpStream,
        ) -> Result<TlsOutcome<Self::Stream>, crate::tls::TlsError> {
            let mut env = std::collections::HashMap::new();
            env.insert("HTTPS", "on".to_owned());
            Ok(TlsOutcome::Tls(crate::tls::TlsConnection {
                stream: sock,
                environ: crate::tls::TlsEnviron(env),
            }))
        }
    }

    struct EchoesTlsEnviron;

    impl Handler<()> for EchoesTlsEnviron {
        async fn handle(&self, _: &mut (), req: &Request, resp: &mut Response) -> Handled {
            let https = req.tls_environ().is_some_and(|e| e.is_https());
            resp.status(StatusCode::Ok).body(if https { "tls" } else { "plain" })
        }
    }

    #[tokio::test]
    async fn a_terminated_handshake_exposes_its_environ_to_the_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(
            listener,
            Arc::new(EchoesTlsEnviron),
            Arc::new(()),
            ManagerLimits::default(),
            test_all_limits(),
            Some(Arc::new(StubTlsAdapter)),
        );
        let serving = manager.serving_flag();

        let run_task = tokio::spawn(async move { manager.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"GET / HTTP/1.1\r\nhost: x\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), client.read_to_end(&mut buf)).await;
        assert!(String::from_utf8_lossy(&buf).ends_with("tls"));

        serving.store(false, Ordering::Relaxed);
        run_task.abort();
    }

    #[tokio::test]
    async fn plain_http_on_a_tls_listener_gets_a_plain_text_400() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(
            listener,
            Arc::new(EchoHandler),
            Arc::new(()),
            ManagerLimits::default(),
            test_all_limits(),
            Some(Arc::new(RejectEverythingAdapter)),
        );
        let serving = manager.serving_flag();

        let run_task = tokio::spawn(async move { manager.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"GET / HTTP/1.1\r\nhost: x\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), client.read_to_end(&mut buf)).await;
        assert!(buf.starts_with(b"HTTP/1.1 400"));
        assert!(!String::from_utf8_lossy(&buf).contains("application/json"));

        serving.store(false, Ordering::Relaxed);
        run_task.abort();
    }
}
