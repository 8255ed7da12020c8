//! The Worker Pool: a bounded, elastic group of tasks that drain the ready
//! queue the Connection Manager hands connections off to.
//!
//! Each worker owns a pre-allocated [`HttpConnection`] and loops: pull a
//! stream off the queue, run a connection filter, then drive the HTTP
//! request cycle until the peer closes or a limit is hit. `grow`/`shrink`
//! let the pool track load between `min_workers` and `max_workers`; workers
//! that should exit check a generation counter between stream pulls instead
//! of being force-aborted, so an in-flight connection always finishes.

use crate::{
    errors::ErrorKind,
    http::{
        request::Request,
        response::{Handled, Response},
    },
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    server::connection::{ConnectionData, HttpConnection},
    server::conn_stream::ConnStream,
    ConnectionFilter, Version,
};
use crossbeam::queue::SegQueue;
use std::{
    future::Future,
    marker::{PhantomData, Send, Sync},
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::yield_now, time::sleep as tokio_sleep};

/// A trait for handling HTTP requests and generating responses.
///
/// You can use:
/// - `&self` for shared immutable data (e.g. database connection pool, router configuration)
/// - `&mut S` for connection-specific mutable state (e.g. authentication tokens, session data)
///
/// # Examples
///
/// Basic Request Handler
/// ```
/// use reqgate::{Handler, Request, Response, Handled, StatusCode};
///
/// struct MyHandler;
///
/// impl Handler for MyHandler {
///     async fn handle(&self, _: &mut (), req: &Request, resp: &mut Response) -> Handled {
///         if req.url().target() == b"/echo" {
///             resp.status(StatusCode::Ok).body("Echo response")
///         } else {
///             resp.status(StatusCode::NotFound).body("Not found :(")
///         }
///     }
/// }
/// ```
/// Handler with [`ConnectionData`]
/// ```
/// use reqgate::{Handler, ConnectionData, Request, Response, Handled, StatusCode};
///
/// struct CountingHandler;
///
/// impl Handler<State> for CountingHandler {
///     async fn handle(&self, data: &mut State, req: &Request, resp: &mut Response) -> Handled {
///         data.request_count += 1;
///
///         resp.status(StatusCode::Ok)
///             .body(format!("Request #{}", data.request_count))
///     }
/// }
///
/// struct State {
///     request_count: usize,
/// }
///
/// impl ConnectionData for State {
///     fn new() -> Self {
///         Self { request_count: 0 }
///     }
///
///     fn reset(&mut self) {
///         self.request_count = 0;
///     }
/// }
/// ```
pub trait Handler<S = ()>
where
    Self: Sync + Send + 'static,
    S: ConnectionData,
{
    /// Processes an HTTP request and generates a response.
    ///
    /// # Errors
    ///
    /// Implementations should handle errors internally and set appropriate
    /// HTTP status codes on the response. Panics will terminate the connection.
    fn handle(
        &self,
        connection_data: &mut S,
        request: &Request,
        response: &mut Response,
    ) -> impl Future<Output = Handled> + Send;
}

pub(crate) type TcpQueue = Arc<SegQueue<(ConnStream, SocketAddr, SocketAddr)>>;
pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits, RespLimits);

/// A bounded, elastic group of workers draining the ready queue.
///
/// Workers are plain Tokio tasks; there's no OS-thread-per-worker affinity.
/// Elasticity is cooperative: `shrink` bumps a generation counter and the
/// affected workers exit the next time they'd otherwise block waiting for a
/// stream, never mid-connection.
pub(crate) struct WorkerPool<H: Handler<S>, S: ConnectionData, F: ConnectionFilter> {
    queue: TcpQueue,
    error_queue: TcpQueue,
    handler: Arc<H>,
    filter: Arc<F>,
    limits: AllLimits,
    live: Arc<AtomicUsize>,
    stop_requests: Arc<AtomicUsize>,
    _marker: PhantomData<S>,
}

impl<H: Handler<S>, F: ConnectionFilter, S: ConnectionData> WorkerPool<H, S, F> {
    #[inline]
    pub(crate) fn new(queue: TcpQueue, handler: Arc<H>, filter: Arc<F>, limits: AllLimits) -> Self {
        let error_queue = Arc::new(SegQueue::new());
        let pool = Self {
            queue,
            error_queue,
            handler,
            filter,
            limits,
            live: Arc::new(AtomicUsize::new(0)),
            stop_requests: Arc::new(AtomicUsize::new(0)),
            _marker: PhantomData,
        };

        for _ in 0..pool.limits.0.min_workers {
            pool.spawn_worker();
        }
        if pool.limits.0.count_503_handlers != 0 {
            for _ in 0..pool.limits.0.count_503_handlers {
                pool.spawn_alarmist();
            }
        } else {
            pool.spawn_quiet_alarmist();
        }

        pool
    }

    #[inline]
    pub(crate) fn queue(&self) -> &TcpQueue {
        &self.queue
    }

    #[inline]
    pub(crate) fn error_queue(&self) -> &TcpQueue {
        &self.error_queue
    }

    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn max_pending_connections(&self) -> usize {
        self.limits.0.max_pending_connections
    }

    /// Spawns up to `n` additional workers, capped at `max_workers`.
    pub(crate) fn grow(&self, n: usize) {
        let room = self.limits.0.max_workers.saturating_sub(self.live());
        for _ in 0..n.min(room) {
            self.spawn_worker();
        }
    }

    /// Marks up to `n` workers for exit, never below `min_workers`.
    ///
    /// Workers notice at their next queue-poll and exit cleanly; any
    /// in-flight connection runs to completion first. Each worker claims at
    /// most one pending stop request, so exactly `removable` workers exit
    /// rather than every live worker racing the same signal.
    pub(crate) fn shrink(&self, n: usize) {
        let floor = self.limits.0.min_workers;
        let removable = self.live().saturating_sub(floor).min(n);
        self.stop_requests.fetch_add(removable, Ordering::Relaxed);
    }

    /// Waits up to `timeout` for live workers to drain to zero.
    ///
    /// Does not forcibly abort workers; callers that need a hard deadline
    /// should drop the pool after the timeout instead.
    pub(crate) async fn stop(&self, timeout: Duration) {
        self.stop_requests
            .fetch_add(self.limits.0.max_workers, Ordering::Relaxed);

        let deadline = tokio::time::Instant::now() + timeout;
        while self.live() > 0 && tokio::time::Instant::now() < deadline {
            tokio_sleep(Duration::from_millis(10)).await;
        }
    }

    fn spawn_worker(&self) {
        let queue = self.queue.clone();
        let filter = self.filter.clone();
        let live = self.live.clone();
        let stop_requests = self.stop_requests.clone();
        let mut conn = HttpConnection::new(self.handler.clone(), self.limits.clone());

        live.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            loop {
                if stop_requests
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                        n.checked_sub(1)
                    })
                    .is_ok()
                {
                    break;
                }

                let (mut stream, client_addr, server_addr) =
                    Self::get_stream(&queue, &conn.server_limits.wait_strategy).await;

                if filter.filter(client_addr, server_addr, &mut conn.response).is_err()
                    || filter
                        .filter_async(client_addr, server_addr, &mut conn.response)
                        .await
                        .is_err()
                {
                    let _ = conn
                        .conn_limits
                        .write_bytes(&mut stream, conn.response.buffer())
                        .await;

                    conn.response.reset(&conn.resp_limits);
                    continue;
                }

                let _ = conn.run(&mut stream, client_addr, server_addr).await;
            }
            live.fetch_sub(1, Ordering::Relaxed);
        });
    }

    fn spawn_alarmist(&self) {
        let queue = self.error_queue.clone();
        let server_limits = self.limits.0.clone();
        let conn_limits = self.limits.1.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, ..) = Self::get_stream(&queue, &server_limits.wait_strategy).await;

                let _ = conn_limits
                    .send_error(
                        &mut stream,
                        ErrorKind::ServiceUnavailable,
                        Version::Http11,
                        server_limits.json_errors,
                    )
                    .await;
            }
        });
    }

    fn spawn_quiet_alarmist(&self) {
        let queue = self.error_queue.clone();
        let server_limits = self.limits.0.clone();

        tokio::spawn(async move {
            loop {
                let (stream, ..) = Self::get_stream(&queue, &server_limits.wait_strategy).await;
                drop(stream);
            }
        });
    }

    #[inline]
    async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (ConnStream, SocketAddr, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}
