//! End-to-end coverage driven entirely through the public `HttpServer`
//! surface: bind, accept, parse, dispatch, keep-alive reuse, shutdown.

use reqgate::limits::{ConnLimits, ReqLimits, ServerLimits};
use reqgate::{Handled, HttpServer, Request, Response, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct CountingHandler {
    hits: Arc<AtomicUsize>,
}

impl reqgate::Handler for CountingHandler {
    async fn handle(&self, _: &mut (), req: &Request, resp: &mut Response) -> Handled {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if let Some(body) = req.body() {
            resp.status(StatusCode::Ok).body(body.to_vec())
        } else {
            resp.status(StatusCode::Ok).body("ok")
        }
    }
}

async fn start_server(
    server_limits: ServerLimits,
    request_limits: ReqLimits,
) -> (HttpServer<CountingHandler>, Arc<AtomicUsize>, std::net::SocketAddr) {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut server = HttpServer::builder()
        .bind("127.0.0.1:0")
        .unwrap()
        .handler(CountingHandler { hits: hits.clone() })
        .server_limits(server_limits)
        .request_limits(request_limits)
        .connection_limits(ConnLimits {
            socket_read_timeout: Duration::from_millis(500),
            ..ConnLimits::default()
        });

    server.prepare().await.unwrap();
    let addr = server.local_addr().unwrap();
    (server, hits, addr)
}

#[tokio::test]
async fn plain_get_keep_alive_allows_a_second_request() {
    let (mut server, hits, addr) = start_server(
        ServerLimits {
            min_workers: 1,
            max_workers: 2,
            ..ServerLimits::default()
        },
        ReqLimits::default(),
    )
    .await;

    let serve_task = tokio::spawn(async move {
        server.serve().await;
        server
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf)).await;

    let text = String::from_utf8_lossy(&buf);
    assert_eq!(text.matches("HTTP/1.1 200").count(), 2);
    assert_eq!(hits.load(Ordering::Relaxed), 2);

    let server = serve_task.abort_handle();
    server.abort();
}

#[tokio::test]
async fn chunked_request_body_delivers_exact_bytes() {
    let (mut server, _hits, addr) = start_server(
        ServerLimits {
            min_workers: 1,
            max_workers: 2,
            ..ServerLimits::default()
        },
        ReqLimits::default(),
    )
    .await;

    let serve_task = tokio::spawn(async move {
        server.serve().await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(
            b"POST /x HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
              5\r\nhello\r\n0\r\n\r\n",
        )
        .await
        .unwrap();

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf)).await;

    assert!(buf.starts_with(b"HTTP/1.1 200"));
    assert!(buf.ends_with(b"hello"));

    serve_task.abort();
}

#[tokio::test]
async fn oversize_request_line_is_rejected_with_414() {
    let request_limits = ReqLimits {
        url_size: 16,
        header_count: 2,
        ..ReqLimits::default()
    };
    let (mut server, _hits, addr) = start_server(
        ServerLimits {
            min_workers: 1,
            max_workers: 2,
            ..ServerLimits::default()
        },
        request_limits,
    )
    .await;

    let serve_task = tokio::spawn(async move {
        server.serve().await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let oversize_path = "/".to_string() + &"a".repeat(4096);
    client
        .write_all(format!("GET {oversize_path} HTTP/1.1\r\nHost: x\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf)).await;

    assert!(
        buf.starts_with(b"HTTP/1.1 414"),
        "expected 414, got: {}",
        String::from_utf8_lossy(&buf)
    );

    serve_task.abort();
}

#[tokio::test]
async fn pool_saturation_answers_503_and_closes() {
    // A single worker, held busy by a slow handler, forces the next
    // connection through the overflow path.
    struct SlowHandler {
        gate: Arc<tokio::sync::Notify>,
    }

    impl reqgate::Handler for SlowHandler {
        async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
            self.gate.notified().await;
            resp.status(StatusCode::Ok).body("done")
        }
    }

    let gate = Arc::new(tokio::sync::Notify::new());
    let mut server = HttpServer::builder()
        .bind("127.0.0.1:0")
        .unwrap()
        .handler(SlowHandler { gate: gate.clone() })
        .server_limits(ServerLimits {
            min_workers: 1,
            max_workers: 1,
            max_pending_connections: 1,
            count_503_handlers: 1,
            ..ServerLimits::default()
        });
    server.prepare().await.unwrap();
    let addr = server.local_addr().unwrap();

    let serve_task = tokio::spawn(async move {
        server.serve().await;
    });

    let mut busy = TcpStream::connect(addr).await.unwrap();
    busy.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    // Give the worker time to pick the first connection up and block on the
    // handler before sending the second.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut overflow = TcpStream::connect(addr).await.unwrap();
    overflow
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut overflow_buf = Vec::new();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        overflow.read_to_end(&mut overflow_buf),
    )
    .await;
    assert!(
        overflow_buf.starts_with(b"HTTP/1.1 503"),
        "expected 503, got: {}",
        String::from_utf8_lossy(&overflow_buf)
    );

    gate.notify_one();
    serve_task.abort();
}
