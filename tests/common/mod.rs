//! Minimal HTTP/1.1 stub serving canned responses for fetcher tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const EXAMPLE_BODY: &str = "1.2.3.0/24 4.5.6.0/16\n7.8.9.0/28";

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl StubResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: "upstream error".to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Serves the scripted responses in order; the last one repeats.
pub struct StubServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(responses: Vec<StubResponse>) -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap(), responses).await
    }

    /// Like `start`, bound to a fixed address.
    pub async fn start_on(addr: SocketAddr, responses: Vec<StubResponse>) -> Self {
        assert!(!responses.is_empty());
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let idx = counter.fetch_add(1, Ordering::SeqCst);
                let response = responses[idx.min(responses.len() - 1)].clone();
                tokio::spawn(respond(stream, response));
            }
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}/ips.txt", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(mut stream: TcpStream, response: StubResponse) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    tokio::time::sleep(response.delay).await;

    let reason = if response.status == 200 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }

    // Two writes so the client sees the body in more than one chunk.
    let body = response.body.as_bytes();
    let (first, second) = body.split_at(body.len() / 2);
    for part in [first, second] {
        if stream.write_all(part).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let _ = stream.shutdown().await;
}

/// A loopback address with nothing listening on it, so connections are refused.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Polls `condition` until it holds or `limit` elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn render<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
