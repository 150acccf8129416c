//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use translating_proxy::{HttpServer, ProxyConfig, Shutdown};

/// Canned upstream response.
#[derive(Clone)]
pub struct Canned {
    pub status_line: &'static str,
    pub content_type: &'static str,
    pub body: &'static str,
}

impl Canned {
    pub fn html(body: &'static str) -> Self {
        Self {
            status_line: "200 OK",
            content_type: "text/html; charset=utf-8",
            body,
        }
    }
}

/// Start a raw-socket upstream that answers every request with `canned`.
/// Returns its address and a counter of requests served.
pub async fn start_mock_upstream(canned: Canned) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let canned = canned.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nETag: \"v1\"\r\nConnection: close\r\n\r\n{}",
                    canned.status_line,
                    canned.content_type,
                    canned.body.len(),
                    canned.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// Start a translation API that replaces `Hello` with `Hallo` in every segment.
/// Returns the endpoint URL and a counter of API calls.
pub async fn start_mock_translator() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let router = Router::new().route(
        "/translate",
        post(move |Json(request): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let translations: Vec<Value> = request["q"]
                    .as_array()
                    .map(|q| {
                        q.iter()
                            .map(|s| {
                                let text = s.as_str().unwrap_or_default().replace("Hello", "Hallo");
                                json!({ "translatedText": text })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Json(json!({ "data": { "translations": translations } }))
            }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}/translate", addr), calls)
}

/// Config that proxies `127.0.0.1` to the given upstream port.
pub fn proxy_config(upstream_port: u16, translate_url: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.proxied_hosts = vec!["127.0.0.1".into()];
    config.upstream.http_port = Some(upstream_port);
    config.translation.api_url = translate_url.to_string();
    config.translation.timeout_secs = 5;
    config
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn purge() -> reqwest::Method {
    reqwest::Method::from_bytes(b"PURGE").unwrap()
}
