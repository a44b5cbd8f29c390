//! End-to-end fetch tests against a canned-response HTTP server

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use deckhand::release::{FetchOptions, Fetcher};

const MANIFEST_V123: &str = "platform_version: v1.2.3\nservices: []\nnative_binaries: []\ninterfaces: []\ninfrastructure: []\n";
const MANIFEST_V200: &str = "platform_version: v2.0.0\nservices: []\nnative_binaries: []\ninterfaces: []\ninfrastructure: []\n";
const POINTER_RC: &str =
    "platform_version: v2.0.0\nmanifest: releases/v2.0.0.yaml\nupdated_at: 2026-01-01T00:00:00Z\n";

/// Spawn a one-response-per-connection HTTP listener; the handler maps a
/// request path to (status, body). Returns the base URL.
async fn start_server<F>(handler: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = handler(&path);
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    429 => "Too Many Requests",
                    500 => "Internal Server Error",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/yaml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn options(repository: String, cache_dir: &tempfile::TempDir) -> FetchOptions {
    FetchOptions {
        repository: Some(repository),
        cache_dir: Some(PathBuf::from(cache_dir.path())),
        retry_count: 1,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn fetch_pinned_version_requests_release_path() {
    let url = start_server(|path| {
        assert_eq!(path, "/releases/v1.2.3.yaml");
        (200, MANIFEST_V123.to_string())
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(options(url, &cache_dir)).unwrap();

    let manifest = fetcher.fetch("stable", "v1.2.3").await.unwrap();
    assert_eq!(manifest.platform_version, "v1.2.3");
}

#[tokio::test]
async fn fetch_latest_resolves_channel_pointer() {
    let url = start_server(|path| match path {
        "/channels/rc.yaml" => (200, POINTER_RC.to_string()),
        "/releases/v2.0.0.yaml" => (200, MANIFEST_V200.to_string()),
        other => panic!("unexpected path: {other}"),
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(options(url, &cache_dir)).unwrap();

    let manifest = fetcher.fetch("rc", "latest").await.unwrap();
    assert_eq!(manifest.platform_version, "v2.0.0");

    // Cached under the channel it was requested on
    assert!(fetcher.cache().load("rc", "latest").is_some());
}

#[tokio::test]
async fn transient_failures_are_retried_up_to_budget() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let url = start_server({
        let attempts = attempts.clone();
        move |_path| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                (500, "temporary failure".to_string())
            } else {
                (200, MANIFEST_V123.to_string())
            }
        }
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(FetchOptions {
        retry_count: 3,
        ..options(url, &cache_dir)
    })
    .unwrap();

    let manifest = fetcher.fetch("stable", "v1.2.3").await.unwrap();
    assert_eq!(manifest.platform_version, "v1.2.3");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_exhaustion_returns_last_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let url = start_server({
        let attempts = attempts.clone();
        move |_path| {
            attempts.fetch_add(1, Ordering::SeqCst);
            (500, "still down".to_string())
        }
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(FetchOptions {
        retry_count: 3,
        ..options(url, &cache_dir)
    })
    .unwrap();

    let err = fetcher.fetch("stable", "v1.2.3").await.unwrap_err();
    assert!(format!("{err:#}").contains("HTTP 500"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn not_found_fails_without_retry() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let url = start_server({
        let attempts = attempts.clone();
        move |_path| {
            attempts.fetch_add(1, Ordering::SeqCst);
            (404, "no such release".to_string())
        }
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(FetchOptions {
        retry_count: 3,
        ..options(url, &cache_dir)
    })
    .unwrap();

    let err = fetcher.fetch("stable", "v9.9.9").await.unwrap_err();
    assert!(format!("{err:#}").contains("HTTP 404"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_manifest_is_fatal_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let url = start_server({
        let attempts = attempts.clone();
        move |_path| {
            attempts.fetch_add(1, Ordering::SeqCst);
            (200, "{this is: not: yaml".to_string())
        }
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(FetchOptions {
        retry_count: 3,
        ..options(url, &cache_dir)
    })
    .unwrap();

    let err = fetcher.fetch("stable", "v1.2.3").await.unwrap_err();
    assert!(format!("{err:#}").contains("parse"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_channel_pointer_is_descriptive_error() {
    let url = start_server(|path| match path {
        "/channels/stable.yaml" => (200, "platform_version: v2.0.0\n".to_string()),
        other => panic!("unexpected path: {other}"),
    })
    .await;

    let cache_dir = tempfile::TempDir::new().unwrap();
    let fetcher = Fetcher::new(options(url, &cache_dir)).unwrap();

    let err = fetcher.fetch("stable", "latest").await.unwrap_err();
    assert!(format!("{err:#}").contains("no manifest path"));
}
