//! Shared helpers for the wiremock-backed integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use vodpush::{ApiClient, SessionStore, Uploader};

pub const MIB: u64 = 1024 * 1024;

pub fn block_id(index: u32) -> String {
    BASE64.encode(format!("{:06}", index))
}

/// Write `size` bytes where every byte of block `n` holds the value `n`, so
/// request bodies can be checked against the block they claim to be.
pub fn write_patterned_file(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    let mut data = vec![0u8; size as usize];
    for (offset, byte) in data.iter_mut().enumerate() {
        *byte = (offset as u64 / (4 * MIB)) as u8;
    }
    std::fs::write(&path, &data).unwrap();
    path
}

pub async fn open_store(dir: &Path) -> Arc<SessionStore> {
    Arc::new(SessionStore::open(&dir.join("sessions.db")).await.unwrap())
}

pub fn uploader(server: &MockServer, store: Arc<SessionStore>) -> Uploader {
    Uploader::new(ApiClient::new(&server.uri(), "seller@example.com"), store)
}

/// Mount the generate-upload-url endpoint answering with fixed identifiers
/// and a blob URL on the same mock server.
pub async fn mount_generate(server: &MockServer, video_id: &str, upload_id: &str, blob_path: &str) {
    let upload_url = format!("{}{}?sig=test", server.uri(), blob_path);
    mount_generate_with_url(server, video_id, upload_id, &upload_url).await;
}

pub async fn mount_generate_with_url(
    server: &MockServer,
    video_id: &str,
    upload_id: &str,
    upload_url: &str,
) {
    Mock::given(method("POST"))
        .and(path("/api/generate-upload-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "video_id": video_id,
            "upload_id": upload_id,
            "upload_url": upload_url,
        })))
        .mount(server)
        .await;
}

/// Mount block staging and block-list commit for one blob path.
pub async fn mount_blob(server: &MockServer, blob_path: &str) {
    Mock::given(method("PUT"))
        .and(path(blob_path))
        .and(query_param("comp", "block"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(blob_path))
        .and(query_param("comp", "blocklist"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

pub async fn mount_complete(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/upload-complete"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

pub async fn received(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap()
}

pub fn query_value(request: &Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn is_stage_request(request: &Request, blob_path: &str) -> bool {
    request.method.as_str() == "PUT"
        && request.url.path() == blob_path
        && query_value(request, "comp").as_deref() == Some("block")
}

/// Block ids staged at `blob_path`, in arrival order.
pub async fn staged_block_ids(server: &MockServer, blob_path: &str) -> Vec<String> {
    received(server)
        .await
        .into_iter()
        .filter(|request| is_stage_request(request, blob_path))
        .map(|request| query_value(&request, "blockid").unwrap())
        .collect()
}

/// (block id, body) pairs for blocks staged at `blob_path`.
pub async fn staged_blocks(server: &MockServer, blob_path: &str) -> Vec<(String, Vec<u8>)> {
    received(server)
        .await
        .into_iter()
        .filter(|request| is_stage_request(request, blob_path))
        .map(|request| {
            (
                query_value(&request, "blockid").unwrap(),
                request.body.clone(),
            )
        })
        .collect()
}

/// Commit bodies received for `blob_path`.
pub async fn commit_bodies(server: &MockServer, blob_path: &str) -> Vec<String> {
    received(server)
        .await
        .into_iter()
        .filter(|request| {
            request.method.as_str() == "PUT"
                && request.url.path() == blob_path
                && query_value(request, "comp").as_deref() == Some("blocklist")
        })
        .map(|request| String::from_utf8(request.body.clone()).unwrap())
        .collect()
}

/// Upload-complete payloads in arrival order.
pub async fn completion_payloads(server: &MockServer) -> Vec<serde_json::Value> {
    received(server)
        .await
        .into_iter()
        .filter(|request| request.url.path() == "/api/upload-complete")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

/// Raw blob endpoint that drops its first `drop_first` connections without
/// answering and replies 201 to every request after that. Used to simulate
/// transport-level failures, which wiremock cannot produce. Request targets
/// the server answered are recorded in arrival order.
pub struct FlakyBlob {
    pub base_url: String,
    pub connections: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FlakyBlob {
    /// blockid values the server answered, in arrival order.
    pub fn staged_ids(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|target| target_query_value(target, "comp").as_deref() == Some("block"))
            .map(|target| target_query_value(target, "blockid").unwrap())
            .collect()
    }

    /// comp operations the server answered, in arrival order.
    pub fn operations(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|target| target_query_value(target, "comp"))
            .collect()
    }
}

/// Query value from a raw request target like `/path?comp=block&blockid=x`.
fn target_query_value(target: &str, key: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name == key {
            urlencoding::decode(value).ok().map(|value| value.into_owned())
        } else {
            None
        }
    })
}

pub async fn drop_first_connections_server(drop_first: usize) -> FlakyBlob {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = connections.clone();
    let answered = requests.clone();

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n < drop_first {
                drop(socket);
                continue;
            }
            tokio::spawn(serve_blob_connection(socket, answered.clone()));
        }
    });

    FlakyBlob {
        base_url,
        connections,
        requests,
    }
}

// Minimal HTTP/1.1 keep-alive loop: read one request (headers plus
// content-length body), answer 201, repeat until the peer hangs up.
async fn serve_blob_connection(
    mut socket: tokio::net::TcpStream,
    answered: Arc<Mutex<Vec<String>>>,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(read) => buf.extend_from_slice(&chunk[..read]),
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let target = headers
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(read) => buf.extend_from_slice(&chunk[..read]),
            }
        }
        buf.drain(..header_end + content_length);
        answered.lock().unwrap().push(target);

        if socket
            .write_all(b"HTTP/1.1 201 Created\r\ncontent-length: 0\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
