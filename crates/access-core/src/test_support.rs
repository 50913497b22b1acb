//! ============================================================================
//! Canned HTTP endpoint for client tests
//! ============================================================================
//! Binds 127.0.0.1:0 and answers one connection per queued reply, in order.
//! JSON-RPC replies echo the request id.
//! ============================================================================

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub(crate) enum Reply {
    /// Raw status and body
    Http(u16, String),
    /// JSON-RPC success with the given `result`
    RpcResult(Value),
    /// JSON-RPC error object
    RpcError(i64, &'static str),
}

pub(crate) struct CannedServer {
    pub url: String,
    /// Raw requests (head and body) in arrival order
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// ABI-encoded single word, as an `eth_call` result
pub(crate) fn word(value: u64) -> Value {
    json!(format!("0x{:064x}", value))
}

pub(crate) async fn serve(replies: Vec<Reply>) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let (head, body) = read_request(&mut stream).await;
            let id = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|request| request.get("id").cloned())
                .unwrap_or(json!(1));

            let (status, payload) = match reply {
                Reply::Http(status, payload) => (status, payload),
                Reply::RpcResult(result) => (200, json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()),
                Reply::RpcError(code, message) => (
                    200,
                    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string(),
                ),
            };

            seen.lock().unwrap().push(format!("{}\r\n\r\n{}", head, body));

            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                if status < 400 { "OK" } else { "Error" },
                payload.len(),
                payload
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    CannedServer { url, requests }
}

/// Read one request: headers, then a Content-Length body
async fn read_request(stream: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return (String::from_utf8_lossy(&buf).into_owned(), String::new()),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let body_end = buf.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).into_owned();
    (head, body)
}
