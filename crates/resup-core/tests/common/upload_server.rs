//! Minimal HTTP/1.1 chunk-upload server for integration tests.
//!
//! `GET /upload` answers the existence probe (200 if the chunk is stored,
//! 404 otherwise). `POST /upload` stores one chunk, either from a multipart
//! body (metadata fields + `file` part) or from a raw octet-stream body with
//! metadata in the query string. Chunks are keyed by identifier and 1-based
//! chunk number and can be re-assembled for comparison.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadServerOptions {
    /// Answer the first N uploads with 503 (transient) before accepting.
    pub fail_first: usize,
}

#[derive(Default)]
struct ServerState {
    chunks: BTreeMap<(String, u64), Vec<u8>>,
    fail_left: usize,
    probes: usize,
    posts: usize,
}

pub struct UploadServer {
    base: String,
    state: Arc<Mutex<ServerState>>,
}

impl UploadServer {
    /// Upload (and probe) endpoint, e.g. "http://127.0.0.1:12345/upload".
    pub fn upload_url(&self) -> String {
        format!("{}upload", self.base)
    }

    /// Stored chunks of `identifier`, concatenated in chunk order.
    pub fn assembled(&self, identifier: &str) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .chunks
            .iter()
            .filter(|((id, _), _)| id == identifier)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub fn chunk_count(&self, identifier: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.chunks.keys().filter(|(id, _)| id == identifier).count()
    }

    /// Pretend a previous session already uploaded this chunk.
    pub fn preload(&self, identifier: &str, number: u64, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.chunks.insert((identifier.to_string(), number), bytes);
    }

    pub fn probes(&self) -> usize {
        self.state.lock().unwrap().probes
    }

    pub fn posts(&self) -> usize {
        self.state.lock().unwrap().posts
    }
}

pub fn start() -> UploadServer {
    start_with_options(UploadServerOptions::default())
}

/// Starts the server on an ephemeral port in a background thread. The
/// server runs until the process exits.
pub fn start_with_options(opts: UploadServerOptions) -> UploadServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(ServerState {
        fail_left: opts.fail_first,
        ..ServerState::default()
    }));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    UploadServer {
        base: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

struct Request {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn handle(mut stream: TcpStream, state: &Mutex<ServerState>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };

    let (status, body) = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/upload") => probe(&request, state),
        ("POST", "/upload") | ("PUT", "/upload") => receive(&request, state),
        _ => ("404 Not Found", "no route".to_string()),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn probe(request: &Request, state: &Mutex<ServerState>) -> (&'static str, String) {
    let mut state = state.lock().unwrap();
    state.probes += 1;
    match chunk_key(&request.query) {
        Some(key) if state.chunks.contains_key(&key) => ("200 OK", "found".into()),
        _ => ("404 Not Found", "not_found".into()),
    }
}

fn receive(request: &Request, state: &Mutex<ServerState>) -> (&'static str, String) {
    let content_type = request
        .headers
        .get("content-type")
        .cloned()
        .unwrap_or_default();
    let (fields, payload) = match content_type.split_once("boundary=") {
        Some((_, boundary)) => parse_multipart(&request.body, boundary.trim_matches('"')),
        None => (request.query.clone(), Some(request.body.clone())),
    };

    let mut state = state.lock().unwrap();
    state.posts += 1;
    if state.fail_left > 0 {
        state.fail_left -= 1;
        return ("503 Service Unavailable", "try again".into());
    }
    let (Some(key), Some(payload)) = (chunk_key(&fields), payload) else {
        return ("400 Bad Request", "non_resumable_request".into());
    };
    let declared = fields
        .get("resumableCurrentChunkSize")
        .and_then(|v| v.parse::<usize>().ok());
    if declared != Some(payload.len()) {
        return ("400 Bad Request", "invalid_resumable_request".into());
    }
    let total: usize = fields
        .get("resumableTotalChunks")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let identifier = key.0.clone();
    state.chunks.insert(key, payload);
    let stored = state
        .chunks
        .keys()
        .filter(|(id, _)| *id == identifier)
        .count();
    if stored == total {
        ("200 OK", "done".into())
    } else {
        ("200 OK", "partly_done".into())
    }
}

fn chunk_key(params: &HashMap<String, String>) -> Option<(String, u64)> {
    let identifier = params.get("resumableIdentifier")?.clone();
    let number = params.get("resumableChunkNumber")?.parse().ok()?;
    if identifier.is_empty() || number == 0 {
        return None;
    }
    Some((identifier, number))
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n", 0) {
            break pos;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 || buf.len() > 64 * 1024 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    if headers
        .get("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").ok()?;
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(length);

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target, String::new()),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    Some(Request {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// Returns (text fields, file part).
fn parse_multipart(body: &[u8], boundary: &str) -> (HashMap<String, String>, Option<Vec<u8>>) {
    let delim = format!("--{}", boundary).into_bytes();
    let mut fields = HashMap::new();
    let mut file = None;
    let Some(first) = find(body, &delim, 0) else {
        return (fields, file);
    };
    let mut pos = first + delim.len();
    while !body[pos..].starts_with(b"--") {
        pos += 2;
        let Some(head_end) = find(body, b"\r\n\r\n", pos) else {
            break;
        };
        let head = String::from_utf8_lossy(&body[pos..head_end]).into_owned();
        let start = head_end + 4;
        let Some(next) = find(body, &delim, start) else {
            break;
        };
        let content = &body[start..next - 2];
        if head.contains("filename=") {
            file = Some(content.to_vec());
        } else if let Some(name) = disposition_name(&head) {
            fields.insert(name, String::from_utf8_lossy(content).into_owned());
        }
        pos = next + delim.len();
    }
    (fields, file)
}

fn disposition_name(head: &str) -> Option<String> {
    let rest = &head[head.find("; name=\"")? + 8..];
    Some(rest[..rest.find('"')?].to_string())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
