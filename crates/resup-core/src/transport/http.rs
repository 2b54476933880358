//! libcurl transport: probe GET and chunk upload, one Easy handle per request.
//!
//! Requests run on the blocking pool; the cancel token is polled from the
//! curl progress callback so an aborted chunk stops transmitting.

use std::str;
use std::time::Duration;

use curl::easy::{Easy, Form, List};

use crate::config::{HttpMethod, SendMethod};

use super::{
    ChunkResponse, ProbeRequest, ProgressSink, SendRequest, Transport, TransportError,
    TransportFuture,
};

/// Connect timeout applied to every request, independent of the
/// configurable per-request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport backed by the `curl` crate.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport;

impl CurlTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for CurlTransport {
    fn probe(&self, request: ProbeRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || perform_probe(request))
                .await
                .map_err(|e| TransportError::Join(e.to_string()))?
        })
    }

    fn send(&self, request: SendRequest, progress: ProgressSink) -> TransportFuture<'_> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || perform_send(request, progress))
                .await
                .map_err(|e| TransportError::Join(e.to_string()))?
        })
    }
}

/// Appends `query` to `target`, keeping any query string already present.
pub(crate) fn build_url(target: &str, query: &[(String, String)]) -> Result<String, TransportError> {
    let mut url = url::Url::parse(target).map_err(|e| TransportError::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    })?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url.to_string())
}

/// Map a curl error to a transport error, like the download-side classifier.
fn map_curl_error(e: curl::Error) -> TransportError {
    if e.is_aborted_by_callback() {
        return TransportError::Aborted;
    }
    if e.is_operation_timedout() {
        return TransportError::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return TransportError::Connection(e.to_string());
    }
    TransportError::Curl(e)
}

fn configure(
    easy: &mut Easy,
    url: &str,
    headers: &[(String, String)],
    extra_headers: &[&str],
    timeout: Option<Duration>,
) -> Result<(), TransportError> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(CONNECT_TIMEOUT)?;
    if let Some(t) = timeout {
        easy.timeout(t)?;
    }
    easy.progress(true)?;

    let mut list = List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    for h in extra_headers {
        list.append(h)?;
    }
    easy.http_headers(list)?;
    Ok(())
}

fn perform_probe(request: ProbeRequest) -> Result<ChunkResponse, TransportError> {
    let url = build_url(&request.target, &request.query)?;
    let mut easy = Easy::new();
    configure(&mut easy, &url, &request.headers, &[], request.timeout)?;
    match request.method {
        HttpMethod::Get => easy.get(true)?,
        HttpMethod::Post => {
            easy.post(true)?;
            easy.post_field_size(0)?;
        }
        HttpMethod::Put => easy.custom_request("PUT")?,
    }

    let mut body = Vec::new();
    {
        let cancel = request.cancel.clone();
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(move |_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform().map_err(map_curl_error)?;
    }

    response(&mut easy, body)
}

fn perform_send(request: SendRequest, progress: ProgressSink) -> Result<ChunkResponse, TransportError> {
    let url = build_url(&request.target, &request.query)?;
    let mut easy = Easy::new();
    // An empty Expect header stops curl from waiting on `100 Continue`.
    match request.mode {
        SendMethod::Multipart => {
            configure(&mut easy, &url, &request.headers, &["Expect:"], request.timeout)?;
            let mut form = Form::new();
            for (name, value) in &request.fields {
                form.part(name).contents(value.as_bytes()).add()?;
            }
            form.part(&request.file_field)
                .buffer(&request.file_name, request.payload.clone())
                .content_type("application/octet-stream")
                .add()?;
            easy.httppost(form)?;
        }
        SendMethod::Octet => {
            configure(
                &mut easy,
                &url,
                &request.headers,
                &["Expect:", "Content-Type: application/octet-stream"],
                request.timeout,
            )?;
            easy.post(true)?;
            easy.post_fields_copy(&request.payload)?;
        }
    }
    if request.method == HttpMethod::Put {
        easy.custom_request("PUT")?;
    }

    let mut body = Vec::new();
    {
        let cancel = request.cancel.clone();
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(move |_, _, _, ulnow| {
            if ulnow > 0.0 {
                progress.report(ulnow as u64);
            }
            !cancel.is_cancelled()
        })?;
        transfer.perform().map_err(map_curl_error)?;
    }

    response(&mut easy, body)
}

fn response(easy: &mut Easy, body: Vec<u8>) -> Result<ChunkResponse, TransportError> {
    let status = easy.response_code()? as u16;
    let body = match str::from_utf8(&body) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(&body).into_owned(),
    };
    Ok(ChunkResponse { status, body })
}
