//! Wire operations behind a small capability trait.
//!
//! The chunk state machine only needs two requests: a metadata-only
//! existence probe and a chunk upload. `CurlTransport` implements them with
//! libcurl; tests substitute a scripted in-memory transport.

mod http;
#[cfg(test)]
pub(crate) mod fake;
mod progress;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{HttpMethod, SendMethod};

pub use http::CurlTransport;
pub use progress::ProgressSink;

/// Status and body text of a probe or upload response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub status: u16,
    pub body: String,
}

/// Metadata-only existence check for one chunk.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: HttpMethod,
    pub target: String,
    /// Chunk metadata plus extra query data.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Fires when the chunk is aborted; transports should stop early.
    pub cancel: CancellationToken,
}

/// Upload of one chunk's bytes.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub method: HttpMethod,
    pub target: String,
    pub mode: SendMethod,
    /// Form fields (multipart mode).
    pub fields: Vec<(String, String)>,
    /// Query parameters (metadata in octet mode, empty otherwise).
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Form field name for the payload part.
    pub file_field: String,
    /// File name announced for the payload part.
    pub file_name: String,
    pub payload: Vec<u8>,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl SendRequest {
    /// Value of a metadata parameter, looked up in fields then query.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .chain(self.query.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl ProbeRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failure. Always transient from the chunk's point of view.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request aborted")]
    Aborted,

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("curl: {0}")]
    Curl(#[from] curl::Error),

    #[error("multipart form: {0}")]
    Form(#[from] curl::FormError),

    #[error("transport task failed: {0}")]
    Join(String),
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChunkResponse, TransportError>> + Send + 'a>>;

/// Capability used by chunks to talk to the upload endpoint.
pub trait Transport: Send + Sync {
    /// Existence check: 200/201 means the chunk is already present.
    fn probe(&self, request: ProbeRequest) -> TransportFuture<'_>;

    /// Upload the chunk; report bytes sent through `progress`.
    fn send(&self, request: SendRequest, progress: ProgressSink) -> TransportFuture<'_>;
}
