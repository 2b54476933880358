//! Wire requests for one chunk: metadata parameters, extras, headers.

use tokio_util::sync::CancellationToken;

use crate::config::SendMethod;
use crate::file::FileMeta;
use crate::settings::Settings;
use crate::transport::{ProbeRequest, SendRequest};

use super::ChunkUnit;

/// Chunk metadata shared by probe and upload, namespaced wire names.
pub(crate) fn metadata(
    settings: &Settings,
    meta: &FileMeta,
    chunk: &ChunkUnit,
    total_chunks: usize,
) -> Vec<(String, String)> {
    let cfg = &settings.config;
    let p = &cfg.params;
    vec![
        (cfg.param(&p.chunk_number), (chunk.index() + 1).to_string()),
        (cfg.param(&p.chunk_size), cfg.chunk_size.to_string()),
        (cfg.param(&p.current_chunk_size), chunk.range().len().to_string()),
        (cfg.param(&p.total_size), meta.size.to_string()),
        (cfg.param(&p.identifier), meta.identifier.clone()),
        (cfg.param(&p.file_name), meta.file_name.clone()),
        (
            cfg.param(&p.relative_path),
            meta.path.to_string_lossy().into_owned(),
        ),
        (cfg.param(&p.total_chunks), total_chunks.to_string()),
    ]
}

/// Metadata followed by static and file-derived query data.
fn parameters(
    settings: &Settings,
    meta: &FileMeta,
    chunk: &ChunkUnit,
    total_chunks: usize,
) -> Vec<(String, String)> {
    let mut params = metadata(settings, meta, chunk, total_chunks);
    params.extend(
        settings
            .query(meta)
            .into_iter()
            .map(|(k, v)| (settings.config.param(&k), v)),
    );
    params
}

pub(crate) fn probe_request(
    settings: &Settings,
    meta: &FileMeta,
    chunk: &ChunkUnit,
    total_chunks: usize,
    cancel: CancellationToken,
) -> ProbeRequest {
    ProbeRequest {
        method: settings.config.test_method,
        target: settings.config.probe_target().to_string(),
        query: parameters(settings, meta, chunk, total_chunks),
        headers: settings.headers(meta),
        timeout: settings.config.request_timeout(),
        cancel,
    }
}

/// Upload request without its payload; the bytes are read later, outside
/// the registry lock.
pub(crate) fn send_request(
    settings: &Settings,
    meta: &FileMeta,
    chunk: &ChunkUnit,
    total_chunks: usize,
    cancel: CancellationToken,
) -> SendRequest {
    let cfg = &settings.config;
    let params = parameters(settings, meta, chunk, total_chunks);
    let (fields, query) = match cfg.method {
        SendMethod::Multipart => (params, Vec::new()),
        SendMethod::Octet => (Vec::new(), params),
    };
    SendRequest {
        method: cfg.upload_method,
        target: cfg.target.clone(),
        mode: cfg.method,
        fields,
        query,
        headers: settings.headers(meta),
        file_field: cfg.param(&cfg.params.file),
        file_name: meta.file_name.clone(),
        payload: Vec::new(),
        timeout: cfg.request_timeout(),
        cancel,
    }
}
